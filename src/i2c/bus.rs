// Licensed under the Apache-2.0 license

//! Open-drain two-wire bus model and tick scheduler.
//!
//! Every participant outputs a tri-state intent per line (`DriveLow` or
//! `Release`); the observed level is the wired-AND of all intents with the
//! pull-ups supplying the idle high. Resolution happens centrally, once per
//! tick, from a consistent snapshot: participants always observe the
//! *previous* tick's resolved levels, never another participant's same-tick
//! output.

use crate::i2c::traits::BusParticipant;

/// Tri-state drive intent for one open-drain line.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Drive {
    DriveLow,
    #[default]
    Release,
}

impl Drive {
    #[must_use]
    pub fn is_low(self) -> bool {
        matches!(self, Drive::DriveLow)
    }
}

/// Drive intents for both bus lines.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LineDrive {
    pub sda: Drive,
    pub scl: Drive,
}

impl LineDrive {
    /// Both lines released.
    pub const RELEASED: Self = Self {
        sda: Drive::Release,
        scl: Drive::Release,
    };

    /// Wired-AND combination of two intents: low wins per line.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        let low = |a: Drive, b: Drive| {
            if a.is_low() || b.is_low() {
                Drive::DriveLow
            } else {
                Drive::Release
            }
        };
        Self {
            sda: low(self.sda, other.sda),
            scl: low(self.scl, other.scl),
        }
    }
}

/// Resolved logic levels of both lines; `true` is high.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LineLevels {
    pub sda: bool,
    pub scl: bool,
}

impl LineLevels {
    /// Idle bus: both lines pulled up.
    pub const IDLE: Self = Self {
        sda: true,
        scl: true,
    };
}

impl Default for LineLevels {
    fn default() -> Self {
        Self::IDLE
    }
}

/// Resolve merged intents against the pull-ups.
#[must_use]
pub fn resolve(drives: LineDrive) -> LineLevels {
    LineLevels {
        sda: !drives.sda.is_low(),
        scl: !drives.scl.is_low(),
    }
}

/// The shared bus: holds the resolved levels between ticks and advances all
/// participants with the two-phase sample-then-drive discipline.
#[derive(Debug, Default)]
pub struct Bus {
    levels: LineLevels,
}

impl Bus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            levels: LineLevels::IDLE,
        }
    }

    /// Levels resolved on the most recent tick.
    #[must_use]
    pub fn levels(&self) -> LineLevels {
        self.levels
    }

    /// Advance the bus by one tick.
    ///
    /// Each participant observes the previous tick's levels and contributes
    /// this tick's intent; the wired-AND of all intents becomes the new
    /// resolved level pair.
    pub fn step(&mut self, participants: &mut [&mut dyn BusParticipant]) -> LineLevels {
        let observed = self.levels;
        let mut merged = LineDrive::RELEASED;
        for participant in participants.iter_mut() {
            merged = merged.merge(participant.update(observed));
        }
        self.levels = resolve(merged);
        self.levels
    }

    /// Reset every participant and restore the pulled-up idle levels.
    pub fn reset(&mut self, participants: &mut [&mut dyn BusParticipant]) {
        for participant in participants.iter_mut() {
            participant.reset();
        }
        self.levels = LineLevels::IDLE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_lines_float_high() {
        assert_eq!(resolve(LineDrive::RELEASED), LineLevels::IDLE);
    }

    #[test]
    fn any_low_driver_wins() {
        let a = LineDrive {
            sda: Drive::DriveLow,
            scl: Drive::Release,
        };
        let b = LineDrive {
            sda: Drive::Release,
            scl: Drive::DriveLow,
        };
        let merged = a.merge(b);
        assert!(merged.sda.is_low());
        assert!(merged.scl.is_low());
        let levels = resolve(merged);
        assert!(!levels.sda);
        assert!(!levels.scl);

        // Merging with a released intent changes nothing.
        assert_eq!(a.merge(LineDrive::RELEASED), a);
    }

    struct PinnedLow;

    impl BusParticipant for PinnedLow {
        fn update(&mut self, _observed: LineLevels) -> LineDrive {
            LineDrive {
                sda: Drive::DriveLow,
                scl: Drive::Release,
            }
        }

        fn reset(&mut self) {}
    }

    struct Floating;

    impl BusParticipant for Floating {
        fn update(&mut self, _observed: LineLevels) -> LineDrive {
            LineDrive::RELEASED
        }

        fn reset(&mut self) {}
    }

    #[test]
    fn step_resolves_across_participants() {
        let mut bus = Bus::new();
        let mut pinned = PinnedLow;
        let mut floating = Floating;
        let levels = bus.step(&mut [&mut pinned, &mut floating]);
        assert!(!levels.sda);
        assert!(levels.scl);
        assert_eq!(bus.levels(), levels);
    }

    #[test]
    fn reset_restores_idle_levels() {
        let mut bus = Bus::new();
        let mut pinned = PinnedLow;
        bus.step(&mut [&mut pinned]);
        assert!(!bus.levels().sda);
        bus.reset(&mut [&mut pinned]);
        assert_eq!(bus.levels(), LineLevels::IDLE);
    }
}
