// Licensed under the Apache-2.0 license

//! Composable seams between the engines, the bus scheduler and the external
//! interrupt controller.

use crate::i2c::bus::{LineDrive, LineLevels};

/// One station on the open-drain bus.
///
/// The scheduler calls [`update`](Self::update) exactly once per tick with
/// the levels resolved on the previous tick; the participant returns its
/// drive intent for this tick. Implementations must not assume they see
/// their own same-tick output reflected in `observed`.
pub trait BusParticipant {
    fn update(&mut self, observed: LineLevels) -> LineDrive;

    /// Synchronous reset: back to Idle, both lines released, counters and
    /// latched flags cleared.
    fn reset(&mut self);
}

/// Several same-typed participants sharing the bus, e.g. a bank of slave
/// engines at different addresses.
impl<P: BusParticipant, const N: usize> BusParticipant for [P; N] {
    fn update(&mut self, observed: LineLevels) -> LineDrive {
        self.iter_mut()
            .fold(LineDrive::RELEASED, |merged, participant| {
                merged.merge(participant.update(observed))
            })
    }

    fn reset(&mut self) {
        for participant in self.iter_mut() {
            participant.reset();
        }
    }
}

/// View of an engine's latched interrupt flags as seen by the external
/// interrupt controller, including the per-bit acknowledge pulses that are
/// the only way to clear them.
pub trait InterruptSource {
    fn done_pending(&self) -> bool;

    fn nack_pending(&self) -> bool;

    /// Acknowledge pulse clearing the completion latch.
    fn ack_done(&mut self);

    /// Acknowledge pulse clearing the NACK latch.
    fn ack_nack(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i2c::bus::Drive;

    struct Stub(Drive);

    impl BusParticipant for Stub {
        fn update(&mut self, _observed: LineLevels) -> LineDrive {
            LineDrive {
                sda: self.0,
                scl: Drive::Release,
            }
        }

        fn reset(&mut self) {
            self.0 = Drive::Release;
        }
    }

    #[test]
    fn array_participant_merges_members() {
        let mut bank = [Stub(Drive::Release), Stub(Drive::DriveLow)];
        let drive = bank.update(LineLevels::IDLE);
        assert!(drive.sda.is_low());
        assert!(!drive.scl.is_low());

        bank.reset();
        let drive = bank.update(LineLevels::IDLE);
        assert!(!drive.sda.is_low());
    }
}
