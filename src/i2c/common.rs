// Licensed under the Apache-2.0 license

//! Common types and constants shared by the I2C protocol engines.
//!
//! This module provides the transfer configuration, interrupt latch, error
//! taxonomy and protocol constants used by both the master and slave bit
//! engines.

use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
use fugit::NanosDurationU32;

/// Number of address bits in a 7-bit addressed transaction.
pub const ADDRESS_BITS: u8 = 7;
/// Largest valid 7-bit address.
pub const MAX_ADDRESS: u8 = 0x7f;
/// Widest supported word, in bits.
pub const MAX_WORD_BITS: u8 = 8;
/// Largest number of words in one addressed transaction.
pub const MAX_WORDS: usize = 4;
/// Scheduler ticks per SCL bit cell (quarter-bit oversampling).
pub const TICKS_PER_BIT: u32 = 4;

/// Data direction carried in the R/W bit of the address byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    /// Value of the R/W bit on the wire: `1` for read, `0` for write.
    #[must_use]
    pub fn rw_bit(self) -> u8 {
        match self {
            Direction::Read => 1,
            Direction::Write => 0,
        }
    }

    #[must_use]
    pub fn from_rw_bit(bit: bool) -> Self {
        if bit {
            Direction::Read
        } else {
            Direction::Write
        }
    }
}

/// Word count of one transaction, stored as the 2-bit hardware code.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WordCount {
    One = 0,
    Two = 1,
    Three = 2,
    Four = 3,
}

impl WordCount {
    /// Decode the 2-bit register-file code. Upper bits are ignored.
    #[must_use]
    pub fn from_code(code: u8) -> Self {
        match code & 0b11 {
            0 => WordCount::One,
            1 => WordCount::Two,
            2 => WordCount::Three,
            _ => WordCount::Four,
        }
    }

    /// The 2-bit code written by the register file.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Number of words, 1..=4.
    #[must_use]
    pub fn words(self) -> usize {
        self as usize + 1
    }

    /// Word count for `n` words.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::WordCountOutOfRange` unless `1 <= n <= 4`.
    pub fn from_words(n: usize) -> Result<Self, ConfigError> {
        match n {
            1..=4 => Ok(Self::from_code((n - 1) as u8)),
            _ => Err(ConfigError::WordCountOutOfRange),
        }
    }
}

/// Nominal SCL bus rate.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum I2cSpeed {
    Standard = 100_000,
    Fast = 400_000,
    FastPlus = 1_000_000,
}

impl I2cSpeed {
    /// Duration of one full SCL bit cell.
    #[must_use]
    pub fn scl_period(self) -> NanosDurationU32 {
        NanosDurationU32::from_ticks(1_000_000_000 / self as u32)
    }

    /// Duration of one scheduler tick (a quarter bit cell).
    #[must_use]
    pub fn tick_period(self) -> NanosDurationU32 {
        NanosDurationU32::from_ticks(1_000_000_000 / (self as u32 * TICKS_PER_BIT))
    }
}

/// Configuration / trigger-time errors. These never come from the bus.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Address does not fit in 7 bits.
    AddressOutOfRange,
    /// Word width must be 1..=8 bits.
    WordWidthOutOfRange,
    /// Word count must be 1..=4.
    WordCountOutOfRange,
    /// The outgoing buffer holds fewer words than the configured count.
    BufferTooSmall,
    /// A transfer is already in flight; configs are latched only from Idle.
    Busy,
}

/// Phase at which an expected acknowledgement was missed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NackPhase {
    Address,
    Data,
}

impl From<NackPhase> for NoAcknowledgeSource {
    fn from(phase: NackPhase) -> Self {
        match phase {
            NackPhase::Address => NoAcknowledgeSource::Address,
            NackPhase::Data => NoAcknowledgeSource::Data,
        }
    }
}

/// Bus-level transfer errors surfaced by the controller facade.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The addressed peer did not acknowledge.
    NoAcknowledge(NackPhase),
    /// Target address does not fit in 7 bits.
    InvalidAddress,
    /// Zero-length buffer handed to a transaction.
    InvalidBufferLength,
    /// The bus did not return to idle within the tick budget.
    Timeout,
}

impl embedded_hal::i2c::Error for Error {
    fn kind(&self) -> ErrorKind {
        match *self {
            Error::NoAcknowledge(phase) => ErrorKind::NoAcknowledge(phase.into()),
            Error::InvalidAddress | Error::InvalidBufferLength | Error::Timeout => {
                ErrorKind::Other
            }
        }
    }
}

/// Parameters of one master transfer, latched at trigger time and immutable
/// until the bus returns to Idle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TransferConfig {
    address: u8,
    direction: Direction,
    count: WordCount,
}

impl TransferConfig {
    #[must_use]
    pub fn builder() -> TransferConfigBuilder {
        TransferConfigBuilder::new()
    }

    #[must_use]
    pub fn address(&self) -> u8 {
        self.address
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[must_use]
    pub fn count(&self) -> WordCount {
        self.count
    }

    /// The address byte as shifted onto the wire: 7 address bits then R/W.
    #[must_use]
    pub fn address_byte(&self) -> u8 {
        (self.address << 1) | self.direction.rw_bit()
    }
}

pub struct TransferConfigBuilder {
    address: u8,
    direction: Direction,
    count: WordCount,
}

impl Default for TransferConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            address: 0,
            direction: Direction::Write,
            count: WordCount::One,
        }
    }

    #[must_use]
    pub fn address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    #[must_use]
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    #[must_use]
    pub fn count(mut self, count: WordCount) -> Self {
        self.count = count;
        self
    }

    /// # Errors
    ///
    /// Returns `ConfigError::AddressOutOfRange` if the address does not fit
    /// in 7 bits.
    pub fn build(self) -> Result<TransferConfig, ConfigError> {
        if self.address > MAX_ADDRESS {
            return Err(ConfigError::AddressOutOfRange);
        }
        Ok(TransferConfig {
            address: self.address,
            direction: self.direction,
            count: self.count,
        })
    }
}

/// Two independent latched interrupt flags.
///
/// Each bit is set by the engine on its triggering tick and cleared only by
/// an explicit per-bit acknowledge from the external interrupt controller.
/// A triggering edge while the bit is already set is silently absorbed; no
/// count is kept.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct IrqLatch {
    done: bool,
    nack: bool,
}

impl IrqLatch {
    pub fn raise_done(&mut self) {
        self.done = true;
    }

    pub fn raise_nack(&mut self) {
        self.nack = true;
    }

    #[must_use]
    pub fn done(&self) -> bool {
        self.done
    }

    #[must_use]
    pub fn nack(&self) -> bool {
        self.nack
    }

    pub fn ack_done(&mut self) {
        self.done = false;
    }

    pub fn ack_nack(&mut self) {
        self.nack = false;
    }

    /// Reset path: drop both latches.
    pub fn clear(&mut self) {
        self.done = false;
        self.nack = false;
    }
}
