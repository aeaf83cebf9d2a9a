// Licensed under the Apache-2.0 license

//! Slave-side bit engine.
//!
//! The slave never drives SCL (clock stretching is unsupported); it watches
//! the lines the master toggles and reacts to edges: START and STOP patterns
//! are monitored continuously from every state, data is sampled at SCL
//! rising edges and the slave's own drive intent (acknowledge bits and
//! transmit data) changes only at SCL falling edges, so its data is always
//! stable around the rising edge that samples it.

use heapless::Vec;

use crate::common::{LogLevel, Logger, NoOpLogger};
use crate::i2c::bus::{Drive, LineDrive, LineLevels};
use crate::i2c::common::{
    ConfigError, Direction, IrqLatch, WordCount, ADDRESS_BITS, MAX_ADDRESS, MAX_WORDS,
    MAX_WORD_BITS,
};
use crate::i2c::traits::{BusParticipant, InterruptSource};

const HEADER_BITS: u8 = ADDRESS_BITS + 1;

/// Slave transfer phase.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    AddrRx { bit: u8 },
    AddrAckTx { driving: bool },
    DataRx { bit: u8 },
    DataAckTx { ack: bool, driving: bool },
    DataTx { bit: u8 },
    DataAckRx { acked: bool },
    /// Transfer ended early (NACK either way); bus released until STOP.
    WaitStop,
}

/// Static configuration of one slave engine: its own address and the word
/// count it considers a complete transaction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SlaveConfig {
    address: u8,
    count: WordCount,
}

impl SlaveConfig {
    #[must_use]
    pub fn builder() -> SlaveConfigBuilder {
        SlaveConfigBuilder::new()
    }

    #[must_use]
    pub fn address(&self) -> u8 {
        self.address
    }

    #[must_use]
    pub fn count(&self) -> WordCount {
        self.count
    }
}

pub struct SlaveConfigBuilder {
    address: u8,
    count: WordCount,
}

impl Default for SlaveConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SlaveConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            address: 0,
            count: WordCount::One,
        }
    }

    #[must_use]
    pub fn address(mut self, address: u8) -> Self {
        self.address = address;
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
    pub fn build(self) -> Result<SlaveConfig, ConfigError> {
        if self.address > MAX_ADDRESS {
            return Err(ConfigError::AddressOutOfRange);
        }
        Ok(SlaveConfig {
            address: self.address,
            count: self.count,
        })
    }
}

/// Snapshot of the slave engine for the register-file collaborator.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SlaveStatus {
    pub address: u8,
    pub busy: bool,
    pub words_transferred: usize,
    pub rx_buffer_count: usize,
    pub done_pending: bool,
    pub nack_pending: bool,
}

/// The slave protocol engine.
#[derive(Debug)]
pub struct SlaveEngine<L: Logger = NoOpLogger> {
    word_bits: u8,
    config: SlaveConfig,
    logger: L,
    phase: Phase,
    prev: LineLevels,
    shift: u8,
    direction: Direction,
    word_index: usize,
    tx: Vec<u8, MAX_WORDS>,
    rx_words: Vec<u8, MAX_WORDS>,
    rx_word: u8,
    word_ready: bool,
    aborted: bool,
    irq: IrqLatch,
    sda: Drive,
}

impl SlaveEngine<NoOpLogger> {
    #[must_use]
    pub fn new(config: SlaveConfig) -> Self {
        Self::with_logger(config, NoOpLogger)
    }
}

impl<L: Logger> SlaveEngine<L> {
    #[must_use]
    pub fn with_logger(config: SlaveConfig, logger: L) -> Self {
        Self {
            word_bits: MAX_WORD_BITS,
            config,
            logger,
            phase: Phase::Idle,
            prev: LineLevels::IDLE,
            shift: 0,
            direction: Direction::Write,
            word_index: 0,
            tx: Vec::new(),
            rx_words: Vec::new(),
            rx_word: 0,
            word_ready: false,
            aborted: false,
            irq: IrqLatch::default(),
            sda: Drive::Release,
        }
    }

    /// Engine with a narrower word width, fixed for the engine's lifetime.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::WordWidthOutOfRange` unless `1 <= word_bits <= 8`.
    pub fn with_word_bits(
        config: SlaveConfig,
        word_bits: u8,
        logger: L,
    ) -> Result<Self, ConfigError> {
        if word_bits == 0 || word_bits > MAX_WORD_BITS {
            return Err(ConfigError::WordWidthOutOfRange);
        }
        let mut engine = Self::with_logger(config, logger);
        engine.word_bits = word_bits;
        Ok(engine)
    }

    #[must_use]
    pub fn config(&self) -> SlaveConfig {
        self.config
    }

    /// Load the words transmitted when the master reads from this slave.
    /// The buffer persists across transfers and resets, like the register
    /// file it stands in for; words past its end shift out as ones.
    ///
    /// # Errors
    ///
    /// `ConfigError::WordCountOutOfRange` for more than four words.
    pub fn set_response(&mut self, words: &[u8]) -> Result<(), ConfigError> {
        self.tx.clear();
        self.tx
            .extend_from_slice(words)
            .map_err(|_| ConfigError::WordCountOutOfRange)
    }

    /// Words received from the master since this slave was last addressed
    /// for writing.
    #[must_use]
    pub fn received(&self) -> &[u8] {
        &self.rx_words
    }

    /// Most recently fully-received word.
    #[must_use]
    pub fn rx_word(&self) -> u8 {
        self.rx_word
    }

    /// One-tick strobe: a new received word is ready to be latched.
    #[must_use]
    pub fn word_ready(&self) -> bool {
        self.word_ready
    }

    #[must_use]
    pub fn status(&self) -> SlaveStatus {
        SlaveStatus {
            address: self.config.address(),
            busy: !matches!(self.phase, Phase::Idle),
            words_transferred: self.word_index,
            rx_buffer_count: self.rx_words.len(),
            done_pending: self.irq.done(),
            nack_pending: self.irq.nack(),
        }
    }

    fn word_mask(&self) -> u8 {
        (((1u16 << self.word_bits) - 1) & 0xff) as u8
    }

    fn tx_word(&self, index: usize) -> u8 {
        self.tx.get(index).copied().unwrap_or(0xff)
    }

    fn shift_out_bit(&self, bit: u8) -> Drive {
        if (self.shift >> (self.word_bits - 1 - bit)) & 1 == 0 {
            Drive::DriveLow
        } else {
            Drive::Release
        }
    }

    fn on_start(&mut self) {
        // START or repeated START: re-enter addressing from any state.
        self.phase = Phase::AddrRx { bit: 0 };
        self.shift = 0;
        self.sda = Drive::Release;
        self.logger
            .log(LogLevel::Trace, format_args!("slave: start condition"));
    }

    fn on_stop(&mut self) {
        if self.word_index >= self.config.count().words() && !self.aborted {
            self.irq.raise_done();
            self.logger.log(
                LogLevel::Trace,
                format_args!("slave: transfer complete, {} words", self.word_index),
            );
        }
        self.phase = Phase::Idle;
        self.sda = Drive::Release;
        self.shift = 0;
        self.word_index = 0;
        self.aborted = false;
    }

    fn on_scl_rising(&mut self, sda: bool) {
        match self.phase {
            Phase::AddrRx { bit } => {
                self.shift = (self.shift << 1) | u8::from(sda);
                if bit + 1 == HEADER_BITS {
                    let address = self.shift >> 1;
                    if address == self.config.address() {
                        self.direction = Direction::from_rw_bit(self.shift & 1 == 1);
                        if self.word_index == 0 && self.direction == Direction::Write {
                            self.rx_words.clear();
                        }
                        self.phase = Phase::AddrAckTx { driving: false };
                        self.logger.log(
                            LogLevel::Trace,
                            format_args!("slave: addressed, dir={:?}", self.direction),
                        );
                    } else {
                        // Not for us: release the bus, raise nothing.
                        self.phase = Phase::Idle;
                        self.sda = Drive::Release;
                        self.logger.log(
                            LogLevel::Trace,
                            format_args!("slave: address {address:#04x} ignored"),
                        );
                    }
                } else {
                    self.phase = Phase::AddrRx { bit: bit + 1 };
                }
            }

            Phase::DataRx { bit } => {
                self.shift = (self.shift << 1) | u8::from(sda);
                if bit + 1 == self.word_bits {
                    self.rx_word = self.shift & self.word_mask();
                    self.word_ready = true;
                    self.word_index += 1;
                    if self.rx_words.push(self.rx_word).is_err() {
                        self.logger.log(
                            LogLevel::Warn,
                            format_args!(
                                "slave: receive log full, word {} dropped",
                                self.word_index
                            ),
                        );
                    }
                    let ack = self.word_index <= self.config.count().words();
                    if !ack {
                        self.logger.log(
                            LogLevel::Warn,
                            format_args!(
                                "slave: word {} beyond configured count, not acknowledging",
                                self.word_index
                            ),
                        );
                    }
                    self.phase = Phase::DataAckTx {
                        ack,
                        driving: false,
                    };
                } else {
                    self.phase = Phase::DataRx { bit: bit + 1 };
                }
            }

            Phase::DataAckRx { .. } => {
                if sda {
                    // Master did not acknowledge our word.
                    if self.word_index < self.config.count().words() {
                        self.aborted = true;
                        self.irq.raise_nack();
                        self.logger.log(
                            LogLevel::Warn,
                            format_args!(
                                "slave: premature NACK after word {}",
                                self.word_index
                            ),
                        );
                    }
                    self.phase = Phase::WaitStop;
                    self.sda = Drive::Release;
                } else {
                    self.phase = Phase::DataAckRx { acked: true };
                }
            }

            _ => {}
        }
    }

    fn on_scl_falling(&mut self) {
        match self.phase {
            Phase::AddrAckTx { driving: false } => {
                self.sda = Drive::DriveLow;
                self.phase = Phase::AddrAckTx { driving: true };
            }

            Phase::AddrAckTx { driving: true } => match self.direction {
                Direction::Write => {
                    self.sda = Drive::Release;
                    self.shift = 0;
                    self.phase = Phase::DataRx { bit: 0 };
                }
                Direction::Read => {
                    self.shift = self.tx_word(self.word_index);
                    self.sda = self.shift_out_bit(0);
                    self.phase = Phase::DataTx { bit: 0 };
                }
            },

            Phase::DataTx { bit } => {
                if bit + 1 < self.word_bits {
                    self.sda = self.shift_out_bit(bit + 1);
                    self.phase = Phase::DataTx { bit: bit + 1 };
                } else {
                    self.sda = Drive::Release;
                    self.word_index += 1;
                    self.phase = Phase::DataAckRx { acked: false };
                }
            }

            Phase::DataAckTx {
                ack,
                driving: false,
            } => {
                self.sda = if ack { Drive::DriveLow } else { Drive::Release };
                self.phase = Phase::DataAckTx { ack, driving: true };
            }

            Phase::DataAckTx { ack, driving: true } => {
                self.sda = Drive::Release;
                self.phase = if ack {
                    self.shift = 0;
                    Phase::DataRx { bit: 0 }
                } else {
                    Phase::WaitStop
                };
            }

            Phase::DataAckRx { acked: true } => {
                self.shift = self.tx_word(self.word_index);
                self.sda = self.shift_out_bit(0);
                self.phase = Phase::DataTx { bit: 0 };
            }

            _ => {}
        }
    }
}

impl<L: Logger> BusParticipant for SlaveEngine<L> {
    fn update(&mut self, observed: LineLevels) -> LineDrive {
        self.word_ready = false;
        let prev = self.prev;
        self.prev = observed;

        if prev.scl && observed.scl {
            if prev.sda && !observed.sda {
                self.on_start();
            } else if !prev.sda && observed.sda {
                self.on_stop();
            }
        } else if !prev.scl && observed.scl {
            self.on_scl_rising(observed.sda);
        } else if prev.scl && !observed.scl {
            self.on_scl_falling();
        }

        // No clock stretching: SCL is never driven.
        LineDrive {
            sda: self.sda,
            scl: Drive::Release,
        }
    }

    fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.prev = LineLevels::IDLE;
        self.shift = 0;
        self.direction = Direction::Write;
        self.word_index = 0;
        self.rx_words.clear();
        self.rx_word = 0;
        self.word_ready = false;
        self.aborted = false;
        self.irq.clear();
        self.sda = Drive::Release;
    }
}

impl<L: Logger> InterruptSource for SlaveEngine<L> {
    fn done_pending(&self) -> bool {
        self.irq.done()
    }

    fn nack_pending(&self) -> bool {
        self.irq.nack()
    }

    fn ack_done(&mut self) {
        self.irq.ack_done();
    }

    fn ack_nack(&mut self) {
        self.irq.ack_nack();
    }
}
