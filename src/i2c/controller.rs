// Licensed under the Apache-2.0 license

//! Blocking embedded-hal controller facade.
//!
//! Wraps a [`MasterEngine`], the shared [`Bus`] and an attached peer (one
//! slave engine, a bank of them, or any other [`BusParticipant`]) and runs
//! the tick scheduler to completion for each operation, chunking buffers of
//! arbitrary length into 1–4 word transfers. Implements
//! [`embedded_hal::i2c::I2c`] so drivers written against embedded-hal can
//! talk to simulated devices unchanged.
//!
//! Each chunk is an independent START..STOP transaction; repeated-start
//! continuation between operations is not generated.

use embedded_hal::i2c::{Operation, SevenBitAddress};
use fugit::NanosDurationU32;

use crate::common::{LogLevel, Logger, NoOpLogger};
use crate::i2c::bus::Bus;
use crate::i2c::common::{
    ConfigError, Direction, Error, I2cSpeed, NackPhase, TransferConfig, WordCount, MAX_WORDS,
    MAX_WORD_BITS, TICKS_PER_BIT,
};
use crate::i2c::master::MasterEngine;
use crate::i2c::traits::{BusParticipant, InterruptSource};

/// Blocking I2C controller over a simulated bus.
#[derive(Debug)]
pub struct I2cController<P: BusParticipant, L: Logger = NoOpLogger> {
    master: MasterEngine<L>,
    peer: P,
    bus: Bus,
    speed: I2cSpeed,
}

impl<P: BusParticipant, L: Logger> I2cController<P, L> {
    /// Build a controller around a master engine and its bus peer.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::WordWidthOutOfRange` if the master engine does
    /// not use full 8-bit words; the facade is byte-oriented.
    pub fn new(master: MasterEngine<L>, peer: P, speed: I2cSpeed) -> Result<Self, ConfigError> {
        if master.word_bits() != MAX_WORD_BITS {
            return Err(ConfigError::WordWidthOutOfRange);
        }
        Ok(Self {
            master,
            peer,
            bus: Bus::new(),
            speed,
        })
    }

    #[must_use]
    pub fn master(&self) -> &MasterEngine<L> {
        &self.master
    }

    #[must_use]
    pub fn peer(&self) -> &P {
        &self.peer
    }

    pub fn peer_mut(&mut self) -> &mut P {
        &mut self.peer
    }

    /// Nominal wall-clock duration of one `words`-word transfer at the
    /// configured speed, START and STOP cells included.
    #[must_use]
    pub fn transfer_duration(&self, words: usize) -> NanosDurationU32 {
        let ticks = Self::transfer_ticks(words);
        NanosDurationU32::from_ticks(self.speed.tick_period().ticks() * ticks)
    }

    /// Reset the master, the peer and the bus; both lines return high.
    pub fn reset(&mut self) {
        let Self {
            master, peer, bus, ..
        } = self;
        bus.reset(&mut [
            master as &mut dyn BusParticipant,
            peer as &mut dyn BusParticipant,
        ]);
    }

    /// Tear the controller down, handing back the engine and the peer.
    #[must_use]
    pub fn release(self) -> (MasterEngine<L>, P) {
        (self.master, self.peer)
    }

    /// Write up to four words in one START..STOP transaction.
    ///
    /// # Errors
    ///
    /// `Error::NoAcknowledge` if the peer NACKs the address or a word;
    /// `Error::InvalidBufferLength` for an empty buffer;
    /// `Error::InvalidAddress` for an address wider than 7 bits.
    pub fn write_words(&mut self, address: u8, bytes: &[u8]) -> Result<(), Error> {
        if bytes.is_empty() {
            return Err(Error::InvalidBufferLength);
        }
        for chunk in bytes.chunks(MAX_WORDS) {
            let config = Self::chunk_config(address, Direction::Write, chunk.len())?;
            self.execute(config, chunk, &mut [])?;
        }
        Ok(())
    }

    /// Read into `buffer`, up to four words per START..STOP transaction.
    ///
    /// # Errors
    ///
    /// As for [`write_words`](Self::write_words).
    pub fn read_words(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Error> {
        if buffer.is_empty() {
            return Err(Error::InvalidBufferLength);
        }
        for chunk in buffer.chunks_mut(MAX_WORDS) {
            let config = Self::chunk_config(address, Direction::Read, chunk.len())?;
            self.execute(config, &[], chunk)?;
        }
        Ok(())
    }

    fn chunk_config(
        address: u8,
        direction: Direction,
        words: usize,
    ) -> Result<TransferConfig, Error> {
        let count = WordCount::from_words(words).map_err(|_| Error::InvalidBufferLength)?;
        TransferConfig::builder()
            .address(address)
            .direction(direction)
            .count(count)
            .build()
            .map_err(|_| Error::InvalidAddress)
    }

    fn transfer_ticks(words: usize) -> u32 {
        // START cell, address byte + ack, each word + ack, STOP cell.
        let cells = 1 + 9 + words as u32 * 9 + 1;
        cells * TICKS_PER_BIT
    }

    fn execute(
        &mut self,
        config: TransferConfig,
        tx: &[u8],
        rx: &mut [u8],
    ) -> Result<(), Error> {
        self.master
            .start_transfer(&config, tx)
            .map_err(|_| Error::InvalidBufferLength)?;

        // Generous budget: the engines never stall on a healthy bus, so
        // exhausting it means a participant wedged the protocol.
        let budget = Self::transfer_ticks(config.count().words()) * 4;
        let mut rx_pos = 0usize;
        for _ in 0..budget {
            let Self {
                master, peer, bus, ..
            } = self;
            bus.step(&mut [
                &mut *master as &mut dyn BusParticipant,
                &mut *peer as &mut dyn BusParticipant,
            ]);
            if master.word_ready() {
                if let Some(slot) = rx.get_mut(rx_pos) {
                    *slot = master.rx_word();
                    rx_pos += 1;
                }
            }
            if master.is_idle() {
                return self.finish();
            }
        }

        self.master.logger_mut().log(
            LogLevel::Warn,
            format_args!("controller: bus stalled, giving up after {budget} ticks"),
        );
        self.reset();
        Err(Error::Timeout)
    }

    fn finish(&mut self) -> Result<(), Error> {
        if self.master.nack_pending() {
            // Acting as the external interrupt controller: acknowledge the
            // latch and surface the failure.
            self.master.ack_nack();
            let phase = self.master.nack_phase().unwrap_or(NackPhase::Address);
            return Err(Error::NoAcknowledge(phase));
        }
        if self.master.done_pending() {
            self.master.ack_done();
        }
        Ok(())
    }
}

impl<P: BusParticipant, L: Logger> embedded_hal::i2c::ErrorType for I2cController<P, L> {
    type Error = Error;
}

impl<P: BusParticipant, L: Logger> embedded_hal::i2c::I2c for I2cController<P, L> {
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        for operation in operations {
            match operation {
                Operation::Write(bytes) => self.write_words(address, bytes)?,
                Operation::Read(buffer) => self.read_words(address, buffer)?,
            }
        }
        Ok(())
    }
}
