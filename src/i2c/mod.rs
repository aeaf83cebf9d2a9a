// Licensed under the Apache-2.0 license

//! I2C protocol engine module.
//!
//! Provides the tick-driven master and slave bit engines, the wired-AND
//! open-drain bus model they share, and a blocking embedded-hal controller
//! facade on top of the master engine.

pub mod bus;
pub mod common;
pub mod controller;
pub mod master;
pub mod traits;

// Slave/target engine (only when feature enabled)
#[cfg(feature = "i2c_target")]
pub mod slave;

// Re-export common types for convenience
pub use common::{
    ConfigError, Direction, Error, I2cSpeed, IrqLatch, NackPhase, TransferConfig,
    TransferConfigBuilder, WordCount, MAX_WORDS,
};

pub use bus::{Bus, Drive, LineDrive, LineLevels};
pub use controller::I2cController;
pub use master::{MasterEngine, MasterStatus};
pub use traits::{BusParticipant, InterruptSource};

#[cfg(feature = "i2c_target")]
pub use slave::{SlaveConfig, SlaveConfigBuilder, SlaveEngine, SlaveStatus};
