//! Configuration and persistence

pub mod config;
pub mod counter;

pub use config::{ConfigError, HomeSettings, MotorSettings, RadioSettings, UnitConfig};
pub use counter::{CounterError, PersistentCounter};
