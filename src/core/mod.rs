//! Core types and constants for the radio link

pub mod types;
pub mod constants;
pub mod clock;

pub use types::*;
pub use constants::*;
pub use clock::{Clock, ManualClock, SystemClock};
