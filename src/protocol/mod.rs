//! Application protocol between the home and motor units

pub mod message;
pub mod scheduler;

pub use message::{CommandMessage, ErrorCode, ParseError, StatusMessage};
pub use scheduler::{Scheduler, TimerId};
