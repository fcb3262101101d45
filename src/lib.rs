//! Radio-linked motor controller
//!
//! A home unit sends ON/OFF/STATUS/TIMER commands over a LoRa link to a
//! remote motor unit, which drives latching relays and reports accumulated
//! run-time and power failures.

pub mod core;
pub mod hardware;
pub mod protocol;
pub mod utils;
pub mod api;

// Re-export commonly used types
pub use crate::core::{Clock, ManualClock, NodeIdentity, Packet, SystemClock, BROADCAST_ADDRESS};
pub use hardware::{
    CancelToken, RadioError, RadioMode, RadioResult, RadioTransport, ReceiveOutcome,
    RegisterConfig, Transceiver, TransceiverStatus,
};
pub use protocol::{CommandMessage, ErrorCode, ParseError, Scheduler, StatusMessage};
pub use utils::{ConfigError, PersistentCounter, UnitConfig};
pub use api::{
    ApplianceEvent, ApplianceProtocol, ControllerEvent, ControllerProtocol, MotorRuntimeState,
    PowerLossMonitor, PowerLossSignal, ProtocolError, ProtocolResult, StatusReport,
};
