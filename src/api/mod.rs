//! Protocol state machines for the motor and home units
//!
//! Both are driven by a single cooperative loop calling `poll`, which never
//! blocks longer than one bounded receive window. Events come back as return
//! values; the home unit additionally offers registered callbacks.

pub mod appliance;
pub mod controller;
pub mod power;
pub mod runtime;
pub mod types;

pub use appliance::{ApplianceOptions, ApplianceProtocol};
pub use controller::{ControllerOptions, ControllerProtocol, NoResponseCallback, StatusCallback};
pub use power::{EdgeDetector, PowerLossMonitor, PowerLossSignal};
pub use runtime::{
    MotorRuntimeState, ScheduledOff, MOTOR_ON_SINCE_KEY, SCHEDULED_OFF_AT_KEY, TOTAL_RUN_TIME_KEY,
};
pub use types::{
    ApplianceEvent, ApplianceState, CallbackHandle, ControllerEvent, ControllerState,
    ProtocolError, ProtocolResult, StatusReport,
};
