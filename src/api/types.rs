//! Common API types shared by both units

use crate::hardware::error::RadioError;
use crate::hardware::relay::RelayError;
use crate::protocol::message::{CommandMessage, ParseError, StatusMessage};

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Radio(#[from] RadioError),

    #[error("undecodable payload: {0}")]
    Parse(#[from] ParseError),

    /// Only one command may await a response at a time
    #[error("{pending:?} is still waiting for a response")]
    CommandInFlight { pending: CommandMessage },

    #[error("no callback registered under {0:?}")]
    UnknownCallback(CallbackHandle),
}

/// Motor-unit state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplianceState {
    #[default]
    Listening,
    ProcessingRequest,
    TransmittingResponse,
    /// Unsolicited status: periodic, scheduled off, or power-loss alert
    TransmittingStatus,
}

/// Home-unit state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerState {
    #[default]
    Listening,
    WaitingForResponse,
}

/// Something the motor unit did during one poll
#[derive(Debug)]
pub enum ApplianceEvent {
    /// A command was applied and answered
    CommandHandled {
        command: CommandMessage,
        status: StatusMessage,
        /// Set when the relay could not be switched; the state is unchanged
        relay_error: Option<RelayError>,
    },
    /// Periodic unsolicited status
    StatusBroadcast { status: StatusMessage },
    /// A SET_TIMER run reached its end
    ScheduledOff {
        status: StatusMessage,
        relay_error: Option<RelayError>,
    },
    PowerLossAlert { status: StatusMessage },
    /// A frame for us that is not a command
    FrameRejected { error: ParseError },
    /// Transport failure during steady-state operation
    LinkFault { error: RadioError },
}

/// A status received by the home unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReport {
    pub status: StatusMessage,
    pub rssi_dbm: Option<i16>,
    /// Whether it answered a command of ours
    pub solicited: bool,
}

/// Something the home unit observed during one poll
#[derive(Debug)]
pub enum ControllerEvent {
    StatusReceived(StatusReport),
    /// The response window of `command` closed without a valid status
    NoResponse { command: CommandMessage },
    FrameRejected { error: ParseError },
    LinkFault { error: RadioError },
}

/// Callback registration handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackHandle(u32);

impl CallbackHandle {
    pub(crate) fn new(id: u32) -> Self {
        CallbackHandle(id)
    }

    pub fn id(&self) -> u32 {
        self.0
    }
}
