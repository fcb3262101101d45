//! Radio transport error types and handling

use crate::hardware::transceiver::RadioMode;

/// Errors raised by the radio transport and its configuration
#[derive(Debug, thiserror::Error)]
pub enum RadioError {
    /// The module answered the register write with something other than the ack marker
    #[error("configuration rejected by module, response {response:02X?}")]
    ConfigurationRejected { response: Vec<u8> },

    /// No acknowledgement arrived within the read window
    #[error("no configuration acknowledgement within {timeout_ms}ms")]
    ConfigurationTimeout { timeout_ms: u64 },

    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("frequency {mhz} MHz is outside the 410-493 and 850-930 MHz bands")]
    InvalidFrequency { mhz: u16 },

    /// A parameter with no entry in the module's lookup table
    #[error("unsupported {parameter} = {value}")]
    InvalidParameter { parameter: &'static str, value: u32 },

    #[error("serial port {port} unavailable: {reason}")]
    SerialUnavailable { port: String, reason: String },

    #[error("malformed frame of {len} bytes: {reason}")]
    MalformedFrame { len: usize, reason: &'static str },

    #[error("cannot {operation} while in {mode:?} mode")]
    InvalidMode {
        operation: &'static str,
        mode: RadioMode,
    },

    #[error("GPIO line {line} failed: {reason}")]
    Pin { line: &'static str, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for radio operations
pub type RadioResult<T> = Result<T, RadioError>;

/// What a control loop should do after a radio failure
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecoveryStrategy {
    /// Retry the operation on the next loop iteration
    Retry,
    /// Drop the offending input and continue
    Skip,
    /// Abort; only valid during startup
    Fail,
}

impl RadioError {
    /// Get the recommended recovery strategy for this error
    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        match self {
            RadioError::ConfigurationRejected { .. }
            | RadioError::ConfigurationTimeout { .. }
            | RadioError::InvalidFrequency { .. }
            | RadioError::InvalidParameter { .. }
            | RadioError::SerialUnavailable { .. } => RecoveryStrategy::Fail,
            RadioError::PayloadTooLarge { .. } | RadioError::MalformedFrame { .. } => {
                RecoveryStrategy::Skip
            }
            RadioError::InvalidMode { .. } | RadioError::Pin { .. } | RadioError::Io(_) => {
                RecoveryStrategy::Retry
            }
        }
    }

    /// Errors that must abort startup
    pub fn is_fatal(&self) -> bool {
        matches!(self.recovery_strategy(), RecoveryStrategy::Fail)
    }

    pub(crate) fn pin<E: std::fmt::Debug>(line: &'static str, error: E) -> Self {
        RadioError::Pin {
            line,
            reason: format!("{:?}", error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_errors_are_fatal() {
        assert!(RadioError::ConfigurationTimeout { timeout_ms: 1000 }.is_fatal());
        assert!(RadioError::InvalidFrequency { mhz: 300 }.is_fatal());
        assert!(!RadioError::MalformedFrame { len: 1, reason: "short" }.is_fatal());
        assert_eq!(
            RadioError::Io(std::io::Error::other("gone")).recovery_strategy(),
            RecoveryStrategy::Retry
        );
    }

    #[test]
    fn test_display_includes_response_bytes() {
        let error = RadioError::ConfigurationRejected {
            response: vec![0xFF, 0x00, 0x09],
        };
        assert_eq!(
            error.to_string(),
            "configuration rejected by module, response [FF, 00, 09]"
        );
    }
}
