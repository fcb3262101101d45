//! Application messages carried in a frame payload
//!
//! Commands are a one-byte tag, plus one data byte for `SET_TIMER`. Status
//! updates are five bytes:
//!
//! ```text
//! [0x10][motor status][run-time hi][run-time lo][error code]
//! ```

use crate::core::constants::{
    ERROR_CODE_NONE, ERROR_CODE_POWER_FAILURE, STATUS_MESSAGE_LEN, TAG_OFF, TAG_ON,
    TAG_SET_TIMER, TAG_STATUS_REQUEST, TAG_STATUS_UPDATE,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty payload")]
    Empty,

    #[error("unknown command tag 0x{0:02X}")]
    UnknownTag(u8),

    #[error("SET_TIMER without a minutes byte")]
    MissingTimerData,

    #[error("insufficient data: need {required} bytes, got {available}")]
    TooShort { required: usize, available: usize },

    #[error("expected tag 0x{expected:02X}, found 0x{found:02X}")]
    UnexpectedTag { expected: u8, found: u8 },

    #[error("motor status byte 0x{0:02X} is neither on nor off")]
    InvalidMotorStatus(u8),

    #[error("unknown error code 0x{0:02X}")]
    UnknownErrorCode(u8),
}

/// Command sent by the home unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandMessage {
    On,
    Off,
    StatusRequest,
    /// Switch on, then off again after `minutes`
    SetTimer { minutes: u8 },
}

impl CommandMessage {
    pub fn tag(self) -> u8 {
        match self {
            CommandMessage::On => TAG_ON,
            CommandMessage::Off => TAG_OFF,
            CommandMessage::StatusRequest => TAG_STATUS_REQUEST,
            CommandMessage::SetTimer { .. } => TAG_SET_TIMER,
        }
    }

    pub fn encode(self) -> Vec<u8> {
        match self {
            CommandMessage::SetTimer { minutes } => vec![TAG_SET_TIMER, minutes],
            other => vec![other.tag()],
        }
    }

    /// Decode a command. Bytes past the command itself are ignored.
    pub fn decode(payload: &[u8]) -> Result<Self, ParseError> {
        let (&tag, data) = payload.split_first().ok_or(ParseError::Empty)?;

        match tag {
            TAG_ON => Ok(CommandMessage::On),
            TAG_OFF => Ok(CommandMessage::Off),
            TAG_STATUS_REQUEST => Ok(CommandMessage::StatusRequest),
            TAG_SET_TIMER => data
                .first()
                .map(|&minutes| CommandMessage::SetTimer { minutes })
                .ok_or(ParseError::MissingTimerData),
            other => Err(ParseError::UnknownTag(other)),
        }
    }
}

/// Fault reported alongside a status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorCode {
    #[default]
    None,
    PowerFailure,
}

impl ErrorCode {
    pub fn to_byte(self) -> u8 {
        match self {
            ErrorCode::None => ERROR_CODE_NONE,
            ErrorCode::PowerFailure => ERROR_CODE_POWER_FAILURE,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, ParseError> {
        match byte {
            ERROR_CODE_NONE => Ok(ErrorCode::None),
            ERROR_CODE_POWER_FAILURE => Ok(ErrorCode::PowerFailure),
            other => Err(ParseError::UnknownErrorCode(other)),
        }
    }
}

/// Status reported by the motor unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusMessage {
    pub motor_on: bool,
    pub total_run_time_seconds: u16,
    pub error_code: ErrorCode,
}

impl StatusMessage {
    /// Build a status from an unbounded run-time; the wire field saturates at
    /// 65535 seconds.
    pub fn new(motor_on: bool, run_time_seconds: u64, error_code: ErrorCode) -> Self {
        Self {
            motor_on,
            total_run_time_seconds: u16::try_from(run_time_seconds).unwrap_or(u16::MAX),
            error_code,
        }
    }

    pub fn encode(&self) -> [u8; STATUS_MESSAGE_LEN] {
        let [hi, lo] = self.total_run_time_seconds.to_be_bytes();
        [
            TAG_STATUS_UPDATE,
            u8::from(self.motor_on),
            hi,
            lo,
            self.error_code.to_byte(),
        ]
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ParseError> {
        let &tag = payload.first().ok_or(ParseError::Empty)?;
        if tag != TAG_STATUS_UPDATE {
            return Err(ParseError::UnexpectedTag {
                expected: TAG_STATUS_UPDATE,
                found: tag,
            });
        }
        if payload.len() < STATUS_MESSAGE_LEN {
            return Err(ParseError::TooShort {
                required: STATUS_MESSAGE_LEN,
                available: payload.len(),
            });
        }

        let motor_on = match payload[1] {
            0 => false,
            1 => true,
            other => return Err(ParseError::InvalidMotorStatus(other)),
        };

        Ok(Self {
            motor_on,
            total_run_time_seconds: u16::from_be_bytes([payload[2], payload[3]]),
            error_code: ErrorCode::from_byte(payload[4])?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_command_wire_bytes() {
        assert_eq!(CommandMessage::On.encode(), vec![0x01]);
        assert_eq!(CommandMessage::Off.encode(), vec![0x02]);
        assert_eq!(CommandMessage::StatusRequest.encode(), vec![0x03]);
        assert_eq!(CommandMessage::SetTimer { minutes: 15 }.encode(), vec![0x04, 15]);
    }

    #[test]
    fn test_command_decode_errors() {
        assert_eq!(CommandMessage::decode(&[]), Err(ParseError::Empty));
        assert_eq!(CommandMessage::decode(&[0x04]), Err(ParseError::MissingTimerData));
        assert_eq!(CommandMessage::decode(&[0x10]), Err(ParseError::UnknownTag(0x10)));
        assert_eq!(CommandMessage::decode(&[0x01, 0xAA]), Ok(CommandMessage::On));
    }

    #[test]
    fn test_status_wire_bytes() {
        let status = StatusMessage::new(true, 0x0102, ErrorCode::PowerFailure);
        assert_eq!(status.encode(), [0x10, 0x01, 0x01, 0x02, 0x01]);
    }

    #[test]
    fn test_status_run_time_saturates() {
        assert_eq!(StatusMessage::new(false, 65_535, ErrorCode::None).total_run_time_seconds, 65_535);
        assert_eq!(StatusMessage::new(false, 65_536, ErrorCode::None).total_run_time_seconds, 65_535);
        assert_eq!(StatusMessage::new(false, u64::MAX, ErrorCode::None).total_run_time_seconds, 65_535);
    }

    #[test]
    fn test_status_decode_errors() {
        assert_eq!(StatusMessage::decode(&[]), Err(ParseError::Empty));
        assert_eq!(
            StatusMessage::decode(&[0x01, 0, 0, 0, 0]),
            Err(ParseError::UnexpectedTag { expected: 0x10, found: 0x01 })
        );
        assert_eq!(
            StatusMessage::decode(&[0x10, 0x01, 0x00]),
            Err(ParseError::TooShort { required: 5, available: 3 })
        );
        assert_eq!(
            StatusMessage::decode(&[0x10, 0x02, 0, 0, 0]),
            Err(ParseError::InvalidMotorStatus(0x02))
        );
        assert_eq!(
            StatusMessage::decode(&[0x10, 0x00, 0, 0, 0x07]),
            Err(ParseError::UnknownErrorCode(0x07))
        );
    }

    fn any_command() -> impl Strategy<Value = CommandMessage> {
        prop_oneof![
            Just(CommandMessage::On),
            Just(CommandMessage::Off),
            Just(CommandMessage::StatusRequest),
            any::<u8>().prop_map(|minutes| CommandMessage::SetTimer { minutes }),
        ]
    }

    proptest! {
        #[test]
        fn test_command_round_trip(command in any_command()) {
            prop_assert_eq!(CommandMessage::decode(&command.encode()), Ok(command));
        }

        #[test]
        fn test_status_round_trip(motor_on in any::<bool>(), run_time in any::<u16>(), power_failure in any::<bool>()) {
            let error_code = if power_failure { ErrorCode::PowerFailure } else { ErrorCode::None };
            let status = StatusMessage::new(motor_on, run_time as u64, error_code);

            let decoded = StatusMessage::decode(&status.encode()).unwrap();
            prop_assert_eq!(decoded.motor_on, motor_on);
            prop_assert_eq!(decoded.total_run_time_seconds, run_time);
            prop_assert_eq!(decoded.error_code, error_code);
        }

        #[test]
        fn test_decode_never_panics(payload in any::<Vec<u8>>()) {
            let _ = CommandMessage::decode(&payload);
            let _ = StatusMessage::decode(&payload);
        }
    }
}
