//! Wire-level constants shared by both units

/// Address that every node accepts frames for
pub const BROADCAST_ADDRESS: u16 = 0xFFFF;

/// Header written before the register parameters when configuring the module
pub const REGISTER_WRITE_HEADER: [u8; 3] = [0xC2, 0x00, 0x09];

/// First byte of a successful configuration acknowledgement
pub const REGISTER_ACK_MARKER: u8 = 0xC1;

/// Length of the configuration acknowledgement
pub const REGISTER_ACK_LEN: usize = 3;

/// Length of the full register image, header included
pub const REGISTER_IMAGE_LEN: usize = 12;

/// Bytes taken by the destination address at the head of every frame
pub const ADDRESS_LEN: usize = 2;

pub const TAG_ON: u8 = 0x01;
pub const TAG_OFF: u8 = 0x02;
pub const TAG_STATUS_REQUEST: u8 = 0x03;
pub const TAG_SET_TIMER: u8 = 0x04;
pub const TAG_STATUS_UPDATE: u8 = 0x10;

pub const ERROR_CODE_NONE: u8 = 0x00;
pub const ERROR_CODE_POWER_FAILURE: u8 = 0x01;

/// Encoded length of a status update
pub const STATUS_MESSAGE_LEN: usize = 5;
