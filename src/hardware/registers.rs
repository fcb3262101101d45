//! Configuration register image for the UART LoRa module
//!
//! The module is configured by writing a 12-byte image while the mode lines
//! select configuration mode:
//!
//! | offset | content                                   |
//! |--------|-------------------------------------------|
//! | 0..3   | write command header `C2 00 09`           |
//! | 3      | network id                                |
//! | 4, 5   | own address, MSB then LSB                 |
//! | 6      | UART rate (9600 8N1) and air data rate    |
//! | 7      | buffer size and transmit power            |
//! | 8      | channel offset from the band base         |
//! | 9      | transmission options (RSSI byte, WOR)     |
//! | 10, 11 | crypt key, MSB then LSB                   |

use bitflags::bitflags;

use crate::core::constants::{REGISTER_IMAGE_LEN, REGISTER_WRITE_HEADER};
use crate::core::types::{AirSpeed, BufferSize, NodeIdentity, TxPower};
use crate::hardware::error::RadioResult;

/// UART at 9600 baud, 8N1
const UART_9600_8N1: u8 = 0x60;

bitflags! {
    /// Options byte (offset 9)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TransmissionOptions: u8 {
        /// Append a signal strength byte to every received frame
        const RSSI_BYTE = 0x80;
        const FIXED_POINT = 0x40;
        const RELAY = 0x20;
        const LISTEN_BEFORE_TALK = 0x10;
        const WOR_TRANSMITTER = 0x08;
        /// Wake-on-radio cycle of 2000ms
        const WOR_CYCLE_2000MS = 0x03;
    }
}

impl Default for TransmissionOptions {
    fn default() -> Self {
        TransmissionOptions::WOR_CYCLE_2000MS
    }
}

impl TxPower {
    fn register_bits(self) -> u8 {
        match self {
            TxPower::Dbm22 => 0x00,
            TxPower::Dbm17 => 0x01,
            TxPower::Dbm13 => 0x02,
            TxPower::Dbm10 => 0x03,
        }
    }
}

impl AirSpeed {
    fn register_bits(self) -> u8 {
        match self {
            AirSpeed::Bps300 => 0x00,
            AirSpeed::Bps1200 => 0x01,
            AirSpeed::Bps2400 => 0x02,
            AirSpeed::Bps4800 => 0x03,
            AirSpeed::Bps9600 => 0x04,
            AirSpeed::Bps19200 => 0x05,
            AirSpeed::Bps38400 => 0x06,
            AirSpeed::Bps62500 => 0x07,
        }
    }
}

impl BufferSize {
    fn register_bits(self) -> u8 {
        match self {
            BufferSize::Bytes240 => 0x00,
            BufferSize::Bytes128 => 0x40,
            BufferSize::Bytes64 => 0x80,
            BufferSize::Bytes32 => 0xC0,
        }
    }
}

/// Complete register image, header included
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterImage([u8; REGISTER_IMAGE_LEN]);

impl RegisterImage {
    pub fn as_bytes(&self) -> &[u8; REGISTER_IMAGE_LEN] {
        &self.0
    }

    pub fn address(&self) -> u16 {
        u16::from_be_bytes([self.0[4], self.0[5]])
    }

    pub fn channel_offset(&self) -> u8 {
        self.0[8]
    }

    pub fn options(&self) -> TransmissionOptions {
        TransmissionOptions::from_bits_retain(self.0[9])
    }
}

/// Maps human radio parameters to the register image. Pure, no I/O.
pub struct RegisterConfig;

impl RegisterConfig {
    /// Build an image from raw parameters.
    ///
    /// Every lookup is strict: a frequency outside both bands fails with
    /// `InvalidFrequency`, and a power, air speed or buffer size the module
    /// has no encoding for fails with `InvalidParameter`.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        freq_mhz: u16,
        address: u16,
        power_dbm: u8,
        rssi_enabled: bool,
        air_speed_bps: u32,
        net_id: u8,
        buffer_size: u16,
        crypt_key: u16,
    ) -> RadioResult<RegisterImage> {
        let identity = NodeIdentity::new(address, freq_mhz)?
            .with_power(TxPower::from_dbm(power_dbm)?)
            .with_air_speed(AirSpeed::from_bps(air_speed_bps)?)
            .with_buffer_size(BufferSize::from_bytes(buffer_size)?)
            .with_net_id(net_id)
            .with_crypt_key(crypt_key)
            .with_rssi(rssi_enabled);

        Ok(Self::from_identity(&identity))
    }

    /// Build an image from an already validated identity
    pub fn from_identity(identity: &NodeIdentity) -> RegisterImage {
        let mut options = TransmissionOptions::default();
        options.set(TransmissionOptions::RSSI_BYTE, identity.rssi_enabled);

        let [address_hi, address_lo] = identity.address.to_be_bytes();
        let [crypt_hi, crypt_lo] = identity.crypt_key.to_be_bytes();

        let mut image = [0u8; REGISTER_IMAGE_LEN];
        image[..3].copy_from_slice(&REGISTER_WRITE_HEADER);
        image[3] = identity.net_id;
        image[4] = address_hi;
        image[5] = address_lo;
        image[6] = UART_9600_8N1 | identity.air_speed.register_bits();
        image[7] = identity.buffer_size.register_bits() | identity.power.register_bits();
        image[8] = identity.channel_offset;
        image[9] = options.bits();
        image[10] = crypt_hi;
        image[11] = crypt_lo;

        RegisterImage(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::error::RadioError;

    #[test]
    fn test_deployed_configuration() {
        let image = RegisterConfig::build(433, 30, 22, false, 2400, 0, 240, 0).unwrap();
        assert_eq!(
            image.as_bytes(),
            &[0xC2, 0x00, 0x09, 0x00, 0x00, 0x1E, 0x62, 0x00, 0x17, 0x03, 0x00, 0x00]
        );
        assert_eq!(image.address(), 30);
    }

    #[test]
    fn test_packed_fields() {
        let image = RegisterConfig::build(868, 0xABCD, 10, true, 62500, 7, 32, 0x1234).unwrap();
        let bytes = image.as_bytes();

        assert_eq!(bytes[3], 7);
        assert_eq!((bytes[4], bytes[5]), (0xAB, 0xCD));
        assert_eq!(bytes[6], 0x67);
        assert_eq!(bytes[7], 0xC3);
        assert_eq!(bytes[8], 18);
        assert!(image.options().contains(TransmissionOptions::RSSI_BYTE));
        assert_eq!((bytes[10], bytes[11]), (0x12, 0x34));
    }

    #[test]
    fn test_rssi_flag_only_touches_high_bit() {
        let off = RegisterConfig::build(433, 1, 22, false, 2400, 0, 240, 0).unwrap();
        let on = RegisterConfig::build(433, 1, 22, true, 2400, 0, 240, 0).unwrap();
        assert_eq!(on.as_bytes()[9] ^ off.as_bytes()[9], 0x80);
        assert_eq!(&on.as_bytes()[..9], &off.as_bytes()[..9]);
    }

    #[test]
    fn test_build_is_deterministic() {
        for freq in [410, 433, 493, 850, 915, 930] {
            for power in [10, 13, 17, 22] {
                for speed in AirSpeed::ALL.map(AirSpeed::bps) {
                    for buffer in [32, 64, 128, 240] {
                        let first = RegisterConfig::build(freq, 5, power, false, speed, 0, buffer, 0);
                        let second = RegisterConfig::build(freq, 5, power, false, speed, 0, buffer, 0);
                        assert_eq!(first.unwrap(), second.unwrap());
                    }
                }
            }
        }
    }

    #[test]
    fn test_unknown_values_fail_instead_of_defaulting() {
        assert!(matches!(
            RegisterConfig::build(433, 0, 20, false, 2400, 0, 240, 0),
            Err(RadioError::InvalidParameter { parameter: "power_dbm", value: 20 })
        ));
        assert!(matches!(
            RegisterConfig::build(433, 0, 22, false, 115200, 0, 240, 0),
            Err(RadioError::InvalidParameter { parameter: "air_speed_bps", .. })
        ));
        assert!(matches!(
            RegisterConfig::build(433, 0, 22, false, 2400, 0, 256, 0),
            Err(RadioError::InvalidParameter { parameter: "buffer_size", .. })
        ));
        assert!(matches!(
            RegisterConfig::build(300, 0, 22, false, 2400, 0, 240, 0),
            Err(RadioError::InvalidFrequency { mhz: 300 })
        ));
    }
}
