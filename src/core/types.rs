//! Core data types for the radio link

use crate::core::constants::{ADDRESS_LEN, BROADCAST_ADDRESS};
use crate::hardware::error::{RadioError, RadioResult};

/// Frequency band supported by the module family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrequencyBand {
    /// 410-493 MHz modules (433 MHz ISM)
    Mhz410,
    /// 850-930 MHz modules (868/915 MHz ISM)
    Mhz850,
}

impl FrequencyBand {
    pub fn base_mhz(self) -> u16 {
        match self {
            FrequencyBand::Mhz410 => 410,
            FrequencyBand::Mhz850 => 850,
        }
    }

    pub fn max_offset(self) -> u8 {
        match self {
            FrequencyBand::Mhz410 => 83,
            FrequencyBand::Mhz850 => 80,
        }
    }

    /// Split a frequency into band and channel offset
    pub fn locate(frequency_mhz: u16) -> RadioResult<(Self, u8)> {
        [FrequencyBand::Mhz850, FrequencyBand::Mhz410]
            .into_iter()
            .find_map(|band| {
                let offset = frequency_mhz.checked_sub(band.base_mhz())?;
                (offset <= band.max_offset() as u16).then_some((band, offset as u8))
            })
            .ok_or(RadioError::InvalidFrequency { mhz: frequency_mhz })
    }
}

/// Transmit power
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxPower {
    Dbm22,
    Dbm17,
    Dbm13,
    Dbm10,
}

impl TxPower {
    pub fn from_dbm(dbm: u8) -> RadioResult<Self> {
        match dbm {
            22 => Ok(TxPower::Dbm22),
            17 => Ok(TxPower::Dbm17),
            13 => Ok(TxPower::Dbm13),
            10 => Ok(TxPower::Dbm10),
            other => Err(RadioError::InvalidParameter {
                parameter: "power_dbm",
                value: other as u32,
            }),
        }
    }

    pub fn dbm(self) -> u8 {
        match self {
            TxPower::Dbm22 => 22,
            TxPower::Dbm17 => 17,
            TxPower::Dbm13 => 13,
            TxPower::Dbm10 => 10,
        }
    }
}

/// Over-the-air data rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AirSpeed {
    Bps300,
    Bps1200,
    Bps2400,
    Bps4800,
    Bps9600,
    Bps19200,
    Bps38400,
    Bps62500,
}

impl AirSpeed {
    pub const ALL: [AirSpeed; 8] = [
        AirSpeed::Bps300,
        AirSpeed::Bps1200,
        AirSpeed::Bps2400,
        AirSpeed::Bps4800,
        AirSpeed::Bps9600,
        AirSpeed::Bps19200,
        AirSpeed::Bps38400,
        AirSpeed::Bps62500,
    ];

    pub fn from_bps(bps: u32) -> RadioResult<Self> {
        Self::ALL
            .into_iter()
            .find(|speed| speed.bps() == bps)
            .ok_or(RadioError::InvalidParameter {
                parameter: "air_speed_bps",
                value: bps,
            })
    }

    pub fn bps(self) -> u32 {
        match self {
            AirSpeed::Bps300 => 300,
            AirSpeed::Bps1200 => 1200,
            AirSpeed::Bps2400 => 2400,
            AirSpeed::Bps4800 => 4800,
            AirSpeed::Bps9600 => 9600,
            AirSpeed::Bps19200 => 19200,
            AirSpeed::Bps38400 => 38400,
            AirSpeed::Bps62500 => 62500,
        }
    }
}

/// Module packet buffer ("sub-packet") size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferSize {
    Bytes240,
    Bytes128,
    Bytes64,
    Bytes32,
}

impl BufferSize {
    pub fn from_bytes(bytes: u16) -> RadioResult<Self> {
        match bytes {
            240 => Ok(BufferSize::Bytes240),
            128 => Ok(BufferSize::Bytes128),
            64 => Ok(BufferSize::Bytes64),
            32 => Ok(BufferSize::Bytes32),
            other => Err(RadioError::InvalidParameter {
                parameter: "buffer_size",
                value: other as u32,
            }),
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            BufferSize::Bytes240 => 240,
            BufferSize::Bytes128 => 128,
            BufferSize::Bytes64 => 64,
            BufferSize::Bytes32 => 32,
        }
    }
}

/// Radio parameters of one node.
///
/// Owned by a single transport and changed only through `configure`,
/// which re-derives the register image from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub address: u16,
    pub frequency_band: FrequencyBand,
    pub channel_offset: u8,
    pub power: TxPower,
    pub air_speed: AirSpeed,
    pub buffer_size: BufferSize,
    pub net_id: u8,
    pub crypt_key: u16,
    pub rssi_enabled: bool,
}

impl NodeIdentity {
    /// Identity with the deployed defaults: 22 dBm, 2400 bps, 240-byte buffer,
    /// no RSSI byte.
    pub fn new(address: u16, frequency_mhz: u16) -> RadioResult<Self> {
        let (frequency_band, channel_offset) = FrequencyBand::locate(frequency_mhz)?;

        Ok(Self {
            address,
            frequency_band,
            channel_offset,
            power: TxPower::Dbm22,
            air_speed: AirSpeed::Bps2400,
            buffer_size: BufferSize::Bytes240,
            net_id: 0,
            crypt_key: 0,
            rssi_enabled: false,
        })
    }

    pub fn with_power(mut self, power: TxPower) -> Self {
        self.power = power;
        self
    }

    pub fn with_air_speed(mut self, air_speed: AirSpeed) -> Self {
        self.air_speed = air_speed;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: BufferSize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_rssi(mut self, enabled: bool) -> Self {
        self.rssi_enabled = enabled;
        self
    }

    pub fn with_net_id(mut self, net_id: u8) -> Self {
        self.net_id = net_id;
        self
    }

    pub fn with_crypt_key(mut self, crypt_key: u16) -> Self {
        self.crypt_key = crypt_key;
        self
    }

    pub fn frequency_mhz(&self) -> u16 {
        self.frequency_band.base_mhz() + self.channel_offset as u16
    }

    /// Largest application payload a single frame can carry
    pub fn max_payload_len(&self) -> usize {
        self.buffer_size.bytes() - ADDRESS_LEN - usize::from(self.rssi_enabled)
    }

    /// Whether a frame for `destination` is addressed to this node
    pub fn accepts(&self, destination: u16) -> bool {
        destination == self.address || destination == BROADCAST_ADDRESS
    }
}

/// Addressed frame as seen by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub destination: u16,
    pub payload: Vec<u8>,
    /// Signal strength of a received frame, when the module reports it
    pub rssi_dbm: Option<i16>,
}

impl Packet {
    pub fn new(destination: u16, payload: Vec<u8>) -> Self {
        Self {
            destination,
            payload,
            rssi_dbm: None,
        }
    }

    pub fn with_rssi(mut self, rssi_dbm: i16) -> Self {
        self.rssi_dbm = Some(rssi_dbm);
        self
    }

    /// Bytes written to the serial link: `[dest_hi][dest_lo][payload..]`
    pub fn to_frame(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(ADDRESS_LEN + self.payload.len());
        frame.extend_from_slice(&self.destination.to_be_bytes());
        frame.extend_from_slice(&self.payload);
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_frequency() {
        assert_eq!(FrequencyBand::locate(433).unwrap(), (FrequencyBand::Mhz410, 23));
        assert_eq!(FrequencyBand::locate(410).unwrap(), (FrequencyBand::Mhz410, 0));
        assert_eq!(FrequencyBand::locate(868).unwrap(), (FrequencyBand::Mhz850, 18));
        assert_eq!(FrequencyBand::locate(930).unwrap(), (FrequencyBand::Mhz850, 80));
    }

    #[test]
    fn test_locate_rejects_gaps() {
        for mhz in [0, 409, 494, 700, 849, 931] {
            assert!(matches!(
                FrequencyBand::locate(mhz),
                Err(RadioError::InvalidFrequency { mhz: m }) if m == mhz
            ));
        }
    }

    #[test]
    fn test_parameter_tables_are_strict() {
        assert!(TxPower::from_dbm(20).is_err());
        assert!(AirSpeed::from_bps(2401).is_err());
        assert!(BufferSize::from_bytes(100).is_err());
        assert_eq!(AirSpeed::from_bps(62500).unwrap(), AirSpeed::Bps62500);
    }

    #[test]
    fn test_payload_limit_accounts_for_rssi() {
        let identity = NodeIdentity::new(0, 433).unwrap();
        assert_eq!(identity.max_payload_len(), 238);
        assert_eq!(identity.clone().with_rssi(true).max_payload_len(), 237);
        assert_eq!(
            identity.with_buffer_size(BufferSize::Bytes32).max_payload_len(),
            30
        );
    }

    #[test]
    fn test_accepts_own_and_broadcast() {
        let identity = NodeIdentity::new(30, 433).unwrap();
        assert!(identity.accepts(30));
        assert!(identity.accepts(BROADCAST_ADDRESS));
        assert!(!identity.accepts(0));
    }

    #[test]
    fn test_packet_frame_layout() {
        let packet = Packet::new(0x1E02, vec![0x01, 0x02]);
        assert_eq!(packet.to_frame(), vec![0x1E, 0x02, 0x01, 0x02]);
    }
}
