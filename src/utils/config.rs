//! Unit configuration loaded from a JSON file
//!
//! Every section has serde defaults equal to the deployed values, so a file
//! only needs to name what differs.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::types::{AirSpeed, BufferSize, NodeIdentity, TxPower};
use crate::hardware::error::RadioError;
use crate::hardware::serial::TransportTiming;

/// Upper bound on a single receive window, so timers and alerts stay prompt
pub const MAX_POLL_TIMEOUT_MS: u64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("invalid {parameter}: {reason}")]
    InvalidParameter {
        parameter: &'static str,
        reason: String,
    },

    #[error("invalid radio settings: {0}")]
    Radio(#[from] RadioError),
}

/// Radio module and its serial/GPIO wiring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioSettings {
    pub serial_port: String,
    pub baud_rate: u32,
    pub frequency_mhz: u16,
    /// Own node address
    pub address: u16,
    pub power_dbm: u8,
    pub air_speed_bps: u32,
    pub buffer_size: u16,
    pub net_id: u8,
    pub crypt_key: u16,
    pub rssi_enabled: bool,
    pub m0_pin: u32,
    pub m1_pin: u32,
    pub address_filtering: bool,
    pub timing: TransportTiming,
}

impl Default for RadioSettings {
    fn default() -> Self {
        Self {
            serial_port: "/dev/ttyS0".to_string(),
            baud_rate: 9600,
            frequency_mhz: 433,
            address: 0,
            power_dbm: 22,
            air_speed_bps: 2400,
            buffer_size: 240,
            net_id: 0,
            crypt_key: 0,
            rssi_enabled: false,
            m0_pin: 22,
            m1_pin: 27,
            address_filtering: true,
            timing: TransportTiming::default(),
        }
    }
}

impl RadioSettings {
    /// Validated identity for the transport. Unknown table values are errors.
    pub fn identity(&self) -> Result<NodeIdentity, RadioError> {
        Ok(NodeIdentity::new(self.address, self.frequency_mhz)?
            .with_power(TxPower::from_dbm(self.power_dbm)?)
            .with_air_speed(AirSpeed::from_bps(self.air_speed_bps)?)
            .with_buffer_size(BufferSize::from_bytes(self.buffer_size)?)
            .with_net_id(self.net_id)
            .with_crypt_key(self.crypt_key)
            .with_rssi(self.rssi_enabled))
    }
}

/// Motor unit wiring and behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorSettings {
    /// Where responses, broadcasts and alerts are sent
    pub home_address: u16,
    pub relay_on_pin: u32,
    pub relay_off_pin: u32,
    pub relay_pulse_ms: u32,
    /// Active-low input, pulled up while mains is present
    pub power_loss_pin: u32,
    pub power_loss_sample_ms: u64,
    /// Consecutive low samples that count as a power loss
    pub power_loss_debounce_samples: u8,
    pub status_interval_secs: u64,
    /// Directory holding the persisted counters
    pub state_dir: PathBuf,
}

impl Default for MotorSettings {
    fn default() -> Self {
        Self {
            home_address: 30,
            relay_on_pin: 23,
            relay_off_pin: 24,
            relay_pulse_ms: 100,
            power_loss_pin: 25,
            power_loss_sample_ms: 10,
            power_loss_debounce_samples: 20,
            status_interval_secs: 300,
            state_dir: PathBuf::from("state"),
        }
    }
}

impl MotorSettings {
    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }
}

/// Home unit behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeSettings {
    pub motor_address: u16,
    pub response_timeout_ms: u64,
}

impl Default for HomeSettings {
    fn default() -> Self {
        Self {
            motor_address: 0,
            response_timeout_ms: 5000,
        }
    }
}

impl HomeSettings {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

/// Complete configuration of one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitConfig {
    pub radio: RadioSettings,
    pub motor: MotorSettings,
    pub home: HomeSettings,
    /// Receive window per loop iteration
    pub poll_timeout_ms: u64,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            radio: RadioSettings::default(),
            motor: MotorSettings::default(),
            home: HomeSettings::default(),
            poll_timeout_ms: MAX_POLL_TIMEOUT_MS,
        }
    }
}

impl UnitConfig {
    /// Defaults for the motor unit
    pub fn motor_default() -> Self {
        Self::default()
    }

    /// Defaults for the home unit, which owns the motor's home address
    pub fn home_default() -> Self {
        let mut config = Self::default();
        config.radio.address = config.motor.home_address;
        config
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Load, parse and validate a configuration file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: UnitConfig =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        config.validate()?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check every value the units depend on before any hardware is touched
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.radio.identity()?;

        if self.poll_timeout_ms == 0 || self.poll_timeout_ms > MAX_POLL_TIMEOUT_MS {
            return Err(invalid(
                "poll_timeout_ms",
                format!("{} is outside 1..={}", self.poll_timeout_ms, MAX_POLL_TIMEOUT_MS),
            ));
        }
        if self.radio.timing.quiet_polls == 0 {
            return Err(invalid("radio.timing.quiet_polls", "must be at least 1".to_string()));
        }
        if self.radio.m0_pin == self.radio.m1_pin {
            return Err(invalid(
                "radio.m1_pin",
                format!("shares GPIO {} with m0_pin", self.radio.m0_pin),
            ));
        }
        if self.motor.relay_on_pin == self.motor.relay_off_pin {
            return Err(invalid(
                "motor.relay_off_pin",
                format!("shares GPIO {} with relay_on_pin", self.motor.relay_on_pin),
            ));
        }
        if self.motor.status_interval_secs == 0 {
            return Err(invalid("motor.status_interval_secs", "must be positive".to_string()));
        }
        if self.motor.power_loss_debounce_samples == 0 {
            return Err(invalid(
                "motor.power_loss_debounce_samples",
                "must be at least 1".to_string(),
            ));
        }
        if self.home.response_timeout_ms == 0 {
            return Err(invalid("home.response_timeout_ms", "must be positive".to_string()));
        }

        Ok(())
    }
}

fn invalid(parameter: &'static str, reason: String) -> ConfigError {
    ConfigError::InvalidParameter { parameter, reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_deployment() {
        let config = UnitConfig::default();
        config.validate().unwrap();

        let identity = config.radio.identity().unwrap();
        assert_eq!(identity.frequency_mhz(), 433);
        assert_eq!(identity.address, 0);
        assert_eq!(config.motor.home_address, 30);
        assert_eq!(config.home.response_timeout(), Duration::from_secs(5));
        assert_eq!(UnitConfig::home_default().radio.address, 30);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: UnitConfig =
            serde_json::from_str(r#"{ "radio": { "address": 7 }, "home": { "motor_address": 9 } }"#)
                .unwrap();

        assert_eq!(config.radio.address, 7);
        assert_eq!(config.radio.frequency_mhz, 433);
        assert_eq!(config.home.motor_address, 9);
        assert_eq!(config.motor, MotorSettings::default());
    }

    #[test]
    fn test_strict_radio_values() {
        let mut config = UnitConfig::default();
        config.radio.power_dbm = 20;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Radio(RadioError::InvalidParameter { parameter: "power_dbm", .. }))
        ));

        let mut config = UnitConfig::default();
        config.radio.frequency_mhz = 600;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Radio(RadioError::InvalidFrequency { mhz: 600 }))
        ));
    }

    #[test]
    fn test_poll_timeout_is_bounded() {
        let mut config = UnitConfig::default();
        config.poll_timeout_ms = 2000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidParameter { parameter: "poll_timeout_ms", .. })
        ));
    }

    #[test]
    fn test_config_file_round_trip() {
        let path = PathBuf::from("test_unit_config.json");
        let mut config = UnitConfig::home_default();
        config.radio.rssi_enabled = true;
        config.home.response_timeout_ms = 2500;

        config.save_to_file(&path).unwrap();
        let loaded = UnitConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let error = UnitConfig::load_from_file("does_not_exist.json").unwrap_err();
        assert!(error.to_string().contains("does_not_exist.json"));
    }
}
