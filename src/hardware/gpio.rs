//! Host-side GPIO and delay for Linux boards
//!
//! Lines are driven through the sysfs GPIO interface, which needs no extra
//! crate beyond the embedded-hal traits the drivers are written against.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorKind, ErrorType, InputPin, OutputPin};

/// Where the kernel exposes the sysfs GPIO interface
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

#[derive(Debug, thiserror::Error)]
pub enum GpioError {
    #[error("GPIO {line}: {source}")]
    Io {
        line: u32,
        #[source]
        source: io::Error,
    },

    #[error("GPIO {line}: unexpected value {content:?}")]
    InvalidValue { line: u32, content: String },
}

impl embedded_hal::digital::Error for GpioError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// One GPIO line exported through sysfs
#[derive(Debug)]
pub struct SysfsPin {
    line: u32,
    value_path: PathBuf,
}

impl SysfsPin {
    /// Export `line` as an output, starting low
    pub fn output(line: u32) -> Result<Self, GpioError> {
        Self::output_at(SYSFS_GPIO_ROOT, line)
    }

    /// Export `line` as an input
    pub fn input(line: u32) -> Result<Self, GpioError> {
        Self::input_at(SYSFS_GPIO_ROOT, line)
    }

    pub fn output_at(root: impl AsRef<Path>, line: u32) -> Result<Self, GpioError> {
        // "low" sets direction and initial level in one write
        Self::open(root.as_ref(), line, "low")
    }

    pub fn input_at(root: impl AsRef<Path>, line: u32) -> Result<Self, GpioError> {
        Self::open(root.as_ref(), line, "in")
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    fn open(root: &Path, line: u32, direction: &str) -> Result<Self, GpioError> {
        let io_err = |source| GpioError::Io { line, source };
        let pin_dir = root.join(format!("gpio{line}"));

        if !pin_dir.exists() {
            fs::write(root.join("export"), line.to_string()).map_err(io_err)?;
        }
        fs::write(pin_dir.join("direction"), direction).map_err(io_err)?;

        tracing::debug!(line, direction, "GPIO exported");
        Ok(Self {
            line,
            value_path: pin_dir.join("value"),
        })
    }

    fn read_level(&self) -> Result<bool, GpioError> {
        let content = fs::read_to_string(&self.value_path).map_err(|source| GpioError::Io {
            line: self.line,
            source,
        })?;

        match content.trim() {
            "0" => Ok(false),
            "1" => Ok(true),
            other => Err(GpioError::InvalidValue {
                line: self.line,
                content: other.to_string(),
            }),
        }
    }

    fn write_level(&self, high: bool) -> Result<(), GpioError> {
        fs::write(&self.value_path, if high { "1" } else { "0" }).map_err(|source| {
            GpioError::Io {
                line: self.line,
                source,
            }
        })
    }
}

impl ErrorType for SysfsPin {
    type Error = GpioError;
}

impl OutputPin for SysfsPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.write_level(false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.write_level(true)
    }
}

impl InputPin for SysfsPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.read_level()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.read_level().map(|high| !high)
    }
}

/// Blocking delay on the current thread
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(ns as u64));
    }

    fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_root(name: &str, line: u32) -> PathBuf {
        let root = std::env::temp_dir().join(format!("motorlink_gpio_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(root.join(format!("gpio{line}"))).unwrap();
        fs::write(root.join(format!("gpio{line}/value")), "0\n").unwrap();
        root
    }

    #[test]
    fn test_output_pin_writes_value_file() {
        let root = fake_root("output", 23);
        let mut pin = SysfsPin::output_at(&root, 23).unwrap();

        pin.set_high().unwrap();
        assert_eq!(fs::read_to_string(root.join("gpio23/value")).unwrap(), "1");
        assert_eq!(fs::read_to_string(root.join("gpio23/direction")).unwrap(), "low");
        pin.set_low().unwrap();
        assert_eq!(fs::read_to_string(root.join("gpio23/value")).unwrap(), "0");

        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_input_pin_reads_kernel_format() {
        let root = fake_root("input", 25);
        let mut pin = SysfsPin::input_at(&root, 25).unwrap();

        assert!(pin.is_low().unwrap());
        fs::write(root.join("gpio25/value"), "1\n").unwrap();
        assert!(pin.is_high().unwrap());
        fs::write(root.join("gpio25/value"), "x").unwrap();
        assert!(matches!(pin.is_high(), Err(GpioError::InvalidValue { line: 25, .. })));

        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_unexported_line_is_exported_first() {
        let root = fake_root("export", 1);
        // Export of a line the fake kernel never creates fails on direction
        let result = SysfsPin::output_at(&root, 24);

        assert_eq!(fs::read_to_string(root.join("export")).unwrap(), "24");
        assert!(matches!(result, Err(GpioError::Io { line: 24, .. })));

        fs::remove_dir_all(root).unwrap();
    }
}
