//! Hardware abstraction layer for the radio module and motor lines
//!
//! The radio is reached through the [`Transceiver`] trait; the serial driver
//! implements it over a UART plus two mode lines, and the mock implements it
//! in memory. GPIO access goes through the embedded-hal traits so the same
//! drivers run against sysfs lines or test doubles.

pub mod error;
pub mod gpio;
pub mod mock;
pub mod registers;
pub mod relay;
pub mod serial;
pub mod transceiver;

pub use error::{RadioError, RadioResult, RecoveryStrategy};
pub use gpio::{GpioError, StdDelay, SysfsPin};
pub use mock::{MockAir, MockLinkHandle, MockRelays, MockTransceiver};
pub use registers::{RegisterConfig, RegisterImage, TransmissionOptions};
pub use relay::{PulseRelays, RelayDriver, RelayError};
pub use serial::{open_serial, RadioTransport, SerialLink, TransportTiming};
pub use transceiver::{
    recover_link, CancelToken, RadioMode, ReceiveOutcome, Transceiver, TransceiverStatus,
};
