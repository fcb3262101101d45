//! Serial/UART driver for the LoRa module
//!
//! The module sits behind a UART and two mode-control lines. The driver owns
//! both: it switches modes, writes the register image, frames outgoing
//! packets and reassembles incoming frames from whatever the UART delivers.

use std::io;
use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{OutputPin, PinState};
use serde::{Deserialize, Serialize};
use serialport::SerialPort;

use crate::core::constants::{ADDRESS_LEN, REGISTER_ACK_LEN, REGISTER_ACK_MARKER};
use crate::core::types::{NodeIdentity, Packet};
use crate::hardware::error::{RadioError, RadioResult};
use crate::hardware::registers::RegisterConfig;
use crate::hardware::transceiver::{
    CancelToken, RadioMode, ReceiveOutcome, Transceiver, TransceiverStatus,
};

/// Byte-level access to the UART
pub trait SerialLink {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Append whatever is already buffered to `buf` without blocking
    fn read_available(&mut self, buf: &mut Vec<u8>) -> io::Result<usize>;

    /// Fill `buf` as far as possible, waiting at most `timeout` overall
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Discard unread input
    fn clear_input(&mut self) -> io::Result<()>;
}

impl SerialLink for Box<dyn SerialPort> {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        io::Write::write_all(self, bytes)?;
        io::Write::flush(self)
    }

    fn read_available(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        let waiting = self.bytes_to_read().map_err(io::Error::from)? as usize;
        if waiting == 0 {
            return Ok(0);
        }

        let start = buf.len();
        buf.resize(start + waiting, 0);
        let read = match io::Read::read(self, &mut buf[start..]) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => 0,
            Err(e) => {
                buf.truncate(start);
                return Err(e);
            }
        };
        buf.truncate(start + read);
        Ok(read)
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        let deadline = Instant::now() + timeout;
        let mut filled = 0;

        while filled < buf.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            self.set_timeout(remaining).map_err(io::Error::from)?;

            match io::Read::read(self, &mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) => return Err(e),
            }
        }

        Ok(filled)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.clear(serialport::ClearBuffer::Input)
            .map_err(io::Error::from)
    }
}

/// Open the UART the module is wired to. Failure here is fatal.
pub fn open_serial(port: &str, baud_rate: u32) -> RadioResult<Box<dyn SerialPort>> {
    serialport::new(port, baud_rate)
        .timeout(Duration::from_millis(100))
        .data_bits(serialport::DataBits::Eight)
        .stop_bits(serialport::StopBits::One)
        .parity(serialport::Parity::None)
        .open()
        .map_err(|e| RadioError::SerialUnavailable {
            port: port.to_string(),
            reason: e.to_string(),
        })
}

/// Delays and polling cadence of the driver
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportTiming {
    /// Wait after each mode-line change before the UART is usable
    pub mode_settle_ms: u32,
    /// Wait after writing a frame before leaving transmit mode
    pub transmit_settle_ms: u32,
    /// Read window for the configuration acknowledgement
    pub config_ack_timeout_ms: u32,
    /// Pause between receive polls
    pub poll_interval_ms: u32,
    /// Consecutive empty polls that close a partially received frame
    pub quiet_polls: u8,
}

impl Default for TransportTiming {
    fn default() -> Self {
        Self {
            mode_settle_ms: 20,
            transmit_settle_ms: 100,
            config_ack_timeout_ms: 1000,
            poll_interval_ms: 10,
            quiet_polls: 2,
        }
    }
}

impl TransportTiming {
    /// No waiting at all, for simulated links
    pub fn immediate() -> Self {
        Self {
            mode_settle_ms: 0,
            transmit_settle_ms: 0,
            config_ack_timeout_ms: 0,
            poll_interval_ms: 0,
            quiet_polls: 1,
        }
    }
}

/// Driver for a UART LoRa module with M0/M1 mode lines
pub struct RadioTransport<S, M0, M1, D> {
    serial: S,
    m0: M0,
    m1: M1,
    delay: D,
    identity: NodeIdentity,
    timing: TransportTiming,
    address_filtering: bool,
    mode: RadioMode,
    rx_buffer: Vec<u8>,
    quiet_polls: u8,
    interrupt: Option<CancelToken>,
    status: TransceiverStatus,
}

impl<S, M0, M1, D> RadioTransport<S, M0, M1, D>
where
    S: SerialLink,
    M0: OutputPin,
    M1: OutputPin,
    D: DelayNs,
{
    /// Take ownership of the link and put the module in standby.
    ///
    /// The module is not configured yet; see [`RadioTransport::start`].
    pub fn new(
        serial: S,
        m0: M0,
        m1: M1,
        delay: D,
        identity: NodeIdentity,
        timing: TransportTiming,
    ) -> RadioResult<Self> {
        let mut transport = Self {
            serial,
            m0,
            m1,
            delay,
            identity,
            timing,
            address_filtering: true,
            mode: RadioMode::Standby,
            rx_buffer: Vec::with_capacity(256),
            quiet_polls: 0,
            interrupt: None,
            status: TransceiverStatus::default(),
        };

        transport.set_mode(RadioMode::Standby)?;
        transport.serial.clear_input()?;
        Ok(transport)
    }

    /// Construct and apply `identity` in one step
    pub fn start(
        serial: S,
        m0: M0,
        m1: M1,
        delay: D,
        identity: NodeIdentity,
        timing: TransportTiming,
    ) -> RadioResult<Self> {
        let mut transport = Self::new(serial, m0, m1, delay, identity.clone(), timing)?;
        transport.configure(&identity)?;
        Ok(transport)
    }

    /// Deliver frames for any address when disabled
    pub fn with_address_filtering(mut self, enabled: bool) -> Self {
        self.address_filtering = enabled;
        self
    }

    /// Put the module into its lowest power mode
    pub fn sleep(&mut self) -> RadioResult<()> {
        self.set_mode(RadioMode::Sleep)
    }

    fn set_mode(&mut self, mode: RadioMode) -> RadioResult<()> {
        let (m0, m1) = mode.line_levels();
        self.m0
            .set_state(PinState::from(m0))
            .map_err(|e| RadioError::pin("M0", e))?;
        self.m1
            .set_state(PinState::from(m1))
            .map_err(|e| RadioError::pin("M1", e))?;
        self.delay.delay_ms(self.timing.mode_settle_ms);

        tracing::trace!(from = ?self.mode, to = ?mode, "radio mode switch");
        self.mode = mode;
        Ok(())
    }

    fn write_registers(&mut self, identity: &NodeIdentity) -> RadioResult<()> {
        self.serial.clear_input()?;
        self.rx_buffer.clear();
        self.quiet_polls = 0;

        let image = RegisterConfig::from_identity(identity);
        self.serial.write_all(image.as_bytes())?;

        let mut ack = [0u8; REGISTER_ACK_LEN];
        let timeout = Duration::from_millis(self.timing.config_ack_timeout_ms as u64);
        let read = self.serial.read_timeout(&mut ack, timeout)?;

        if read == 0 {
            return Err(RadioError::ConfigurationTimeout {
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        if ack[0] != REGISTER_ACK_MARKER {
            return Err(RadioError::ConfigurationRejected {
                response: ack[..read].to_vec(),
            });
        }
        Ok(())
    }

    /// Split the receive buffer into a frame once it is complete
    fn take_complete_frame(&mut self) -> Option<Vec<u8>> {
        if self.rx_buffer.is_empty() {
            return None;
        }

        let max_frame = self.identity.buffer_size.bytes();
        if self.quiet_polls < self.timing.quiet_polls.max(1) && self.rx_buffer.len() < max_frame {
            return None;
        }

        let end = self.rx_buffer.len().min(max_frame);
        self.quiet_polls = 0;
        Some(self.rx_buffer.drain(..end).collect())
    }

    fn parse_frame(&mut self, mut frame: Vec<u8>) -> RadioResult<ReceiveOutcome> {
        let rssi_len = usize::from(self.identity.rssi_enabled);
        if frame.len() < ADDRESS_LEN + rssi_len {
            return Err(RadioError::MalformedFrame {
                len: frame.len(),
                reason: "shorter than the address header",
            });
        }

        let destination = u16::from_be_bytes([frame[0], frame[1]]);
        if self.address_filtering && !self.identity.accepts(destination) {
            self.status.frames_not_for_us += 1;
            tracing::debug!(destination, own = self.identity.address, "frame not for us");
            return Ok(ReceiveOutcome::NotForUs { destination });
        }

        let rssi_dbm = if self.identity.rssi_enabled {
            frame.pop().map(|raw| -(256 - raw as i16))
        } else {
            None
        };
        frame.drain(..ADDRESS_LEN);

        self.status.frames_received += 1;
        if rssi_dbm.is_some() {
            self.status.last_rssi_dbm = rssi_dbm;
        }
        tracing::debug!(destination, len = frame.len(), rssi = ?rssi_dbm, "frame received");

        Ok(ReceiveOutcome::Packet(Packet {
            destination,
            payload: frame,
            rssi_dbm,
        }))
    }
}

impl<S, M0, M1, D> Transceiver for RadioTransport<S, M0, M1, D>
where
    S: SerialLink,
    M0: OutputPin,
    M1: OutputPin,
    D: DelayNs,
{
    fn configure(&mut self, identity: &NodeIdentity) -> RadioResult<()> {
        if self.mode != RadioMode::Standby {
            self.set_mode(RadioMode::Standby)?;
        }
        self.mode = RadioMode::Configuring;

        if let Err(e) = self.write_registers(identity) {
            tracing::error!(error = %e, "module configuration failed");
            self.set_mode(RadioMode::Standby)?;
            return Err(e);
        }

        self.identity = identity.clone();
        tracing::info!(
            address = identity.address,
            frequency_mhz = identity.frequency_mhz(),
            power_dbm = identity.power.dbm(),
            air_speed_bps = identity.air_speed.bps(),
            rssi = identity.rssi_enabled,
            "radio configured"
        );
        self.set_mode(RadioMode::Receive)
    }

    fn send(&mut self, destination: u16, payload: &[u8]) -> RadioResult<()> {
        if !matches!(self.mode, RadioMode::Receive | RadioMode::Standby) {
            return Err(RadioError::InvalidMode {
                operation: "send",
                mode: self.mode,
            });
        }

        let max = self.identity.max_payload_len();
        if payload.len() > max {
            return Err(RadioError::PayloadTooLarge {
                len: payload.len(),
                max,
            });
        }

        let frame = Packet::new(destination, payload.to_vec()).to_frame();
        self.set_mode(RadioMode::Transmit)?;

        let written = self.serial.write_all(&frame);
        self.delay.delay_ms(self.timing.transmit_settle_ms);
        self.set_mode(RadioMode::Receive)?;
        written?;

        self.status.frames_sent += 1;
        tracing::debug!(destination, len = payload.len(), "frame sent");
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> RadioResult<ReceiveOutcome> {
        match self.mode {
            RadioMode::Receive => {}
            RadioMode::Standby => self.set_mode(RadioMode::Receive)?,
            mode => {
                return Err(RadioError::InvalidMode {
                    operation: "receive",
                    mode,
                })
            }
        }

        let deadline = Instant::now() + timeout;
        loop {
            if self.interrupt.as_ref().is_some_and(CancelToken::is_cancelled) {
                return Ok(ReceiveOutcome::Interrupted);
            }

            let read = self.serial.read_available(&mut self.rx_buffer)?;
            if read > 0 {
                self.quiet_polls = 0;
            } else if !self.rx_buffer.is_empty() {
                self.quiet_polls = self.quiet_polls.saturating_add(1);
            }

            if let Some(frame) = self.take_complete_frame() {
                match self.parse_frame(frame) {
                    Ok(outcome) => return Ok(outcome),
                    Err(e) => {
                        self.status.frames_discarded += 1;
                        tracing::debug!(error = %e, "discarding frame");
                    }
                }
            }

            if Instant::now() >= deadline {
                return Ok(ReceiveOutcome::Timeout);
            }
            self.delay.delay_ms(self.timing.poll_interval_ms);
        }
    }

    fn cancel_receive(&mut self) -> RadioResult<()> {
        self.set_mode(RadioMode::Standby)?;
        self.rx_buffer.clear();
        self.quiet_polls = 0;
        self.serial.clear_input()?;
        Ok(())
    }

    fn attach_interrupt(&mut self, token: CancelToken) {
        self.interrupt = Some(token);
    }

    fn mode(&self) -> RadioMode {
        self.mode
    }

    fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    fn status(&self) -> TransceiverStatus {
        self.status.clone()
    }
}
