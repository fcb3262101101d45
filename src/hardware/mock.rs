//! Mock hardware for testing and development
//!
//! Every mock is a cheap handle over shared state so a test can keep one
//! clone for inspection after handing the other to the code under test.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

use crate::core::types::{NodeIdentity, Packet};
use crate::hardware::error::{RadioError, RadioResult};
use crate::hardware::relay::{RelayDriver, RelayError};
use crate::hardware::serial::SerialLink;
use crate::hardware::transceiver::{
    CancelToken, RadioMode, ReceiveOutcome, Transceiver, TransceiverStatus,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct SerialState {
    /// One entry per `read_available` call; an empty chunk is a quiet poll
    rx_chunks: VecDeque<Vec<u8>>,
    /// Responses handed out by `read_timeout`
    acks: VecDeque<Vec<u8>>,
    writes: Vec<Vec<u8>>,
    clears: usize,
}

/// Scripted UART
#[derive(Debug, Clone, Default)]
pub struct MockSerial {
    state: Arc<Mutex<SerialState>>,
}

impl MockSerial {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes the next poll will find waiting
    pub fn push_rx(&self, bytes: &[u8]) {
        lock(&self.state).rx_chunks.push_back(bytes.to_vec());
    }

    /// A poll that finds nothing, even while more chunks are queued
    pub fn push_quiet(&self) {
        lock(&self.state).rx_chunks.push_back(Vec::new());
    }

    /// Reply to the next register write
    pub fn queue_ack(&self, bytes: &[u8]) {
        lock(&self.state).acks.push_back(bytes.to_vec());
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        lock(&self.state).writes.clone()
    }

    pub fn clear_count(&self) -> usize {
        lock(&self.state).clears
    }
}

impl SerialLink for MockSerial {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        lock(&self.state).writes.push(bytes.to_vec());
        Ok(())
    }

    fn read_available(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        let chunk = lock(&self.state).rx_chunks.pop_front().unwrap_or_default();
        buf.extend_from_slice(&chunk);
        Ok(chunk.len())
    }

    fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
        let Some(ack) = lock(&self.state).acks.pop_front() else {
            return Ok(0);
        };
        let len = ack.len().min(buf.len());
        buf[..len].copy_from_slice(&ack[..len]);
        Ok(len)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        let mut state = lock(&self.state);
        state.rx_chunks.clear();
        state.clears += 1;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct PinState {
    level: bool,
    history: Vec<bool>,
}

/// GPIO line that records what was driven onto it and reads back its level
#[derive(Debug, Clone, Default)]
pub struct MockPin {
    state: Arc<Mutex<PinState>>,
}

impl MockPin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drive the level an input read will see
    pub fn set_level(&self, high: bool) {
        lock(&self.state).level = high;
    }

    pub fn is_set_high(&self) -> bool {
        lock(&self.state).level
    }

    /// Every level written through `OutputPin`, oldest first
    pub fn history(&self) -> Vec<bool> {
        lock(&self.state).history.clone()
    }

    pub fn clear_history(&self) {
        lock(&self.state).history.clear();
    }

    fn drive(&self, high: bool) {
        let mut state = lock(&self.state);
        state.level = high;
        state.history.push(high);
    }
}

impl ErrorType for MockPin {
    type Error = Infallible;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.drive(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.drive(true);
        Ok(())
    }
}

impl InputPin for MockPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.is_set_high())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.is_set_high())
    }
}

/// Delay that returns at once and keeps a tally of what was asked for
#[derive(Debug, Clone, Default)]
pub struct NoDelay {
    total_ns: Arc<AtomicU64>,
}

impl NoDelay {
    pub fn total_ms(&self) -> u64 {
        self.total_ns.load(Ordering::Acquire) / 1_000_000
    }
}

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns.fetch_add(ns as u64, Ordering::AcqRel);
    }
}

#[derive(Debug, Default)]
struct RelayLog {
    /// `true` for every on pulse, `false` for every off pulse
    switches: Vec<bool>,
    fail: bool,
}

/// Relay pair that records switch requests
#[derive(Debug, Clone, Default)]
pub struct MockRelays {
    log: Arc<Mutex<RelayLog>>,
}

impl MockRelays {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn switches(&self) -> Vec<bool> {
        lock(&self.log).switches.clone()
    }

    /// Make every following switch fail
    pub fn fail(&self, fail: bool) {
        lock(&self.log).fail = fail;
    }

    fn switch(&self, on: bool) -> Result<(), RelayError> {
        let mut log = lock(&self.log);
        if log.fail {
            return Err(RelayError {
                line: if on { "on" } else { "off" },
                reason: "simulated relay failure".to_string(),
            });
        }
        log.switches.push(on);
        Ok(())
    }
}

impl RelayDriver for MockRelays {
    fn switch_on(&mut self) -> Result<(), RelayError> {
        self.switch(true)
    }

    fn switch_off(&mut self) -> Result<(), RelayError> {
        self.switch(false)
    }
}

#[derive(Debug)]
struct LinkState {
    mode: RadioMode,
    inbound: VecDeque<Packet>,
    sent: Vec<Packet>,
    status: TransceiverStatus,
    fail_sends: bool,
    fail_receives: bool,
}

/// Inspection handle for a [`MockTransceiver`]
#[derive(Debug, Clone)]
pub struct MockLinkHandle {
    state: Arc<Mutex<LinkState>>,
}

impl MockLinkHandle {
    /// Queue a frame as if it came over the air
    pub fn deliver(&self, destination: u16, payload: &[u8]) {
        lock(&self.state)
            .inbound
            .push_back(Packet::new(destination, payload.to_vec()));
    }

    pub fn sent(&self) -> Vec<Packet> {
        lock(&self.state).sent.clone()
    }

    /// Drain everything sent so far
    pub fn take_sent(&self) -> Vec<Packet> {
        std::mem::take(&mut lock(&self.state).sent)
    }

    pub fn mode(&self) -> RadioMode {
        lock(&self.state).mode
    }

    /// Make every following send fail with an I/O error
    pub fn fail_sends(&self, fail: bool) {
        lock(&self.state).fail_sends = fail;
    }

    /// Make every following receive fail with an I/O error
    pub fn fail_receives(&self, fail: bool) {
        lock(&self.state).fail_receives = fail;
    }
}

/// Packet-level transceiver with no serial framing underneath
pub struct MockTransceiver {
    state: Arc<Mutex<LinkState>>,
    air: Option<MockAir>,
    identity: NodeIdentity,
    interrupt: Option<CancelToken>,
}

impl MockTransceiver {
    pub fn new(identity: NodeIdentity) -> Self {
        let state = LinkState {
            mode: RadioMode::Receive,
            inbound: VecDeque::new(),
            sent: Vec::new(),
            status: TransceiverStatus::default(),
            fail_sends: false,
            fail_receives: false,
        };

        Self {
            state: Arc::new(Mutex::new(state)),
            air: None,
            identity,
            interrupt: None,
        }
    }

    pub fn handle(&self) -> MockLinkHandle {
        MockLinkHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Transceiver for MockTransceiver {
    fn configure(&mut self, identity: &NodeIdentity) -> RadioResult<()> {
        let mut state = lock(&self.state);
        state.mode = RadioMode::Receive;
        self.identity = identity.clone();
        Ok(())
    }

    fn send(&mut self, destination: u16, payload: &[u8]) -> RadioResult<()> {
        let max = self.identity.max_payload_len();
        if payload.len() > max {
            return Err(RadioError::PayloadTooLarge {
                len: payload.len(),
                max,
            });
        }

        let packet = Packet::new(destination, payload.to_vec());
        {
            let mut state = lock(&self.state);
            if state.fail_sends {
                return Err(RadioError::Io(io::Error::other("simulated send failure")));
            }
            state.mode = RadioMode::Receive;
            state.status.frames_sent += 1;
            state.sent.push(packet.clone());
        }

        if let Some(air) = &self.air {
            air.broadcast(&self.state, packet);
        }
        Ok(())
    }

    fn receive(&mut self, _timeout: Duration) -> RadioResult<ReceiveOutcome> {
        if self.interrupt.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Ok(ReceiveOutcome::Interrupted);
        }

        let mut state = lock(&self.state);
        if state.fail_receives {
            return Err(RadioError::Io(io::Error::other("simulated receive failure")));
        }
        state.mode = RadioMode::Receive;
        let Some(packet) = state.inbound.pop_front() else {
            return Ok(ReceiveOutcome::Timeout);
        };

        if !self.identity.accepts(packet.destination) {
            state.status.frames_not_for_us += 1;
            return Ok(ReceiveOutcome::NotForUs {
                destination: packet.destination,
            });
        }

        state.status.frames_received += 1;
        Ok(ReceiveOutcome::Packet(packet))
    }

    fn cancel_receive(&mut self) -> RadioResult<()> {
        lock(&self.state).mode = RadioMode::Standby;
        Ok(())
    }

    fn attach_interrupt(&mut self, token: CancelToken) {
        self.interrupt = Some(token);
    }

    fn mode(&self) -> RadioMode {
        lock(&self.state).mode
    }

    fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    fn status(&self) -> TransceiverStatus {
        lock(&self.state).status.clone()
    }
}

/// Shared medium connecting mock transceivers.
///
/// Every frame sent by one node lands in the inbound queue of every other
/// node; each receiver filters by address itself.
#[derive(Debug, Clone, Default)]
pub struct MockAir {
    nodes: Arc<Mutex<Vec<Arc<Mutex<LinkState>>>>>,
}

impl MockAir {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transceiver on this medium
    pub fn join(&self, identity: NodeIdentity) -> MockTransceiver {
        let mut transceiver = MockTransceiver::new(identity);
        lock(&self.nodes).push(Arc::clone(&transceiver.state));
        transceiver.air = Some(self.clone());
        transceiver
    }

    fn broadcast(&self, sender: &Arc<Mutex<LinkState>>, packet: Packet) {
        for node in lock(&self.nodes).iter() {
            if !Arc::ptr_eq(node, sender) {
                lock(node).inbound.push_back(packet.clone());
            }
        }
    }
}

impl std::fmt::Debug for MockTransceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransceiver")
            .field("address", &self.identity.address)
            .field("on_air", &self.air.is_some())
            .finish()
    }
}
