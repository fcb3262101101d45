//! Transceiver interface trait and shared link types

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core::types::{NodeIdentity, Packet};
use crate::hardware::error::{RadioError, RadioResult, RecoveryStrategy};

/// Operating mode selected through the two mode-control lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RadioMode {
    /// Idle; the only mode configuration may start from
    Standby,
    /// Standby line levels while a register write is in flight
    Configuring,
    Transmit,
    Receive,
    Sleep,
}

impl RadioMode {
    /// `(M0, M1)` line levels, `true` meaning high
    pub fn line_levels(self) -> (bool, bool) {
        match self {
            RadioMode::Receive => (false, false),
            RadioMode::Transmit => (true, false),
            RadioMode::Standby | RadioMode::Configuring => (false, true),
            RadioMode::Sleep => (true, true),
        }
    }
}

/// Result of a bounded receive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// A frame addressed to this node or to broadcast
    Packet(Packet),
    /// A well-formed frame for some other node; the link is alive but busy
    NotForUs { destination: u16 },
    /// Nothing complete arrived within the window
    Timeout,
    /// The interrupt token was raised while waiting
    Interrupted,
}

/// Flag that makes an in-progress receive return early.
///
/// Raising it is a single atomic store, safe from a signal or watcher thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clear the flag, returning whether it was set
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

/// Link statistics kept by a transceiver
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransceiverStatus {
    pub frames_received: u32,
    pub frames_sent: u32,
    pub frames_not_for_us: u32,
    pub frames_discarded: u32,
    pub last_rssi_dbm: Option<i16>,
}

/// Addressed packet link over a half-duplex radio.
///
/// Callers serialize all access: a send interrupts any receive, so one loop
/// owns the transceiver.
pub trait Transceiver {
    /// Apply a new identity. Passes through standby and ends in receive mode.
    fn configure(&mut self, identity: &NodeIdentity) -> RadioResult<()>;

    /// Transmit `payload` to `destination`, returning to receive mode after
    fn send(&mut self, destination: u16, payload: &[u8]) -> RadioResult<()>;

    /// Wait up to `timeout` for one frame
    fn receive(&mut self, timeout: Duration) -> RadioResult<ReceiveOutcome>;

    /// Drop to standby immediately, discarding any partially received frame
    fn cancel_receive(&mut self) -> RadioResult<()>;

    /// Token that interrupts `receive` when raised
    fn attach_interrupt(&mut self, token: CancelToken);

    fn mode(&self) -> RadioMode;

    fn identity(&self) -> &NodeIdentity;

    fn status(&self) -> TransceiverStatus;
}

impl<T: Transceiver + ?Sized> Transceiver for Box<T> {
    fn configure(&mut self, identity: &NodeIdentity) -> RadioResult<()> {
        (**self).configure(identity)
    }

    fn send(&mut self, destination: u16, payload: &[u8]) -> RadioResult<()> {
        (**self).send(destination, payload)
    }

    fn receive(&mut self, timeout: Duration) -> RadioResult<ReceiveOutcome> {
        (**self).receive(timeout)
    }

    fn cancel_receive(&mut self) -> RadioResult<()> {
        (**self).cancel_receive()
    }

    fn attach_interrupt(&mut self, token: CancelToken) {
        (**self).attach_interrupt(token)
    }

    fn mode(&self) -> RadioMode {
        (**self).mode()
    }

    fn identity(&self) -> &NodeIdentity {
        (**self).identity()
    }

    fn status(&self) -> TransceiverStatus {
        (**self).status()
    }
}

/// Act on a failed receive according to the error's recovery strategy.
///
/// A retryable failure drops the module back to standby with the input
/// flushed, so the next receive starts from a clean link.
pub fn recover_link<T: Transceiver + ?Sized>(transceiver: &mut T, error: &RadioError) {
    match error.recovery_strategy() {
        RecoveryStrategy::Skip => tracing::debug!(%error, "receive input skipped"),
        RecoveryStrategy::Retry => {
            tracing::warn!(%error, "receive failed, resetting link");
            if let Err(reset) = transceiver.cancel_receive() {
                tracing::warn!(error = %reset, "link reset failed");
            }
        }
        RecoveryStrategy::Fail => tracing::error!(%error, "radio link unusable"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_levels_are_distinct_per_mode() {
        let modes = [
            RadioMode::Receive,
            RadioMode::Transmit,
            RadioMode::Standby,
            RadioMode::Sleep,
        ];
        for (i, a) in modes.iter().enumerate() {
            for b in &modes[i + 1..] {
                assert_ne!(a.line_levels(), b.line_levels());
            }
        }
        assert_eq!(
            RadioMode::Configuring.line_levels(),
            RadioMode::Standby.line_levels()
        );
    }

    #[test]
    fn test_cancel_token_take_clears() {
        let token = CancelToken::new();
        let remote = token.clone();

        assert!(!token.take());
        remote.cancel();
        assert!(token.is_cancelled());
        assert!(token.take());
        assert!(!remote.is_cancelled());
    }
}
