//! Power-loss detection
//!
//! A watcher thread samples the active-low power-loss input and raises a
//! shared flag on a debounced falling edge. It does nothing else; the alert
//! itself goes out from the appliance loop, which the flag also wakes out
//! of any receive in progress.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use embedded_hal::digital::InputPin;

use crate::hardware::transceiver::CancelToken;

/// Flag raised once per detected power loss
#[derive(Debug, Clone, Default)]
pub struct PowerLossSignal {
    token: CancelToken,
}

impl PowerLossSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Safe to call from any thread or signal context
    pub fn raise(&self) {
        self.token.cancel();
    }

    pub fn is_raised(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Consume the signal, returning whether it was raised
    pub fn take(&self) -> bool {
        self.token.take()
    }

    /// Token to attach to the transceiver so a raise interrupts its receive
    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }
}

/// Debounced falling-edge detector
#[derive(Debug, Clone)]
pub struct EdgeDetector {
    debounce: u8,
    high_run: u8,
    low_run: u8,
    /// Set once the line has been stably high
    armed: bool,
}

impl EdgeDetector {
    pub fn new(debounce: u8) -> Self {
        Self {
            debounce: debounce.max(1),
            high_run: 0,
            low_run: 0,
            armed: false,
        }
    }

    /// Feed one sample. Returns true exactly once per stable high-to-low edge.
    pub fn sample(&mut self, high: bool) -> bool {
        if high {
            self.low_run = 0;
            self.high_run = self.high_run.saturating_add(1);
            if self.high_run >= self.debounce {
                self.armed = true;
            }
            return false;
        }

        self.high_run = 0;
        self.low_run = self.low_run.saturating_add(1);
        if self.armed && self.low_run >= self.debounce {
            self.armed = false;
            return true;
        }
        false
    }
}

/// Background thread watching the power-loss input
pub struct PowerLossMonitor {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PowerLossMonitor {
    pub fn spawn<P>(
        mut pin: P,
        signal: PowerLossSignal,
        sample_period: Duration,
        debounce: u8,
    ) -> io::Result<Self>
    where
        P: InputPin + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("power-loss".to_string())
            .spawn(move || {
                let mut detector = EdgeDetector::new(debounce);
                while !thread_stop.load(Ordering::Acquire) {
                    match pin.is_high() {
                        Ok(high) => {
                            if detector.sample(high) {
                                signal.raise();
                            }
                        }
                        Err(e) => tracing::warn!(error = ?e, "power-loss input unreadable"),
                    }
                    thread::sleep(sample_period);
                }
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("power-loss monitor panicked");
            }
        }
    }
}

impl Drop for PowerLossMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
