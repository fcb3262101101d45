//! Motor run-time accounting backed by persistent counters

use std::time::Duration;

use crate::utils::counter::PersistentCounter;

/// Counter holding the accumulated run-time in seconds
pub const TOTAL_RUN_TIME_KEY: &str = "total_run_time_seconds";

/// Counter holding the Unix time the motor was last switched on, 0 when off
pub const MOTOR_ON_SINCE_KEY: &str = "motor_on_since";

/// Counter holding the Unix time a SET_TIMER run ends, 0 when none is armed
pub const SCHEDULED_OFF_AT_KEY: &str = "scheduled_off_at";

/// A SET_TIMER run: off at `armed_at + after`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledOff {
    pub armed_at: u64,
    pub after: Duration,
}

impl ScheduledOff {
    pub fn due_at(&self) -> u64 {
        self.armed_at.saturating_add(self.after.as_secs())
    }
}

/// Running state and accumulated run-time of the motor.
///
/// Times are Unix seconds. Every change to the total or to the on-since
/// timestamp is written through to the counters.
#[derive(Debug)]
pub struct MotorRuntimeState {
    motor_running: bool,
    motor_on_since: Option<u64>,
    total_run_time: u32,
    scheduled_off: Option<ScheduledOff>,
    counters: PersistentCounter,
}

impl MotorRuntimeState {
    /// Load persisted state.
    ///
    /// A non-zero on-since timestamp means the process stopped while the
    /// latching relay held the motor on, so the unit resumes as running.
    pub fn restore(counters: PersistentCounter, now: u64) -> Self {
        let total = counters.load(TOTAL_RUN_TIME_KEY, 0);
        let total_run_time = u32::try_from(total).unwrap_or(u32::MAX);

        let motor_on_since = match counters.load(MOTOR_ON_SINCE_KEY, 0) {
            0 => None,
            since if since > now => {
                tracing::warn!(since, now, "on-since timestamp lies in the future, restarting count");
                counters.save(MOTOR_ON_SINCE_KEY, now);
                Some(now)
            }
            since => Some(since),
        };

        let scheduled_off = match counters.load(SCHEDULED_OFF_AT_KEY, 0) {
            0 => None,
            _ if motor_on_since.is_none() => {
                counters.save(SCHEDULED_OFF_AT_KEY, 0);
                None
            }
            due_at => {
                let armed_at = now.min(due_at);
                Some(ScheduledOff {
                    armed_at,
                    after: Duration::from_secs(due_at - armed_at),
                })
            }
        };

        if let Some(since) = motor_on_since {
            tracing::info!(
                since,
                total_run_time,
                off_at = scheduled_off.map(|off| off.due_at()),
                "resuming with motor running"
            );
        }

        Self {
            motor_running: motor_on_since.is_some(),
            motor_on_since,
            total_run_time,
            scheduled_off,
            counters,
        }
    }

    pub fn is_running(&self) -> bool {
        self.motor_running
    }

    pub fn motor_on_since(&self) -> Option<u64> {
        self.motor_on_since
    }

    /// Persisted total, excluding the current run
    pub fn total_run_time(&self) -> u32 {
        self.total_run_time
    }

    pub fn scheduled_off(&self) -> Option<ScheduledOff> {
        self.scheduled_off
    }

    /// Total including the run in progress. Nothing is persisted.
    pub fn reported_run_time(&self, now: u64) -> u64 {
        let current = self
            .motor_on_since
            .map_or(0, |since| now.saturating_sub(since));
        self.total_run_time as u64 + current
    }

    /// Mark the motor running. Returns false if it already was.
    pub fn start(&mut self, now: u64) -> bool {
        if self.motor_running {
            return false;
        }

        self.motor_running = true;
        self.motor_on_since = Some(now);
        self.counters.save(MOTOR_ON_SINCE_KEY, now);
        true
    }

    /// Mark the motor stopped, folding the current run into the total.
    /// Any scheduled off is dropped. Returns false if it was not running.
    pub fn stop(&mut self, now: u64) -> bool {
        self.clear_scheduled_off();
        if !self.motor_running {
            return false;
        }

        let elapsed = self
            .motor_on_since
            .map_or(0, |since| now.saturating_sub(since));
        let elapsed = u32::try_from(elapsed).unwrap_or(u32::MAX);
        self.total_run_time = self.total_run_time.saturating_add(elapsed);
        self.motor_running = false;
        self.motor_on_since = None;

        self.counters.save(TOTAL_RUN_TIME_KEY, self.total_run_time as u64);
        self.counters.save(MOTOR_ON_SINCE_KEY, 0);
        tracing::debug!(elapsed, total = self.total_run_time, "run-time accumulated");
        true
    }

    /// Arm the off for `after` from `now`, persisted so a restart keeps it
    pub fn arm_scheduled_off(&mut self, now: u64, after: Duration) {
        let scheduled = ScheduledOff { armed_at: now, after };
        self.counters.save(SCHEDULED_OFF_AT_KEY, scheduled.due_at());
        self.scheduled_off = Some(scheduled);
    }

    pub fn clear_scheduled_off(&mut self) {
        if self.scheduled_off.take().is_some() {
            self.counters.save(SCHEDULED_OFF_AT_KEY, 0);
        }
    }

    pub fn scheduled_off_due(&self, now: u64) -> bool {
        self.motor_running
            && self
                .scheduled_off
                .is_some_and(|scheduled| now >= scheduled.due_at())
    }
}
