//! Motor-unit protocol state machine
//!
//! One loop owns the transceiver, the relays and the run-time state. Each
//! [`ApplianceProtocol::poll`] services, in order: a pending power-loss
//! alert, due status broadcasts, an expired SET_TIMER run, and finally one
//! bounded receive.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::api::power::PowerLossSignal;
use crate::api::runtime::MotorRuntimeState;
use crate::api::types::{ApplianceEvent, ApplianceState};
use crate::core::clock::Clock;
use crate::hardware::relay::{RelayDriver, RelayError};
use crate::hardware::transceiver::{recover_link, ReceiveOutcome, Transceiver};
use crate::protocol::message::{CommandMessage, ErrorCode, StatusMessage};
use crate::protocol::scheduler::Scheduler;
use crate::utils::config::UnitConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApplianceTimer {
    StatusBroadcast,
}

/// Behaviour knobs of the motor unit
#[derive(Debug, Clone, PartialEq)]
pub struct ApplianceOptions {
    /// Destination of every response, broadcast and alert
    pub home_address: u16,
    pub status_interval: Duration,
    /// Receive window per poll
    pub poll_timeout: Duration,
}

impl Default for ApplianceOptions {
    fn default() -> Self {
        Self::from_config(&UnitConfig::default())
    }
}

impl ApplianceOptions {
    pub fn from_config(config: &UnitConfig) -> Self {
        Self {
            home_address: config.motor.home_address,
            status_interval: config.motor.status_interval(),
            poll_timeout: config.poll_timeout(),
        }
    }
}

pub struct ApplianceProtocol<T, R, C> {
    transceiver: T,
    relays: R,
    clock: C,
    runtime: MotorRuntimeState,
    options: ApplianceOptions,
    state: ApplianceState,
    scheduler: Scheduler<ApplianceTimer>,
    power_loss: PowerLossSignal,
}

impl<T, R, C> ApplianceProtocol<T, R, C>
where
    T: Transceiver,
    R: RelayDriver,
    C: Clock,
{
    pub fn new(
        mut transceiver: T,
        relays: R,
        clock: C,
        runtime: MotorRuntimeState,
        options: ApplianceOptions,
    ) -> Self {
        let power_loss = PowerLossSignal::new();
        transceiver.attach_interrupt(power_loss.token());

        let mut scheduler = Scheduler::new();
        scheduler.schedule_repeating(
            clock.now(),
            options.status_interval,
            ApplianceTimer::StatusBroadcast,
        );

        Self {
            transceiver,
            relays,
            clock,
            runtime,
            options,
            state: ApplianceState::Listening,
            scheduler,
            power_loss,
        }
    }

    /// Share an existing signal instead of the one created by `new`
    pub fn with_power_loss_signal(mut self, signal: PowerLossSignal) -> Self {
        self.transceiver.attach_interrupt(signal.token());
        self.power_loss = signal;
        self
    }

    /// Handle for whatever detects power loss
    pub fn power_loss_signal(&self) -> PowerLossSignal {
        self.power_loss.clone()
    }

    pub fn state(&self) -> ApplianceState {
        self.state
    }

    pub fn runtime(&self) -> &MotorRuntimeState {
        &self.runtime
    }

    pub fn transceiver(&self) -> &T {
        &self.transceiver
    }

    /// Status as it would be reported right now
    pub fn current_status(&self, error_code: ErrorCode) -> StatusMessage {
        let now = self.clock.unix_seconds();
        StatusMessage::new(
            self.runtime.is_running(),
            self.runtime.reported_run_time(now),
            error_code,
        )
    }

    /// One iteration of the control loop
    pub fn poll(&mut self) -> Vec<ApplianceEvent> {
        let mut events = Vec::new();

        if self.power_loss.take() {
            self.alert_power_loss(&mut events);
        }

        for (_, timer) in self.scheduler.pop_due(self.clock.now()) {
            match timer {
                ApplianceTimer::StatusBroadcast => self.broadcast_status(&mut events),
            }
        }

        if self.runtime.scheduled_off_due(self.clock.unix_seconds()) {
            self.scheduled_off(&mut events);
        }

        match self.transceiver.receive(self.options.poll_timeout) {
            Ok(ReceiveOutcome::Packet(packet)) => match CommandMessage::decode(&packet.payload) {
                Ok(command) => self.apply_command(command, &mut events),
                Err(error) => {
                    tracing::debug!(%error, payload = ?packet.payload, "ignoring frame");
                    events.push(ApplianceEvent::FrameRejected { error });
                }
            },
            Ok(ReceiveOutcome::Interrupted) => {
                if self.power_loss.take() {
                    self.alert_power_loss(&mut events);
                }
            }
            Ok(ReceiveOutcome::NotForUs { .. }) | Ok(ReceiveOutcome::Timeout) => {}
            Err(error) => {
                recover_link(&mut self.transceiver, &error);
                events.push(ApplianceEvent::LinkFault { error });
            }
        }

        events
    }

    /// Poll until `shutdown` is set, then leave the radio in standby
    pub fn run(&mut self, shutdown: &AtomicBool) {
        tracing::info!(
            address = self.transceiver.identity().address,
            home = self.options.home_address,
            "motor unit listening"
        );

        while !shutdown.load(Ordering::Acquire) {
            for event in self.poll() {
                tracing::debug!(?event, "appliance event");
            }
        }

        if let Err(error) = self.transceiver.cancel_receive() {
            tracing::warn!(%error, "could not return radio to standby");
        }
        tracing::info!("motor unit stopped");
    }

    /// Apply one command and answer it with exactly one status
    pub fn handle_command(&mut self, command: CommandMessage) -> Vec<ApplianceEvent> {
        let mut events = Vec::new();
        self.apply_command(command, &mut events);
        events
    }

    fn apply_command(&mut self, command: CommandMessage, events: &mut Vec<ApplianceEvent>) {
        tracing::info!(?command, "command received");
        self.state = ApplianceState::ProcessingRequest;
        let now = self.clock.unix_seconds();

        let relay_error = match command {
            CommandMessage::On => self.switch_on(now),
            CommandMessage::Off => self.switch_off(now),
            CommandMessage::StatusRequest => None,
            CommandMessage::SetTimer { minutes } => {
                let relay_error = self.switch_on(now);
                if relay_error.is_none() {
                    if minutes == 0 {
                        self.runtime.clear_scheduled_off();
                    } else {
                        let after = Duration::from_secs(minutes as u64 * 60);
                        self.runtime.arm_scheduled_off(now, after);
                        tracing::info!(minutes, "scheduled off armed");
                    }
                }
                relay_error
            }
        };

        self.state = ApplianceState::TransmittingResponse;
        let status = self.transmit_status(ErrorCode::None, events);
        self.state = ApplianceState::Listening;

        events.push(ApplianceEvent::CommandHandled {
            command,
            status,
            relay_error,
        });
    }

    fn switch_on(&mut self, now: u64) -> Option<RelayError> {
        match self.relays.switch_on() {
            Ok(()) => {
                self.runtime.start(now);
                None
            }
            Err(error) => {
                tracing::error!(%error, "motor did not switch on");
                Some(error)
            }
        }
    }

    fn switch_off(&mut self, now: u64) -> Option<RelayError> {
        match self.relays.switch_off() {
            Ok(()) => {
                self.runtime.stop(now);
                None
            }
            Err(error) => {
                tracing::error!(%error, "motor did not switch off");
                Some(error)
            }
        }
    }

    fn broadcast_status(&mut self, events: &mut Vec<ApplianceEvent>) {
        self.state = ApplianceState::TransmittingStatus;
        let status = self.transmit_status(ErrorCode::None, events);
        self.state = ApplianceState::Listening;

        tracing::debug!(?status, "periodic status sent");
        events.push(ApplianceEvent::StatusBroadcast { status });
    }

    fn scheduled_off(&mut self, events: &mut Vec<ApplianceEvent>) {
        tracing::info!("timer expired, switching motor off");
        self.state = ApplianceState::ProcessingRequest;
        let relay_error = self.switch_off(self.clock.unix_seconds());
        if relay_error.is_some() {
            // Do not retry every iteration; the home unit sees the motor still on
            self.runtime.clear_scheduled_off();
        }

        self.state = ApplianceState::TransmittingStatus;
        let status = self.transmit_status(ErrorCode::None, events);
        self.state = ApplianceState::Listening;

        events.push(ApplianceEvent::ScheduledOff {
            status,
            relay_error,
        });
    }

    fn alert_power_loss(&mut self, events: &mut Vec<ApplianceEvent>) {
        tracing::warn!("power loss detected");
        self.state = ApplianceState::TransmittingStatus;

        if let Err(error) = self.transceiver.cancel_receive() {
            tracing::warn!(%error, "could not cancel receive");
            events.push(ApplianceEvent::LinkFault { error });
        }

        self.runtime.stop(self.clock.unix_seconds());
        let status = self.transmit_status(ErrorCode::PowerFailure, events);
        self.state = ApplianceState::Listening;

        events.push(ApplianceEvent::PowerLossAlert { status });
    }

    fn transmit_status(
        &mut self,
        error_code: ErrorCode,
        events: &mut Vec<ApplianceEvent>,
    ) -> StatusMessage {
        let status = self.current_status(error_code);
        if let Err(error) = self
            .transceiver
            .send(self.options.home_address, &status.encode())
        {
            tracing::warn!(%error, "status not sent");
            events.push(ApplianceEvent::LinkFault { error });
        }
        status
    }
}
