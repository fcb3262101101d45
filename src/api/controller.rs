//! Home-unit protocol state machine
//!
//! Sends commands to the motor unit and waits for the matching status. A
//! command that gets no valid status within the response window is reported
//! once as `NoResponse`; retrying is up to the caller.

use std::collections::HashMap;
use std::time::Duration;

use crate::api::types::{
    CallbackHandle, ControllerEvent, ControllerState, ProtocolError, ProtocolResult, StatusReport,
};
use crate::core::clock::Clock;
use crate::core::types::Packet;
use crate::hardware::transceiver::{recover_link, ReceiveOutcome, Transceiver};
use crate::protocol::message::{CommandMessage, StatusMessage};
use crate::protocol::scheduler::{Scheduler, TimerId};
use crate::utils::config::UnitConfig;

/// Called for every status received, solicited or not
pub type StatusCallback = Box<dyn FnMut(&StatusReport) + Send>;

/// Called once when a command's response window closes
pub type NoResponseCallback = Box<dyn FnMut(CommandMessage) + Send>;

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerOptions {
    pub motor_address: u16,
    pub response_timeout: Duration,
    pub poll_timeout: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self::from_config(&UnitConfig::home_default())
    }
}

impl ControllerOptions {
    pub fn from_config(config: &UnitConfig) -> Self {
        Self {
            motor_address: config.home.motor_address,
            response_timeout: config.home.response_timeout(),
            poll_timeout: config.poll_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingCommand {
    command: CommandMessage,
    timeout: TimerId,
}

pub struct ControllerProtocol<T, C> {
    transceiver: T,
    clock: C,
    options: ControllerOptions,
    state: ControllerState,
    pending: Option<PendingCommand>,
    scheduler: Scheduler<CommandMessage>,
    callback_counter: u32,
    status_callbacks: HashMap<CallbackHandle, StatusCallback>,
    no_response_callbacks: HashMap<CallbackHandle, NoResponseCallback>,
    last_status: Option<StatusReport>,
}

impl<T, C> ControllerProtocol<T, C>
where
    T: Transceiver,
    C: Clock,
{
    pub fn new(transceiver: T, clock: C, options: ControllerOptions) -> Self {
        Self {
            transceiver,
            clock,
            options,
            state: ControllerState::Listening,
            pending: None,
            scheduler: Scheduler::new(),
            callback_counter: 0,
            status_callbacks: HashMap::new(),
            no_response_callbacks: HashMap::new(),
            last_status: None,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Command currently awaiting its response
    pub fn pending_command(&self) -> Option<CommandMessage> {
        self.pending.map(|pending| pending.command)
    }

    /// Most recent status heard from the motor unit
    pub fn last_status(&self) -> Option<&StatusReport> {
        self.last_status.as_ref()
    }

    pub fn transceiver(&self) -> &T {
        &self.transceiver
    }

    /// Send `command` to the motor unit and start its response window.
    ///
    /// Fails without sending if another command is still waiting.
    pub fn send_command(&mut self, command: CommandMessage) -> ProtocolResult<()> {
        if let Some(pending) = self.pending {
            return Err(ProtocolError::CommandInFlight {
                pending: pending.command,
            });
        }

        self.transceiver
            .send(self.options.motor_address, &command.encode())?;

        let deadline = self.clock.now() + self.options.response_timeout;
        let timeout = self.scheduler.schedule(deadline, command);
        self.pending = Some(PendingCommand { command, timeout });
        self.state = ControllerState::WaitingForResponse;

        tracing::info!(?command, motor = self.options.motor_address, "command sent");
        Ok(())
    }

    pub fn on_status_received(&mut self, callback: StatusCallback) -> CallbackHandle {
        let handle = self.next_handle();
        self.status_callbacks.insert(handle, callback);
        handle
    }

    pub fn on_no_response(&mut self, callback: NoResponseCallback) -> CallbackHandle {
        let handle = self.next_handle();
        self.no_response_callbacks.insert(handle, callback);
        handle
    }

    pub fn unregister_callback(&mut self, handle: CallbackHandle) -> ProtocolResult<()> {
        let removed = self.status_callbacks.remove(&handle).is_some()
            || self.no_response_callbacks.remove(&handle).is_some();

        if removed {
            Ok(())
        } else {
            Err(ProtocolError::UnknownCallback(handle))
        }
    }

    /// Leave the radio in standby before the session is dropped
    pub fn standby(&mut self) -> ProtocolResult<()> {
        self.transceiver.cancel_receive()?;
        tracing::info!("home unit stopped");
        Ok(())
    }

    /// One bounded receive, then expiry of the response window
    pub fn poll(&mut self) -> Vec<ControllerEvent> {
        let mut events = Vec::new();

        match self.transceiver.receive(self.options.poll_timeout) {
            Ok(ReceiveOutcome::Packet(packet)) => self.on_packet(packet, &mut events),
            Ok(_) => {}
            Err(error) => {
                recover_link(&mut self.transceiver, &error);
                events.push(ControllerEvent::LinkFault { error });
            }
        }

        for (id, command) in self.scheduler.pop_due(self.clock.now()) {
            if self.pending.is_some_and(|pending| pending.timeout == id) {
                self.expire(command, &mut events);
            }
        }

        events
    }

    fn on_packet(&mut self, packet: Packet, events: &mut Vec<ControllerEvent>) {
        let status = match StatusMessage::decode(&packet.payload) {
            Ok(status) => status,
            Err(error) => {
                tracing::debug!(%error, payload = ?packet.payload, "ignoring frame");
                events.push(ControllerEvent::FrameRejected { error });
                return;
            }
        };

        let solicited = match self.pending.take() {
            Some(pending) => {
                self.scheduler.cancel(pending.timeout);
                self.state = ControllerState::Listening;
                true
            }
            None => false,
        };

        let report = StatusReport {
            status,
            rssi_dbm: packet.rssi_dbm,
            solicited,
        };
        tracing::info!(
            motor_on = status.motor_on,
            run_time = status.total_run_time_seconds,
            error = ?status.error_code,
            solicited,
            "status received"
        );

        for callback in self.status_callbacks.values_mut() {
            callback(&report);
        }
        self.last_status = Some(report);
        events.push(ControllerEvent::StatusReceived(report));
    }

    fn expire(&mut self, command: CommandMessage, events: &mut Vec<ControllerEvent>) {
        self.pending = None;
        self.state = ControllerState::Listening;
        tracing::warn!(?command, "no response from remote unit");

        for callback in self.no_response_callbacks.values_mut() {
            callback(command);
        }
        events.push(ControllerEvent::NoResponse { command });
    }

    fn next_handle(&mut self) -> CallbackHandle {
        self.callback_counter += 1;
        CallbackHandle::new(self.callback_counter)
    }
}
