use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use motorlink::api::{ApplianceOptions, ControllerOptions};
use motorlink::hardware::{MockAir, MockRelays, MockTransceiver};
use motorlink::{
    ApplianceEvent, ApplianceProtocol, Clock, CommandMessage, ControllerEvent,
    ControllerProtocol, ErrorCode, ManualClock, MotorRuntimeState, NodeIdentity,
    PersistentCounter,
};

const HOME: u16 = 30;
const MOTOR: u16 = 0;

struct Link {
    home: ControllerProtocol<MockTransceiver, ManualClock>,
    motor: ApplianceProtocol<MockTransceiver, MockRelays, ManualClock>,
    relays: MockRelays,
    clock: ManualClock,
    state_dir: PathBuf,
}

impl Drop for Link {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.state_dir);
    }
}

fn link(name: &str) -> Link {
    let state_dir = std::env::temp_dir().join(format!("motorlink_link_{}_{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&state_dir);

    let air = MockAir::new();
    let clock = ManualClock::starting_at(Duration::from_secs(1_700_000_000));
    let relays = MockRelays::new();

    let home = ControllerProtocol::new(
        air.join(NodeIdentity::new(HOME, 433).unwrap()),
        clock.clone(),
        ControllerOptions {
            motor_address: MOTOR,
            response_timeout: Duration::from_secs(5),
            poll_timeout: Duration::ZERO,
        },
    );

    let runtime = MotorRuntimeState::restore(PersistentCounter::new(&state_dir), clock.unix_seconds());
    let motor = ApplianceProtocol::new(
        air.join(NodeIdentity::new(MOTOR, 433).unwrap()),
        relays.clone(),
        clock.clone(),
        runtime,
        ApplianceOptions {
            home_address: HOME,
            status_interval: Duration::from_secs(300),
            poll_timeout: Duration::ZERO,
        },
    );

    Link {
        home,
        motor,
        relays,
        clock,
        state_dir,
    }
}

fn statuses(events: Vec<ControllerEvent>) -> Vec<motorlink::StatusReport> {
    events
        .into_iter()
        .filter_map(|event| match event {
            ControllerEvent::StatusReceived(report) => Some(report),
            _ => None,
        })
        .collect()
}

#[test]
fn test_command_round_trip_over_the_air() {
    let mut link = link("round_trip");

    link.home.send_command(CommandMessage::On).unwrap();
    link.motor.poll();
    let reports = statuses(link.home.poll());

    assert_eq!(reports.len(), 1);
    assert!(reports[0].solicited);
    assert!(reports[0].status.motor_on);
    assert_eq!(link.relays.switches(), vec![true]);

    link.clock.advance(Duration::from_secs(10));
    link.home.send_command(CommandMessage::Off).unwrap();
    link.motor.poll();
    let reports = statuses(link.home.poll());

    assert!(!reports[0].status.motor_on);
    assert_eq!(reports[0].status.total_run_time_seconds, 10);
    assert_eq!(link.motor.runtime().total_run_time(), 10);
}

#[test]
fn test_timer_run_reports_unsolicited_off() {
    let mut link = link("timer");

    link.home.send_command(CommandMessage::SetTimer { minutes: 1 }).unwrap();
    link.motor.poll();
    assert_eq!(statuses(link.home.poll()).len(), 1);

    link.clock.advance(Duration::from_secs(60));
    let events = link.motor.poll();
    assert!(events.iter().any(|e| matches!(e, ApplianceEvent::ScheduledOff { .. })));

    let reports = statuses(link.home.poll());
    assert_eq!(reports.len(), 1);
    assert!(!reports[0].solicited);
    assert!(!reports[0].status.motor_on);
    assert_eq!(reports[0].status.error_code, ErrorCode::None);
    assert_eq!(link.home.last_status(), Some(&reports[0]));
}

#[test]
fn test_power_failure_reaches_home() {
    let mut link = link("power");

    link.home.send_command(CommandMessage::On).unwrap();
    link.motor.poll();
    link.home.poll();

    link.clock.advance(Duration::from_secs(30));
    link.motor.power_loss_signal().raise();
    link.motor.poll();

    let reports = statuses(link.home.poll());
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status.error_code, ErrorCode::PowerFailure);
    assert_eq!(reports[0].status.total_run_time_seconds, 30);
}

#[test]
fn test_silent_motor_yields_single_no_response() {
    let mut link = link("silent");

    link.home.send_command(CommandMessage::StatusRequest).unwrap();
    // Motor never polls, so nothing answers
    link.clock.advance(Duration::from_secs(5));

    let events = link.home.poll();
    assert!(matches!(events[..], [ControllerEvent::NoResponse { command: CommandMessage::StatusRequest }]));
    link.clock.advance(Duration::from_secs(5));
    assert!(link.home.poll().is_empty());

    // The motor now drains the stale request and its late answer is unsolicited
    link.motor.poll();
    let reports = statuses(link.home.poll());
    assert_eq!(reports.len(), 1);
    assert!(!reports[0].solicited);
}
