use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use eyre::WrapErr;
use structopt::StructOpt;

use motorlink::api::{ApplianceOptions, ControllerOptions};
use motorlink::hardware::{open_serial, PulseRelays, StdDelay, SysfsPin};
use motorlink::utils::RadioSettings;
use motorlink::{
    ApplianceProtocol, Clock, CommandMessage, ControllerEvent, ControllerProtocol,
    MotorRuntimeState, PersistentCounter, PowerLossMonitor, RadioTransport, SystemClock,
    UnitConfig,
};

mod trace;

#[derive(Debug, StructOpt)]
#[structopt(name = "motorlink", about = "LoRa motor controller")]
struct Options {
    /// JSON configuration file; built-in defaults when absent
    #[structopt(long = "config", parse(from_os_str))]
    config: Option<PathBuf>,

    /// Human-friendly multi-line log output
    #[structopt(long = "pretty")]
    pretty: bool,

    /// Write the unit's default configuration to --config and exit
    #[structopt(long = "write-default-config")]
    write_default_config: bool,

    #[structopt(subcommand)]
    unit: Unit,
}

#[derive(Debug, Clone, Copy, StructOpt)]
enum Unit {
    /// Drive the relays and answer commands
    Motor,
    /// Send commands typed on stdin
    Home,
}

type SerialTransport = RadioTransport<Box<dyn serialport::SerialPort>, SysfsPin, SysfsPin, StdDelay>;

fn main() -> eyre::Result<()> {
    let options = Options::from_args();
    trace::init(options.pretty);

    let defaults = match options.unit {
        Unit::Motor => UnitConfig::motor_default(),
        Unit::Home => UnitConfig::home_default(),
    };

    if options.write_default_config {
        let path = options
            .config
            .ok_or_else(|| eyre::eyre!("--write-default-config needs --config <path>"))?;
        defaults.save_to_file(&path)?;
        tracing::info!(path = %path.display(), "default configuration written");
        return Ok(());
    }

    let config = match &options.config {
        Some(path) => UnitConfig::load_from_file(path)?,
        None => {
            defaults.validate()?;
            defaults
        }
    };

    let shutdown = shutdown_flag()?;
    match options.unit {
        Unit::Motor => run_motor(&config, &shutdown),
        Unit::Home => run_home(&config, &shutdown),
    }
}

/// Set once SIGTERM or SIGINT arrives
fn shutdown_flag() -> eyre::Result<Arc<AtomicBool>> {
    use signal_hook::consts::{SIGINT, SIGTERM};

    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [SIGTERM, SIGINT] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown))
            .wrap_err("registering signal handlers")?;
    }
    Ok(shutdown)
}

fn open_transport(radio: &RadioSettings) -> eyre::Result<SerialTransport> {
    let identity = radio.identity()?;
    let serial = open_serial(&radio.serial_port, radio.baud_rate)?;
    let m0 = SysfsPin::output(radio.m0_pin).wrap_err("exporting M0 line")?;
    let m1 = SysfsPin::output(radio.m1_pin).wrap_err("exporting M1 line")?;

    let transport = RadioTransport::start(serial, m0, m1, StdDelay, identity, radio.timing)
        .wrap_err("configuring radio module")?
        .with_address_filtering(radio.address_filtering);
    Ok(transport)
}

fn run_motor(config: &UnitConfig, shutdown: &AtomicBool) -> eyre::Result<()> {
    let motor = &config.motor;
    let transport = open_transport(&config.radio)?;

    let relays = PulseRelays::new(
        SysfsPin::output(motor.relay_on_pin)?,
        SysfsPin::output(motor.relay_off_pin)?,
        StdDelay,
    )?
    .with_pulse_ms(motor.relay_pulse_ms);

    let clock = SystemClock;
    let counters = PersistentCounter::new(&motor.state_dir);
    let runtime = MotorRuntimeState::restore(counters, clock.unix_seconds());

    let mut appliance = ApplianceProtocol::new(
        transport,
        relays,
        clock,
        runtime,
        ApplianceOptions::from_config(config),
    );

    let monitor = PowerLossMonitor::spawn(
        SysfsPin::input(motor.power_loss_pin)?,
        appliance.power_loss_signal(),
        Duration::from_millis(motor.power_loss_sample_ms),
        motor.power_loss_debounce_samples,
    )
    .wrap_err("starting power-loss monitor")?;

    appliance.run(shutdown);
    monitor.stop();
    Ok(())
}

fn run_home(config: &UnitConfig, shutdown: &AtomicBool) -> eyre::Result<()> {
    let transport = open_transport(&config.radio)?;
    let mut controller =
        ControllerProtocol::new(transport, SystemClock, ControllerOptions::from_config(config));

    controller.on_status_received(Box::new(|report| {
        println!(
            "motor {} | run-time {}s | error {:?}{}",
            if report.status.motor_on { "ON" } else { "OFF" },
            report.status.total_run_time_seconds,
            report.status.error_code,
            report.rssi_dbm.map(|rssi| format!(" | {} dBm", rssi)).unwrap_or_default(),
        );
    }));
    controller.on_no_response(Box::new(|command| {
        println!("no response from remote unit to {:?}", command);
    }));

    let lines = spawn_stdin_reader()?;
    println!("commands: on | off | status | timer <minutes> | quit");

    while !shutdown.load(Ordering::Acquire) {
        match lines.try_recv() {
            Ok(line) => {
                let line = line.trim();
                if line == "quit" {
                    break;
                }
                match parse_command(line) {
                    Some(command) => {
                        if let Err(e) = controller.send_command(command) {
                            println!("not sent: {}", e);
                        }
                    }
                    None if line.is_empty() => {}
                    None => println!("unknown command {:?}", line),
                }
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => break,
        }

        for event in controller.poll() {
            if let ControllerEvent::LinkFault { error } = event {
                tracing::warn!(%error, "radio link fault");
            }
        }
    }

    controller.standby()?;
    Ok(())
}

fn spawn_stdin_reader() -> io::Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}

fn parse_command(line: &str) -> Option<CommandMessage> {
    let mut words = line.split_whitespace();
    let command = match words.next()? {
        "on" => CommandMessage::On,
        "off" => CommandMessage::Off,
        "status" => CommandMessage::StatusRequest,
        "timer" => CommandMessage::SetTimer {
            minutes: words.next()?.parse().ok()?,
        },
        _ => return None,
    };
    Some(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("on"), Some(CommandMessage::On));
        assert_eq!(parse_command("  status "), Some(CommandMessage::StatusRequest));
        assert_eq!(parse_command("timer 15"), Some(CommandMessage::SetTimer { minutes: 15 }));
        assert_eq!(parse_command("timer"), None);
        assert_eq!(parse_command("timer 300"), None);
        assert_eq!(parse_command("reboot"), None);
    }
}
