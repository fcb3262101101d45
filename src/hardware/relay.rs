//! Latching relay pair that switches the motor

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

#[derive(Debug, thiserror::Error)]
#[error("relay line {line} failed: {reason}")]
pub struct RelayError {
    pub line: &'static str,
    pub reason: String,
}

/// Something that can start and stop the motor
pub trait RelayDriver {
    fn switch_on(&mut self) -> Result<(), RelayError>;
    fn switch_off(&mut self) -> Result<(), RelayError>;
}

impl<R: RelayDriver + ?Sized> RelayDriver for Box<R> {
    fn switch_on(&mut self) -> Result<(), RelayError> {
        (**self).switch_on()
    }

    fn switch_off(&mut self) -> Result<(), RelayError> {
        (**self).switch_off()
    }
}

/// Two latching relays, each toggled by a short high pulse
pub struct PulseRelays<On, Off, D> {
    on: On,
    off: Off,
    delay: D,
    pulse_ms: u32,
}

impl<On, Off, D> PulseRelays<On, Off, D>
where
    On: OutputPin,
    Off: OutputPin,
    D: DelayNs,
{
    pub const DEFAULT_PULSE_MS: u32 = 100;

    /// Take both lines and drive them low
    pub fn new(mut on: On, mut off: Off, delay: D) -> Result<Self, RelayError> {
        on.set_low().map_err(|e| pin_error("on", e))?;
        off.set_low().map_err(|e| pin_error("off", e))?;

        Ok(Self {
            on,
            off,
            delay,
            pulse_ms: Self::DEFAULT_PULSE_MS,
        })
    }

    pub fn with_pulse_ms(mut self, pulse_ms: u32) -> Self {
        self.pulse_ms = pulse_ms;
        self
    }

    fn pulse<P: OutputPin>(
        pin: &mut P,
        delay: &mut D,
        pulse_ms: u32,
        line: &'static str,
    ) -> Result<(), RelayError> {
        pin.set_high().map_err(|e| pin_error(line, e))?;
        delay.delay_ms(pulse_ms);
        pin.set_low().map_err(|e| pin_error(line, e))
    }
}

impl<On, Off, D> RelayDriver for PulseRelays<On, Off, D>
where
    On: OutputPin,
    Off: OutputPin,
    D: DelayNs,
{
    fn switch_on(&mut self) -> Result<(), RelayError> {
        tracing::debug!(pulse_ms = self.pulse_ms, "pulsing on relay");
        Self::pulse(&mut self.on, &mut self.delay, self.pulse_ms, "on")
    }

    fn switch_off(&mut self) -> Result<(), RelayError> {
        tracing::debug!(pulse_ms = self.pulse_ms, "pulsing off relay");
        Self::pulse(&mut self.off, &mut self.delay, self.pulse_ms, "off")
    }
}

fn pin_error<E: std::fmt::Debug>(line: &'static str, error: E) -> RelayError {
    RelayError {
        line,
        reason: format!("{:?}", error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{MockPin, NoDelay};

    #[test]
    fn test_each_switch_pulses_its_own_line() {
        let (on, off, delay) = (MockPin::new(), MockPin::new(), NoDelay::default());
        let mut relays = PulseRelays::new(on.clone(), off.clone(), delay.clone()).unwrap();
        on.clear_history();
        off.clear_history();

        relays.switch_on().unwrap();
        assert_eq!(on.history(), vec![true, false]);
        assert!(off.history().is_empty());
        assert_eq!(delay.total_ms(), 100);

        relays.switch_off().unwrap();
        assert_eq!(off.history(), vec![true, false]);
        assert_eq!(on.history().len(), 2);
    }

    #[test]
    fn test_pulse_length_is_configurable() {
        let delay = NoDelay::default();
        let mut relays = PulseRelays::new(MockPin::new(), MockPin::new(), delay.clone())
            .unwrap()
            .with_pulse_ms(250);

        relays.switch_off().unwrap();
        assert_eq!(delay.total_ms(), 250);
    }
}
