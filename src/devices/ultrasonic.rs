//! HC-SR04 ultrasonic distance sensor used as the water level gauge.

use super::context::DeviceContext;
use super::sensor::{EchoPhase, Sensor, SensorError, round_to};
use crate::hal::{Clock, HalError, InputLine, Level, OutputLine, Wiring};
use crate::models::device::SensorKind;
use log::warn;
use std::rc::Rc;
use std::time::Duration;

pub const SIMULATED_CM: f64 = 42.0;
pub const SETTLE: Duration = Duration::from_micros(200);
pub const TRIGGER_PULSE: Duration = Duration::from_micros(10);
/// Upper bound on each half of the echo wait.
pub const ECHO_TIMEOUT: Duration = Duration::from_millis(40);
/// Half the speed of sound in cm/s: the pulse travels there and back.
const HALF_SPEED_OF_SOUND: f64 = 17150.0;

struct EchoLines {
    trigger: Box<dyn OutputLine>,
    echo: Box<dyn InputLine>,
}

pub struct UltrasonicSensor {
    trigger_pin: u8,
    wiring: Wiring<EchoLines>,
    clock: Rc<dyn Clock>,
}

impl UltrasonicSensor {
    pub fn new(trigger_pin: u8, echo_pin: u8, ctx: &DeviceContext) -> Result<Self, HalError> {
        let wiring = if ctx.simulation {
            Wiring::Simulated
        } else {
            Wiring::Physical(EchoLines {
                trigger: ctx.backend.output(trigger_pin, Level::Low)?,
                echo: ctx.backend.input(echo_pin)?,
            })
        };
        Ok(Self {
            trigger_pin,
            wiring,
            clock: Rc::clone(&ctx.clock),
        })
    }
}

impl Sensor for UltrasonicSensor {
    fn kind(&self) -> SensorKind {
        SensorKind::WaterLevel
    }

    fn measure(&mut self) -> Result<f64, SensorError> {
        let lines = match &mut self.wiring {
            Wiring::Simulated => return Ok(SIMULATED_CM),
            Wiring::Physical(lines) => lines,
        };
        let clock = &self.clock;

        lines.trigger.write(Level::Low)?;
        clock.sleep(SETTLE);
        lines.trigger.write(Level::High)?;
        clock.sleep(TRIGGER_PULSE);
        lines.trigger.write(Level::Low)?;

        let mut pulse_start = clock.now();
        let deadline = pulse_start + ECHO_TIMEOUT;
        while lines.echo.read()? == Level::Low {
            pulse_start = clock.now();
            if pulse_start > deadline {
                return Err(SensorError::Timeout(EchoPhase::Rise));
            }
        }

        let mut pulse_end = clock.now();
        let deadline = pulse_end + ECHO_TIMEOUT;
        while lines.echo.read()? == Level::High {
            pulse_end = clock.now();
            if pulse_end > deadline {
                return Err(SensorError::Timeout(EchoPhase::Fall));
            }
        }

        let high_time = pulse_end.saturating_duration_since(pulse_start);
        Ok(round_to(high_time.as_secs_f64() * HALF_SPEED_OF_SOUND, 2))
    }

    fn release(&mut self) {
        if let Wiring::Physical(lines) = &mut self.wiring
            && let Err(e) = lines.trigger.park(Level::Low)
        {
            warn!("ultrasonic_sensor: failed to park trigger gpio {}: {}", self.trigger_pin, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBackend, FakeClock, context, context_with_clock};

    fn sensor_with_echo(script: impl Fn(Duration) -> Level + 'static) -> (UltrasonicSensor, FakeBackend) {
        let clock = FakeClock::new();
        let backend = FakeBackend::default();
        backend.set_echo(24, clock.clone(), script);
        let ctx = context_with_clock(false, backend.clone(), clock);
        (UltrasonicSensor::new(23, 24, &ctx).unwrap(), backend)
    }

    #[test]
    fn simulated_distance_is_fixed() {
        let ctx = context(true, FakeBackend::default());
        let mut sensor = UltrasonicSensor::new(23, 24, &ctx).unwrap();
        assert_eq!(sensor.read(), Some(42.0));
    }

    #[test]
    fn measures_echo_high_time() {
        let (mut sensor, backend) = sensor_with_echo(|t| {
            if t >= Duration::from_millis(1) && t < Duration::from_millis(3) {
                Level::High
            } else {
                Level::Low
            }
        });
        // 2 ms of echo is 34.3 cm, give or take a clock tick on either edge
        let cm = sensor.measure().unwrap();
        assert!((34.0..=34.6).contains(&cm), "{cm}");
        assert_eq!(backend.writes(23), vec![Level::Low, Level::Low, Level::High, Level::Low]);
    }

    #[test]
    fn echo_never_rising_times_out() {
        let (mut sensor, _) = sensor_with_echo(|_| Level::Low);
        assert_eq!(sensor.measure(), Err(SensorError::Timeout(EchoPhase::Rise)));
        assert_eq!(sensor.read(), None);
    }

    #[test]
    fn echo_never_falling_times_out() {
        let (mut sensor, _) = sensor_with_echo(|_| Level::High);
        assert_eq!(sensor.measure(), Err(SensorError::Timeout(EchoPhase::Fall)));
    }

    #[test]
    fn release_parks_trigger_low() {
        let (mut sensor, backend) = sensor_with_echo(|_| Level::Low);
        sensor.release();
        assert_eq!(backend.parked(23), Some(Level::Low));
    }
}
