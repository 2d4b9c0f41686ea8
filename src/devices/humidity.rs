use super::context::DeviceContext;
use super::sensor::{Sensor, SensorError, round_to};
use crate::hal::{Clock, HalError, HumitureProbe, Wiring};
use crate::models::device::SensorKind;
use log::warn;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::rc::Rc;
use std::time::Duration;

/// DHT11 needs a couple of seconds between reads.
pub const RETRY_DELAY: Duration = Duration::from_secs(2);

pub struct HumiditySensor {
    pin: u8,
    wiring: Wiring<Box<dyn HumitureProbe>>,
    clock: Rc<dyn Clock>,
    rng: SmallRng,
}

impl HumiditySensor {
    pub fn new(pin: u8, ctx: &DeviceContext) -> Result<Self, HalError> {
        let wiring = if ctx.simulation {
            Wiring::Simulated
        } else {
            Wiring::Physical(ctx.backend.humiture(pin)?)
        };
        Ok(Self {
            pin,
            wiring,
            clock: Rc::clone(&ctx.clock),
            rng: SmallRng::from_os_rng(),
        })
    }
}

impl Sensor for HumiditySensor {
    fn kind(&self) -> SensorKind {
        SensorKind::Humidity
    }

    fn measure(&mut self) -> Result<f64, SensorError> {
        let probe = match &mut self.wiring {
            Wiring::Simulated => return Ok(round_to(self.rng.random_range(45.0..=65.0), 1)),
            Wiring::Physical(probe) => probe,
        };

        let humidity = match probe.humidity() {
            Ok(h) => h,
            Err(first) => {
                warn!("humidity_sensor on gpio {}: {}; retrying in {}s", self.pin, first, RETRY_DELAY.as_secs());
                self.clock.sleep(RETRY_DELAY);
                probe.humidity()?
            }
        };
        Ok(round_to(humidity, 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBackend, FakeClock, context, context_with_clock};

    fn probe_fault() -> HalError {
        HalError::Probe("Checksum did not validate".to_string())
    }

    #[test]
    fn simulated_values_stay_in_range() {
        let ctx = context(true, FakeBackend::default());
        let mut sensor = HumiditySensor::new(6, &ctx).unwrap();
        for _ in 0..200 {
            let h = sensor.read().unwrap();
            assert!((45.0..=65.0).contains(&h), "{h}");
            assert_eq!(h, round_to(h, 1));
        }
    }

    #[test]
    fn retries_once_after_delay() {
        let backend = FakeBackend::default();
        backend.push_humidity(Err(probe_fault()));
        backend.push_humidity(Ok(51.04));
        let clock = FakeClock::new();
        let ctx = context_with_clock(false, backend, clock.clone());

        let mut sensor = HumiditySensor::new(6, &ctx).unwrap();
        assert_eq!(sensor.read(), Some(51.0));
        assert_eq!(clock.sleeps(), vec![RETRY_DELAY]);
    }

    #[test]
    fn gives_up_after_second_fault() {
        let backend = FakeBackend::default();
        backend.push_humidity(Err(probe_fault()));
        backend.push_humidity(Err(probe_fault()));
        backend.push_humidity(Ok(50.0));
        let clock = FakeClock::new();
        let ctx = context_with_clock(false, backend.clone(), clock.clone());

        let mut sensor = HumiditySensor::new(6, &ctx).unwrap();
        assert_eq!(sensor.read(), None);
        assert_eq!(clock.sleeps().len(), 1);
        // the third scripted value is still queued: no further attempts were made
        assert_eq!(backend.pending_humidity(), 1);
    }
}
