//! Light and soil moisture sensors behind MCP3008 channels.

use super::context::DeviceContext;
use super::sensor::{Sensor, SensorError, round_to};
use crate::hal::{AnalogInput, HalError, Wiring};
use crate::models::device::SensorKind;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

pub const SAMPLES_PER_READING: usize = 10;

pub struct AnalogSensor {
    kind: SensorKind,
    vref: f64,
    wiring: Wiring<Box<dyn AnalogInput>>,
    rng: SmallRng,
}

impl AnalogSensor {
    pub fn light(channel: u8, ctx: &DeviceContext) -> Result<Self, HalError> {
        Self::new(SensorKind::Light, channel, ctx)
    }

    pub fn soil_moisture(channel: u8, ctx: &DeviceContext) -> Result<Self, HalError> {
        Self::new(SensorKind::SoilMoisture, channel, ctx)
    }

    fn new(kind: SensorKind, channel: u8, ctx: &DeviceContext) -> Result<Self, HalError> {
        let wiring = if ctx.simulation {
            Wiring::Simulated
        } else {
            Wiring::Physical(ctx.backend.analog(channel)?)
        };
        Ok(Self {
            kind,
            vref: ctx.adc_vref,
            wiring,
            rng: SmallRng::from_os_rng(),
        })
    }

    fn simulated(&mut self) -> f64 {
        let raw = match self.kind {
            SensorKind::Light => self.rng.random_range(500.0..=1500.0),
            _ => self.rng.random_range(0.0..=100.0),
        };
        round_to(raw, 1)
    }
}

impl Sensor for AnalogSensor {
    fn kind(&self) -> SensorKind {
        self.kind
    }

    fn measure(&mut self) -> Result<f64, SensorError> {
        let adc = match &mut self.wiring {
            Wiring::Simulated => return Ok(self.simulated()),
            Wiring::Physical(adc) => adc,
        };

        let mut total = 0.0;
        for _ in 0..SAMPLES_PER_READING {
            total += adc.voltage()?;
        }
        let average = total / SAMPLES_PER_READING as f64;
        Ok(percent_of_reference(average, self.vref))
    }
}

/// `voltage` as a percentage of `vref`, clamped and rounded to one decimal.
pub fn percent_of_reference(voltage: f64, vref: f64) -> f64 {
    round_to((voltage / vref * 100.0).clamp(0.0, 100.0), 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBackend, context};

    #[test]
    fn simulated_values_stay_in_range() {
        let ctx = context(true, FakeBackend::default());
        let mut light = AnalogSensor::light(0, &ctx).unwrap();
        let mut soil = AnalogSensor::soil_moisture(1, &ctx).unwrap();
        for _ in 0..200 {
            let l = light.read().unwrap();
            assert!((500.0..=1500.0).contains(&l), "{l}");
            assert_eq!(l, round_to(l, 1));
            let s = soil.read().unwrap();
            assert!((0.0..=100.0).contains(&s), "{s}");
            assert_eq!(s, round_to(s, 1));
        }
    }

    #[test]
    fn averages_samples_as_percent_of_vref() {
        let backend = FakeBackend::default();
        // five samples at 1.0 V and five at 2.0 V average to 1.5 V
        let samples: Vec<f64> = (0..10).map(|i| if i % 2 == 0 { 1.0 } else { 2.0 }).collect();
        backend.set_voltages(1, &samples);
        let ctx = context(false, backend);
        let mut soil = AnalogSensor::soil_moisture(1, &ctx).unwrap();
        assert_eq!(soil.measure(), Ok(45.5));
    }

    #[test]
    fn clamps_out_of_range_voltage() {
        assert_eq!(percent_of_reference(4.0, 3.3), 100.0);
        assert_eq!(percent_of_reference(-0.1, 3.3), 0.0);
        assert_eq!(percent_of_reference(1.65, 3.3), 50.0);
    }

    #[test]
    fn adc_fault_reads_as_none() {
        let ctx = context(false, FakeBackend::default());
        // no voltages scripted for channel 0
        let mut light = AnalogSensor::light(0, &ctx).unwrap();
        assert!(matches!(light.measure(), Err(SensorError::Hardware(_))));
        assert_eq!(light.read(), None);
    }
}
