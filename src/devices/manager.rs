//! Owns the configured devices and dispatches named operations to them.

use super::actuator::{ActuatorError, AuditLog, RelayComponent};
use super::analog::AnalogSensor;
use super::context::DeviceContext;
use super::humidity::HumiditySensor;
use super::sensor::{Sensor, SensorError};
use super::temperature::TemperatureSensor;
use super::ultrasonic::UltrasonicSensor;
use crate::hal::{Clock, HalError};
use crate::models::device::{ActuatorKind, Device, SensorKind};
use crate::models::pins::PinConfig;
use core::fmt;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

pub const TEST_CYCLES: u32 = 3;
pub const TEST_DWELL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceError {
    Hal { device: Device, source: HalError },
    PinConflict { pin: u8, first: Device, second: Device },
    InvalidConfig(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Hal { device, source } => write!(f, "{}: {}", device, source),
            DeviceError::PinConflict { pin, first, second } => {
                write!(f, "gpio {} assigned to both {} and {}", pin, first, second)
            }
            DeviceError::InvalidConfig(e) => write!(f, "invalid pin configuration: {}", e),
        }
    }
}

impl std::error::Error for DeviceError {}

#[derive(Debug, Clone, PartialEq)]
pub enum SenseError {
    NotConfigured(SensorKind),
    Failed(SensorKind, SensorError),
}

impl fmt::Display for SenseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SenseError::NotConfigured(kind) => write!(f, "{} is not configured", kind.name()),
            SenseError::Failed(kind, e) => write!(f, "{}: {}", kind.name(), e),
        }
    }
}

impl std::error::Error for SenseError {}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TestOutcome {
    NotConfigured,
    Cycled { cycles: u32 },
    Sensed(Option<f64>),
}

pub struct DeviceManager {
    light_sensor: Option<AnalogSensor>,
    temperature_sensor: Option<TemperatureSensor>,
    humidity_sensor: Option<HumiditySensor>,
    ultrasonic_sensor: Option<UltrasonicSensor>,
    soil_moisture_sensor: Option<AnalogSensor>,
    light: Option<RelayComponent>,
    atomizer: Option<RelayComponent>,
    heater: Option<RelayComponent>,
    water_pump: Option<RelayComponent>,
    clock: Rc<dyn Clock>,
}

impl DeviceManager {
    /// Build only the devices whose pins are present in `pins`.
    pub fn new(pins: &PinConfig, ctx: &DeviceContext) -> Result<Self, DeviceError> {
        check_pin_conflicts(pins, ctx.adc_cs_pin)?;
        pins.check_adc_channels().map_err(DeviceError::InvalidConfig)?;

        let hal = |device: Device| move |source: HalError| DeviceError::Hal { device, source };

        let ultrasonic_sensor = match (pins.ultrasonic_trigger, pins.ultrasonic_echo) {
            (Some(trigger), Some(echo)) => Some(
                UltrasonicSensor::new(trigger, echo, ctx).map_err(hal(Device::Sensor(SensorKind::WaterLevel)))?,
            ),
            (None, None) => None,
            _ => {
                warn!("ultrasonic_sensor needs both trigger and echo pins; leaving it disabled");
                None
            }
        };

        let manager = Self {
            light_sensor: pins
                .light_sensor
                .map(|ch| AnalogSensor::light(ch, ctx))
                .transpose()
                .map_err(hal(Device::Sensor(SensorKind::Light)))?,
            temperature_sensor: pins.temperature_sensor.map(|_| TemperatureSensor::new(ctx)),
            humidity_sensor: pins
                .humidity_sensor
                .map(|pin| HumiditySensor::new(pin, ctx))
                .transpose()
                .map_err(hal(Device::Sensor(SensorKind::Humidity)))?,
            ultrasonic_sensor,
            soil_moisture_sensor: pins
                .soil_moisture_sensor
                .map(|ch| AnalogSensor::soil_moisture(ch, ctx))
                .transpose()
                .map_err(hal(Device::Sensor(SensorKind::SoilMoisture)))?,
            light: relay(pins, ActuatorKind::Light, ctx)?,
            atomizer: relay(pins, ActuatorKind::Atomizer, ctx)?,
            heater: relay(pins, ActuatorKind::Heater, ctx)?,
            water_pump: relay(pins, ActuatorKind::WaterPump, ctx)?,
            clock: Rc::clone(&ctx.clock),
        };

        let names: Vec<&str> = manager.configured().into_iter().map(Device::name).collect();
        info!(
            "Device manager ready ({}): {}",
            if ctx.simulation { "simulated" } else { "hardware" },
            if names.is_empty() { "-".to_string() } else { names.join(", ") }
        );
        Ok(manager)
    }

    pub fn is_configured(&self, device: Device) -> bool {
        match device {
            Device::Sensor(kind) => self.sensor(kind).is_some(),
            Device::Actuator(kind) => self.actuator(kind).is_some(),
        }
    }

    pub fn configured(&self) -> Vec<Device> {
        let sensors = SensorKind::ALL.into_iter().map(Device::Sensor);
        let actuators = ActuatorKind::ALL.into_iter().map(Device::Actuator);
        sensors.chain(actuators).filter(|d| self.is_configured(*d)).collect()
    }

    fn sensor(&self, kind: SensorKind) -> Option<&dyn Sensor> {
        match kind {
            SensorKind::Light => self.light_sensor.as_ref().map(|s| s as &dyn Sensor),
            SensorKind::Temperature => self.temperature_sensor.as_ref().map(|s| s as &dyn Sensor),
            SensorKind::Humidity => self.humidity_sensor.as_ref().map(|s| s as &dyn Sensor),
            SensorKind::WaterLevel => self.ultrasonic_sensor.as_ref().map(|s| s as &dyn Sensor),
            SensorKind::SoilMoisture => self.soil_moisture_sensor.as_ref().map(|s| s as &dyn Sensor),
        }
    }

    fn sensor_mut(&mut self, kind: SensorKind) -> Option<&mut dyn Sensor> {
        match kind {
            SensorKind::Light => self.light_sensor.as_mut().map(|s| s as &mut dyn Sensor),
            SensorKind::Temperature => self.temperature_sensor.as_mut().map(|s| s as &mut dyn Sensor),
            SensorKind::Humidity => self.humidity_sensor.as_mut().map(|s| s as &mut dyn Sensor),
            SensorKind::WaterLevel => self.ultrasonic_sensor.as_mut().map(|s| s as &mut dyn Sensor),
            SensorKind::SoilMoisture => self.soil_moisture_sensor.as_mut().map(|s| s as &mut dyn Sensor),
        }
    }

    pub fn actuator(&self, kind: ActuatorKind) -> Option<&RelayComponent> {
        match kind {
            ActuatorKind::Light => self.light.as_ref(),
            ActuatorKind::Atomizer => self.atomizer.as_ref(),
            ActuatorKind::Heater => self.heater.as_ref(),
            ActuatorKind::WaterPump => self.water_pump.as_ref(),
        }
    }

    pub fn actuator_mut(&mut self, kind: ActuatorKind) -> Option<&mut RelayComponent> {
        match kind {
            ActuatorKind::Light => self.light.as_mut(),
            ActuatorKind::Atomizer => self.atomizer.as_mut(),
            ActuatorKind::Heater => self.heater.as_mut(),
            ActuatorKind::WaterPump => self.water_pump.as_mut(),
        }
    }

    /// One sample, or `None` when the sensor is missing or failed.
    pub fn sense(&mut self, kind: SensorKind) -> Option<f64> {
        self.sensor_mut(kind)?.read()
    }

    pub fn probe(&mut self, kind: SensorKind) -> Result<f64, SenseError> {
        let sensor = self.sensor_mut(kind).ok_or(SenseError::NotConfigured(kind))?;
        sensor.measure().map_err(|e| SenseError::Failed(kind, e))
    }

    pub fn turn_on(&mut self, kind: ActuatorKind, audit: &mut dyn AuditLog) -> Result<(), ActuatorError> {
        match self.actuator_mut(kind) {
            Some(actuator) => actuator.turn_on(audit),
            None => not_configured(kind),
        }
    }

    pub fn turn_off(&mut self, kind: ActuatorKind, audit: &mut dyn AuditLog) -> Result<(), ActuatorError> {
        match self.actuator_mut(kind) {
            Some(actuator) => actuator.turn_off(audit),
            None => not_configured(kind),
        }
    }

    pub fn activate_for_duration(
        &mut self,
        kind: ActuatorKind,
        seconds: u64,
        audit: &mut dyn AuditLog,
    ) -> Result<(), ActuatorError> {
        match self.actuator_mut(kind) {
            Some(actuator) => actuator.activate_for_duration(seconds, audit),
            None => not_configured(kind),
        }
    }

    pub fn pulse_activate(
        &mut self,
        kind: ActuatorKind,
        on_seconds: u64,
        off_seconds: u64,
        cycles: u32,
        audit: &mut dyn AuditLog,
    ) -> Result<(), ActuatorError> {
        match self.actuator_mut(kind) {
            Some(actuator) => actuator.pulse_activate(on_seconds, off_seconds, cycles, audit),
            None => not_configured(kind),
        }
    }

    /// Actuators cycle on and off [`TEST_CYCLES`] times; sensors take one sample.
    pub fn test(&mut self, device: Device, audit: &mut dyn AuditLog) -> Result<TestOutcome, ActuatorError> {
        if !self.is_configured(device) {
            debug!("{} is not configured; nothing to test", device);
            return Ok(TestOutcome::NotConfigured);
        }
        match device {
            Device::Sensor(kind) => Ok(TestOutcome::Sensed(self.sense(kind))),
            Device::Actuator(kind) => {
                let clock = Rc::clone(&self.clock);
                info!("Testing {}: {} on/off cycles", kind.name(), TEST_CYCLES);
                for _ in 0..TEST_CYCLES {
                    self.turn_on(kind, audit)?;
                    clock.sleep(TEST_DWELL);
                    self.turn_off(kind, audit)?;
                    clock.sleep(TEST_DWELL);
                }
                Ok(TestOutcome::Cycled { cycles: TEST_CYCLES })
            }
        }
    }

    /// Force every actuator off and idle every sensor line. Idempotent.
    pub fn release_all(&mut self) {
        for kind in ActuatorKind::ALL {
            if let Some(actuator) = self.actuator_mut(kind) {
                actuator.release();
            }
        }
        for kind in SensorKind::ALL {
            if let Some(sensor) = self.sensor_mut(kind) {
                sensor.release();
            }
        }
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        debug!("Releasing devices");
        self.release_all();
    }
}

fn not_configured(kind: ActuatorKind) -> Result<(), ActuatorError> {
    debug!("{} is not configured; ignoring", kind.name());
    Ok(())
}

fn relay(pins: &PinConfig, kind: ActuatorKind, ctx: &DeviceContext) -> Result<Option<RelayComponent>, DeviceError> {
    pins.actuator_pin(kind)
        .map(|pin| RelayComponent::new(kind, pin, ctx))
        .transpose()
        .map_err(|source| DeviceError::Hal {
            device: Device::Actuator(kind),
            source,
        })
}

fn check_pin_conflicts(pins: &PinConfig, adc_cs_pin: u8) -> Result<(), DeviceError> {
    let mut owners: BTreeMap<u8, Device> = BTreeMap::new();
    for (pin, device) in pins.gpio_claims(adc_cs_pin) {
        if let Some(first) = owners.insert(pin, device) {
            return Err(DeviceError::PinConflict {
                pin,
                first,
                second: device,
            });
        }
    }
    Ok(())
}
