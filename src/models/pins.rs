//! Pin assignments and thresholds, as used by the device layer.
//!
//! `None` disables a device slot. Light and soil moisture slots hold MCP3008
//! channel numbers; every other slot is a BCM GPIO number.

use crate::models::device::{ActuatorKind, Device, SensorKind};
use serde::Serialize;

pub const ADC_CHANNELS: u8 = 8;

/// Stored alongside the pins but never consumed by the device or collection layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Thresholds {
    pub light: i32,
    pub humidity_low: i32,
    pub humidity_high: i32,
    pub temperature_low: i32,
    pub temperature_high: i32,
    pub water_level_low: i32,
    pub dry_soil: i32,
    pub watered_soil: i32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            light: 500,
            humidity_low: 40,
            humidity_high: 60,
            temperature_low: 65,
            temperature_high: 80,
            water_level_low: 10,
            dry_soil: 700,
            watered_soil: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PinConfig {
    pub light_sensor: Option<u8>,
    pub humidity_sensor: Option<u8>,
    pub temperature_sensor: Option<u8>,
    pub ultrasonic_trigger: Option<u8>,
    pub ultrasonic_echo: Option<u8>,
    pub soil_moisture_sensor: Option<u8>,
    pub light: Option<u8>,
    pub water: Option<u8>,
    pub humidifier: Option<u8>,
    pub heater: Option<u8>,
    pub thresholds: Thresholds,
}

impl PinConfig {
    /// Wiring written to storage on first start when no configuration row exists.
    pub fn default_wiring() -> Self {
        Self {
            light_sensor: Some(0),
            humidity_sensor: Some(6),
            temperature_sensor: Some(4),
            ultrasonic_trigger: Some(23),
            ultrasonic_echo: Some(24),
            soil_moisture_sensor: Some(1),
            light: Some(18),
            water: Some(17),
            humidifier: Some(27),
            heater: Some(22),
            thresholds: Thresholds::default(),
        }
    }

    /// A configuration with every slot empty except `device`, wired to `pins`.
    ///
    /// The ultrasonic sensor takes `[trigger, echo]`; every other device takes one pin.
    pub fn only(device: Device, pins: &[u8]) -> Result<Self, String> {
        let mut config = Self::default();
        config.assign(device, pins)?;
        Ok(config)
    }

    pub fn assign(&mut self, device: Device, pins: &[u8]) -> Result<(), String> {
        let expected = match device {
            Device::Sensor(SensorKind::WaterLevel) => 2,
            _ => 1,
        };
        if pins.len() != expected {
            return Err(format!(
                "{} needs {} pin(s), got {}",
                device,
                expected,
                pins.len()
            ));
        }
        let pin = Some(pins[0]);
        match device {
            Device::Sensor(SensorKind::Light) => self.light_sensor = pin,
            Device::Sensor(SensorKind::Temperature) => self.temperature_sensor = pin,
            Device::Sensor(SensorKind::Humidity) => self.humidity_sensor = pin,
            Device::Sensor(SensorKind::WaterLevel) => {
                self.ultrasonic_trigger = pin;
                self.ultrasonic_echo = Some(pins[1]);
            }
            Device::Sensor(SensorKind::SoilMoisture) => self.soil_moisture_sensor = pin,
            Device::Actuator(ActuatorKind::Light) => self.light = pin,
            Device::Actuator(ActuatorKind::Atomizer) => self.humidifier = pin,
            Device::Actuator(ActuatorKind::Heater) => self.heater = pin,
            Device::Actuator(ActuatorKind::WaterPump) => self.water = pin,
        }
        self.check_adc_channels()
    }

    pub fn actuator_pin(&self, kind: ActuatorKind) -> Option<u8> {
        match kind {
            ActuatorKind::Light => self.light,
            ActuatorKind::Atomizer => self.humidifier,
            ActuatorKind::Heater => self.heater,
            ActuatorKind::WaterPump => self.water,
        }
    }

    /// Every GPIO line claimed by this configuration, in slot order.
    /// ADC channels are not GPIO lines; the MCP3008 behind them is selected
    /// through `adc_cs_pin`, claimed once by the first configured analog sensor.
    pub fn gpio_claims(&self, adc_cs_pin: u8) -> Vec<(u8, Device)> {
        let adc_select = [
            (self.light_sensor, SensorKind::Light),
            (self.soil_moisture_sensor, SensorKind::SoilMoisture),
        ]
        .into_iter()
        .find(|(channel, _)| channel.is_some())
        .map(|(_, kind)| (adc_cs_pin, Device::Sensor(kind)));

        let slots = [
            (self.temperature_sensor, Device::Sensor(SensorKind::Temperature)),
            (self.humidity_sensor, Device::Sensor(SensorKind::Humidity)),
            (self.ultrasonic_trigger, Device::Sensor(SensorKind::WaterLevel)),
            (self.ultrasonic_echo, Device::Sensor(SensorKind::WaterLevel)),
            (self.light, Device::Actuator(ActuatorKind::Light)),
            (self.water, Device::Actuator(ActuatorKind::WaterPump)),
            (self.humidifier, Device::Actuator(ActuatorKind::Atomizer)),
            (self.heater, Device::Actuator(ActuatorKind::Heater)),
        ];
        adc_select
            .into_iter()
            .chain(slots.into_iter().filter_map(|(pin, device)| pin.map(|p| (p, device))))
            .collect()
    }

    pub(crate) fn check_adc_channels(&self) -> Result<(), String> {
        for (channel, name) in [
            (self.light_sensor, "light_pin_in"),
            (self.soil_moisture_sensor, "soil_moisture_pin_in"),
        ] {
            if let Some(ch) = channel
                && ch >= ADC_CHANNELS
            {
                return Err(format!("{name}={ch} is not an MCP3008 channel (0-{})", ADC_CHANNELS - 1));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_assigns_a_single_slot() {
        let config = PinConfig::only(Device::Actuator(ActuatorKind::WaterPump), &[17]).unwrap();
        assert_eq!(config.water, Some(17));
        assert_eq!(config.gpio_claims(5), vec![(17, Device::Actuator(ActuatorKind::WaterPump))]);
        assert_eq!(config.light_sensor, None);
    }

    #[test]
    fn ultrasonic_needs_two_pins() {
        let device = Device::Sensor(SensorKind::WaterLevel);
        assert!(PinConfig::only(device, &[23]).is_err());
        let config = PinConfig::only(device, &[23, 24]).unwrap();
        assert_eq!((config.ultrasonic_trigger, config.ultrasonic_echo), (Some(23), Some(24)));
    }

    #[test]
    fn rejects_out_of_range_adc_channel() {
        let err = PinConfig::only(Device::Sensor(SensorKind::SoilMoisture), &[8]).unwrap_err();
        assert!(err.contains("soil_moisture_pin_in"), "{err}");
    }

    #[test]
    fn analog_sensors_claim_the_chip_select_once() {
        let mut config = PinConfig::only(Device::Sensor(SensorKind::SoilMoisture), &[1]).unwrap();
        assert_eq!(config.gpio_claims(5), vec![(5, Device::Sensor(SensorKind::SoilMoisture))]);
        config.light_sensor = Some(0);
        assert_eq!(config.gpio_claims(7), vec![(7, Device::Sensor(SensorKind::Light))]);
    }

    #[test]
    fn default_wiring_has_no_gpio_conflicts() {
        let claims = PinConfig::default_wiring().gpio_claims(5);
        let mut pins: Vec<u8> = claims.iter().map(|(p, _)| *p).collect();
        pins.sort_unstable();
        pins.dedup();
        assert_eq!(pins.len(), claims.len());
    }
}
