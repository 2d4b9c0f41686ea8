//! Closed set of device names and the audit event code catalog.
//!
//! Every name accepted from the outside world (CLI, control requests) is parsed
//! into one of these enums; an unknown name is an [`UnknownDevice`] error.

use core::fmt;
use serde::Serialize;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Light,
    Temperature,
    Humidity,
    WaterLevel,
    SoilMoisture,
}

impl SensorKind {
    /// Collection order used by every cycle.
    pub const ALL: [SensorKind; 5] = [
        SensorKind::Light,
        SensorKind::Temperature,
        SensorKind::Humidity,
        SensorKind::WaterLevel,
        SensorKind::SoilMoisture,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SensorKind::Light => "light_sensor",
            SensorKind::Temperature => "temperature_sensor",
            SensorKind::Humidity => "humidity_sensor",
            SensorKind::WaterLevel => "ultrasonic_sensor",
            SensorKind::SoilMoisture => "soil_moisture_sensor",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            SensorKind::Light | SensorKind::Humidity | SensorKind::SoilMoisture => "%",
            SensorKind::Temperature => "°F",
            SensorKind::WaterLevel => "cm",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorKind {
    Light,
    Atomizer,
    Heater,
    WaterPump,
}

impl ActuatorKind {
    pub const ALL: [ActuatorKind; 4] = [
        ActuatorKind::Light,
        ActuatorKind::Atomizer,
        ActuatorKind::Heater,
        ActuatorKind::WaterPump,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ActuatorKind::Light => "light",
            ActuatorKind::Atomizer => "atomizer",
            ActuatorKind::Heater => "heater",
            ActuatorKind::WaterPump => "water",
        }
    }

    pub fn on_code(self) -> EventCode {
        match self {
            ActuatorKind::Light => EventCode::LightOn,
            ActuatorKind::Atomizer => EventCode::AtomizerOn,
            ActuatorKind::Heater => EventCode::HeaterOn,
            ActuatorKind::WaterPump => EventCode::PumpOn,
        }
    }

    pub fn off_code(self) -> EventCode {
        match self {
            ActuatorKind::Light => EventCode::LightOff,
            ActuatorKind::Atomizer => EventCode::AtomizerOff,
            ActuatorKind::Heater => EventCode::HeaterOff,
            ActuatorKind::WaterPump => EventCode::PumpOff,
        }
    }
}

/// Any device the manager can address by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    Sensor(SensorKind),
    Actuator(ActuatorKind),
}

impl Device {
    pub fn name(self) -> &'static str {
        match self {
            Device::Sensor(kind) => kind.name(),
            Device::Actuator(kind) => kind.name(),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDevice(pub String);

impl fmt::Display for UnknownDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown device: {}", self.0)
    }
}

impl std::error::Error for UnknownDevice {}

impl FromStr for Device {
    type Err = UnknownDevice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let device = match s.trim().to_ascii_lowercase().as_str() {
            "light_sensor" => Device::Sensor(SensorKind::Light),
            "temperature_sensor" => Device::Sensor(SensorKind::Temperature),
            "humidity_sensor" => Device::Sensor(SensorKind::Humidity),
            "ultrasonic_sensor" | "water_level_sensor" => Device::Sensor(SensorKind::WaterLevel),
            "soil_moisture_sensor" => Device::Sensor(SensorKind::SoilMoisture),
            "light" => Device::Actuator(ActuatorKind::Light),
            "atomizer" | "humidifier" => Device::Actuator(ActuatorKind::Atomizer),
            "heater" => Device::Actuator(ActuatorKind::Heater),
            "water" | "water_pump" => Device::Actuator(ActuatorKind::WaterPump),
            _ => return Err(UnknownDevice(s.to_string())),
        };
        Ok(device)
    }
}

/// Audit event codes. The numeric values are persisted and must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(i32)]
pub enum EventCode {
    LightOff = 100,
    LightOn = 101,
    AtomizerOff = 200,
    AtomizerOn = 201,
    FanOff = 300,
    FanOn = 301,
    PumpOff = 400,
    PumpOn = 401,
    HeaterOff = 500,
    HeaterOn = 501,
}

impl EventCode {
    pub const ALL: [EventCode; 10] = [
        EventCode::LightOff,
        EventCode::LightOn,
        EventCode::AtomizerOff,
        EventCode::AtomizerOn,
        EventCode::FanOff,
        EventCode::FanOn,
        EventCode::PumpOff,
        EventCode::PumpOn,
        EventCode::HeaterOff,
        EventCode::HeaterOn,
    ];

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    /// Matches the descriptions seeded by the initial migration.
    pub fn description(self) -> &'static str {
        match self {
            EventCode::LightOff => "Light turned off",
            EventCode::LightOn => "Light turned on",
            EventCode::AtomizerOff => "Atomizer turned off",
            EventCode::AtomizerOn => "Atomizer turned on",
            EventCode::FanOff => "Fan turned off",
            EventCode::FanOn => "Fan turned on",
            EventCode::PumpOff => "Water pump turned off",
            EventCode::PumpOn => "Water pump turned on",
            EventCode::HeaterOff => "Heater turned off",
            EventCode::HeaterOn => "Heater turned on",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_aliases() {
        assert_eq!("water".parse::<Device>(), Ok(Device::Actuator(ActuatorKind::WaterPump)));
        assert_eq!("water_pump".parse::<Device>(), Ok(Device::Actuator(ActuatorKind::WaterPump)));
        assert_eq!("humidifier".parse::<Device>(), Ok(Device::Actuator(ActuatorKind::Atomizer)));
        assert_eq!(
            " Temperature_Sensor ".parse::<Device>(),
            Ok(Device::Sensor(SensorKind::Temperature))
        );
        assert_eq!(
            "water_level_sensor".parse::<Device>(),
            Ok(Device::Sensor(SensorKind::WaterLevel))
        );
    }

    #[test]
    fn unknown_name_is_an_error() {
        let err = "fan".parse::<Device>().unwrap_err();
        assert_eq!(err, UnknownDevice("fan".to_string()));
    }

    #[test]
    fn canonical_names_round_trip() {
        for kind in SensorKind::ALL {
            assert_eq!(kind.name().parse::<Device>(), Ok(Device::Sensor(kind)));
        }
        for kind in ActuatorKind::ALL {
            assert_eq!(kind.name().parse::<Device>(), Ok(Device::Actuator(kind)));
        }
    }

    #[test]
    fn event_codes_pair_off_and_on() {
        for kind in ActuatorKind::ALL {
            assert_eq!(kind.on_code().code(), kind.off_code().code() + 1);
            assert_eq!(kind.off_code().code() % 100, 0);
        }
        assert_eq!(ActuatorKind::WaterPump.on_code().code(), 401);
        assert_eq!(ActuatorKind::Heater.off_code().code(), 500);
        assert_eq!(EventCode::from_code(301), Some(EventCode::FanOn));
        assert_eq!(EventCode::from_code(302), None);
    }
}
