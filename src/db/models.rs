//! Diesel row types and their conversions into domain types.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;

use crate::models::device::SensorKind;
use crate::models::pins::{PinConfig, Thresholds};
use crate::schema;

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = schema::pin_config)]
pub struct PinConfigRow {
    pub id: i32,
    pub light_pin_in: Option<i32>,
    pub humidity_pin_in: Option<i32>,
    pub temperature_pin_in: Option<i32>,
    pub ultrasonic_trigger_pin_in: Option<i32>,
    pub ultrasonic_echo_pin_in: Option<i32>,
    pub soil_moisture_pin_in: Option<i32>,
    pub light_pin: Option<i32>,
    pub water_pin: Option<i32>,
    pub humidifier_pin: Option<i32>,
    pub heater_pin: Option<i32>,
    pub light_threshold: i32,
    pub humidity_threshold_low: i32,
    pub humidity_threshold_high: i32,
    pub temperature_threshold_low: i32,
    pub temperature_threshold_high: i32,
    pub water_level_threshold_low: i32,
    pub dry_soil_threshold: i32,
    pub watered_soil_threshold: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub revision: i32,
}

fn pin(column: &str, value: Option<i32>) -> Result<Option<u8>, String> {
    value
        .map(|v| u8::try_from(v).map_err(|_| format!("{column}={v} is out of range (0-255)")))
        .transpose()
}

impl TryFrom<&PinConfigRow> for PinConfig {
    type Error = String;

    fn try_from(row: &PinConfigRow) -> Result<Self, Self::Error> {
        let config = PinConfig {
            light_sensor: pin("light_pin_in", row.light_pin_in)?,
            humidity_sensor: pin("humidity_pin_in", row.humidity_pin_in)?,
            temperature_sensor: pin("temperature_pin_in", row.temperature_pin_in)?,
            ultrasonic_trigger: pin("ultrasonic_trigger_pin_in", row.ultrasonic_trigger_pin_in)?,
            ultrasonic_echo: pin("ultrasonic_echo_pin_in", row.ultrasonic_echo_pin_in)?,
            soil_moisture_sensor: pin("soil_moisture_pin_in", row.soil_moisture_pin_in)?,
            light: pin("light_pin", row.light_pin)?,
            water: pin("water_pin", row.water_pin)?,
            humidifier: pin("humidifier_pin", row.humidifier_pin)?,
            heater: pin("heater_pin", row.heater_pin)?,
            thresholds: Thresholds {
                light: row.light_threshold,
                humidity_low: row.humidity_threshold_low,
                humidity_high: row.humidity_threshold_high,
                temperature_low: row.temperature_threshold_low,
                temperature_high: row.temperature_threshold_high,
                water_level_low: row.water_level_threshold_low,
                dry_soil: row.dry_soil_threshold,
                watered_soil: row.watered_soil_threshold,
            },
        };
        config.check_adc_channels()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::pin_config)]
pub struct NewPinConfig {
    pub light_pin_in: Option<i32>,
    pub humidity_pin_in: Option<i32>,
    pub temperature_pin_in: Option<i32>,
    pub ultrasonic_trigger_pin_in: Option<i32>,
    pub ultrasonic_echo_pin_in: Option<i32>,
    pub soil_moisture_pin_in: Option<i32>,
    pub light_pin: Option<i32>,
    pub water_pin: Option<i32>,
    pub humidifier_pin: Option<i32>,
    pub heater_pin: Option<i32>,
    pub light_threshold: i32,
    pub humidity_threshold_low: i32,
    pub humidity_threshold_high: i32,
    pub temperature_threshold_low: i32,
    pub temperature_threshold_high: i32,
    pub water_level_threshold_low: i32,
    pub dry_soil_threshold: i32,
    pub watered_soil_threshold: i32,
}

impl From<&PinConfig> for NewPinConfig {
    fn from(c: &PinConfig) -> Self {
        let col = |p: Option<u8>| p.map(i32::from);
        Self {
            light_pin_in: col(c.light_sensor),
            humidity_pin_in: col(c.humidity_sensor),
            temperature_pin_in: col(c.temperature_sensor),
            ultrasonic_trigger_pin_in: col(c.ultrasonic_trigger),
            ultrasonic_echo_pin_in: col(c.ultrasonic_echo),
            soil_moisture_pin_in: col(c.soil_moisture_sensor),
            light_pin: col(c.light),
            water_pin: col(c.water),
            humidifier_pin: col(c.humidifier),
            heater_pin: col(c.heater),
            light_threshold: c.thresholds.light,
            humidity_threshold_low: c.thresholds.humidity_low,
            humidity_threshold_high: c.thresholds.humidity_high,
            temperature_threshold_low: c.thresholds.temperature_low,
            temperature_threshold_high: c.thresholds.temperature_high,
            water_level_threshold_low: c.thresholds.water_level_low,
            dry_soil_threshold: c.thresholds.dry_soil,
            watered_soil_threshold: c.thresholds.watered_soil,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::reading)]
pub struct NewReading {
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::light_reading)]
pub struct NewLightReading {
    pub id: i32,
    pub light_level: f64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::temperature_reading)]
pub struct NewTemperatureReading {
    pub id: i32,
    pub temperature: f64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::humidity_reading)]
pub struct NewHumidityReading {
    pub id: i32,
    pub humidity: f64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::water_reading)]
pub struct NewWaterReading {
    pub id: i32,
    pub water_level: f64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::soil_moisture_reading)]
pub struct NewSoilMoistureReading {
    pub id: i32,
    pub soil_moisture: f64,
}

/// One sensor value destined for its typed reading table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TypedReading {
    Light(f64),
    Temperature(f64),
    Humidity(f64),
    Water(f64),
    SoilMoisture(f64),
}

impl TypedReading {
    pub fn new(kind: SensorKind, value: f64) -> Self {
        match kind {
            SensorKind::Light => TypedReading::Light(value),
            SensorKind::Temperature => TypedReading::Temperature(value),
            SensorKind::Humidity => TypedReading::Humidity(value),
            SensorKind::WaterLevel => TypedReading::Water(value),
            SensorKind::SoilMoisture => TypedReading::SoilMoisture(value),
        }
    }

    pub fn kind(self) -> SensorKind {
        match self {
            TypedReading::Light(_) => SensorKind::Light,
            TypedReading::Temperature(_) => SensorKind::Temperature,
            TypedReading::Humidity(_) => SensorKind::Humidity,
            TypedReading::Water(_) => SensorKind::WaterLevel,
            TypedReading::SoilMoisture(_) => SensorKind::SoilMoisture,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::audit_log)]
pub struct NewLogEntry {
    pub timestamp: NaiveDateTime,
    pub event_code: i32,
}

/// A reading joined with whichever typed values exist for it.
#[derive(Debug, Clone, Queryable, Serialize)]
pub struct ReadingRow {
    pub id: i32,
    pub timestamp: NaiveDateTime,
    pub light_level: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub water_level: Option<f64>,
    pub soil_moisture: Option<f64>,
}

#[derive(Debug, Clone, Queryable, Serialize)]
pub struct LogRow {
    pub id: i32,
    pub timestamp: NaiveDateTime,
    pub event_code: i32,
    pub description: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = schema::event_codes)]
pub struct EventCodeRow {
    pub code: i32,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn pages(&self) -> i64 {
        if self.per_page <= 0 {
            return 0;
        }
        self.total / self.per_page + i64::from(self.total % self.per_page != 0)
    }
}
