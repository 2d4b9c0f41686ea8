//! DS18B20 one-wire temperature probe read through sysfs.

use super::context::{DeviceContext, OneWireSettings};
use super::sensor::{Sensor, SensorError};
use crate::hal::Wiring;
use crate::models::device::SensorKind;
use std::fs;
use std::path::PathBuf;

pub const SIMULATED_FAHRENHEIT: f64 = 72.0;
const FAMILY_PREFIX: &str = "28-";

/// The data line is fixed by the kernel's one-wire overlay; the configured
/// pin only enables the sensor.
pub struct TemperatureSensor {
    wiring: Wiring<OneWireSettings>,
}

impl TemperatureSensor {
    pub fn new(ctx: &DeviceContext) -> Self {
        let wiring = if ctx.simulation {
            Wiring::Simulated
        } else {
            Wiring::Physical(ctx.onewire.clone())
        };
        Self { wiring }
    }
}

impl Sensor for TemperatureSensor {
    fn kind(&self) -> SensorKind {
        SensorKind::Temperature
    }

    fn measure(&mut self) -> Result<f64, SensorError> {
        let settings = match &self.wiring {
            Wiring::Simulated => return Ok(SIMULATED_FAHRENHEIT),
            Wiring::Physical(settings) => settings,
        };
        let path = device_file(settings)?;
        let contents =
            fs::read_to_string(&path).map_err(|e| SensorError::Io(format!("{}: {}", path.display(), e)))?;
        parse_w1_slave(&contents)
    }
}

fn device_file(settings: &OneWireSettings) -> Result<PathBuf, SensorError> {
    if let Some(id) = &settings.sensor_id {
        return Ok(settings.devices_dir.join(id).join("w1_slave"));
    }

    let entries = fs::read_dir(&settings.devices_dir)
        .map_err(|e| SensorError::Io(format!("{}: {}", settings.devices_dir.display(), e)))?;
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(FAMILY_PREFIX))
        .map(|entry| entry.path())
        .collect();
    candidates.sort();
    candidates
        .into_iter()
        .next()
        .map(|dir| dir.join("w1_slave"))
        .ok_or_else(|| {
            SensorError::Io(format!(
                "no {}* device under {}",
                FAMILY_PREFIX,
                settings.devices_dir.display()
            ))
        })
}

/// Parse the two-line `w1_slave` format into degrees Fahrenheit.
pub fn parse_w1_slave(contents: &str) -> Result<f64, SensorError> {
    let mut lines = contents.lines();
    let crc_line = lines.next().unwrap_or_default();
    if !crc_line.trim_end().ends_with("YES") {
        return Err(SensorError::Checksum);
    }

    let data_line = lines.next().unwrap_or_default();
    let (_, raw) = data_line
        .split_once("t=")
        .ok_or_else(|| SensorError::InvalidData("missing t= token".to_string()))?;
    let millidegrees: f64 = raw
        .trim()
        .parse()
        .map_err(|_| SensorError::InvalidData(format!("unparseable temperature {:?}", raw.trim())))?;

    let celsius = millidegrees / 1000.0;
    Ok(celsius * 9.0 / 5.0 + 32.0)
}
