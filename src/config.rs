//! Process configuration from the environment, plus the `.env` loader.

use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "growlab.db";
pub const DEFAULT_COLLECTION_SECS: u64 = 1;
pub const DEFAULT_W1_DEVICES_DIR: &str = "/sys/bus/w1/devices";
pub const DEFAULT_ADC_VREF: f64 = 3.3;
pub const DEFAULT_ADC_CS_PIN: u8 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// SQLite database path.
    pub database_url: String,
    /// Simulate every device instead of touching hardware.
    pub simulation: bool,
    pub collection_interval: Duration,
    pub w1_devices_dir: PathBuf,
    /// One-wire temperature probe id (`28-...`). Discovered at read time when unset.
    pub onewire_sensor_id: Option<String>,
    /// ON drives relay lines low instead of high.
    pub relay_active_low: bool,
    pub adc_vref: f64,
    /// BCM GPIO wired to the MCP3008 chip select.
    pub adc_cs_pin: u8,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let non_empty = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = non_empty("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let simulation = match non_empty("SIMULATION_MODE").or_else(|| non_empty("DEBUG_MODE")) {
            Some(v) => parse_flag(&v),
            None => false,
        };

        let collection_secs = match non_empty("COLLECTION_INTERVAL_SECS") {
            Some(v) => v
                .parse::<u64>()
                .ok()
                .filter(|s| *s > 0)
                .ok_or_else(|| format!("COLLECTION_INTERVAL_SECS must be a positive integer, got {:?}", v))?,
            None => DEFAULT_COLLECTION_SECS,
        };

        let w1_devices_dir = PathBuf::from(non_empty("W1_DEVICES_DIR").unwrap_or_else(|| DEFAULT_W1_DEVICES_DIR.to_string()));

        let relay_active_low = non_empty("RELAY_ACTIVE_LOW").map(|v| parse_flag(&v)).unwrap_or(false);

        let adc_vref = match non_empty("ADC_VREF") {
            Some(v) => v
                .parse::<f64>()
                .ok()
                .filter(|x| x.is_finite() && *x > 0.0)
                .ok_or_else(|| format!("ADC_VREF must be a positive number of volts, got {:?}", v))?,
            None => DEFAULT_ADC_VREF,
        };

        let adc_cs_pin = match non_empty("ADC_CS_PIN") {
            Some(v) => v
                .parse::<u8>()
                .map_err(|_| format!("ADC_CS_PIN must be a GPIO number (0-255), got {:?}", v))?,
            None => DEFAULT_ADC_CS_PIN,
        };

        Ok(Config {
            database_url,
            simulation,
            collection_interval: Duration::from_secs(collection_secs),
            w1_devices_dir,
            onewire_sensor_id: non_empty("ONEWIRE_SENSOR_ID"),
            relay_active_low,
            adc_vref,
            adc_cs_pin,
        })
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "t")
}

/// Load `KEY=VALUE` lines into the process environment.
/// Variables already set in the environment are left alone.
pub fn load_env_file(path: &Path) -> Result<(), String> {
    let contents = std::fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    for (index, line) in contents.lines().enumerate() {
        let Some((key, value)) = parse_env_line(line).map_err(|e| format!("{}:{}: {}", path.display(), index + 1, e))?
        else {
            continue;
        };
        if std::env::var_os(&key).is_none() {
            // SAFETY: called from main before any other thread is spawned.
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }
    Ok(())
}

fn parse_env_line(line: &str) -> Result<Option<(String, String)>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);

    let (key, raw) = line.split_once('=').ok_or_else(|| "missing '=' in assignment".to_string())?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return Err(format!("invalid variable name {:?}", key));
    }

    let raw = raw.trim();
    let value = match raw.chars().next() {
        Some(quote @ ('"' | '\'')) => {
            let body = &raw[1..];
            let end = body.find(quote).ok_or_else(|| format!("unterminated {} quote", quote))?;
            let rest = body[end + 1..].trim();
            if !rest.is_empty() && !rest.starts_with('#') {
                return Err("unexpected characters after closing quote".to_string());
            }
            body[..end].to_string()
        }
        _ => raw.split('#').next().unwrap_or_default().trim_end().to_string(),
    };
    Ok(Some((key.to_string(), value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, String> {
        let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let cfg = config_from(&[]).unwrap();
        assert_eq!(cfg.database_url, "growlab.db");
        assert!(!cfg.simulation);
        assert_eq!(cfg.collection_interval, Duration::from_secs(1));
        assert_eq!(cfg.w1_devices_dir, PathBuf::from("/sys/bus/w1/devices"));
        assert_eq!(cfg.onewire_sensor_id, None);
        assert!(!cfg.relay_active_low);
        assert_eq!(cfg.adc_vref, 3.3);
        assert_eq!(cfg.adc_cs_pin, DEFAULT_ADC_CS_PIN);
    }

    #[test]
    fn simulation_flag_falls_back_to_debug_mode() {
        assert!(config_from(&[("DEBUG_MODE", "T")]).unwrap().simulation);
        assert!(config_from(&[("SIMULATION_MODE", "1")]).unwrap().simulation);
        assert!(!config_from(&[("SIMULATION_MODE", "no"), ("DEBUG_MODE", "true")]).unwrap().simulation);
    }

    #[test]
    fn rejects_bad_numbers() {
        assert!(config_from(&[("COLLECTION_INTERVAL_SECS", "0")]).is_err());
        assert!(config_from(&[("COLLECTION_INTERVAL_SECS", "soon")]).is_err());
        assert!(config_from(&[("ADC_VREF", "-5")]).is_err());
        assert_eq!(config_from(&[("ADC_VREF", "5.0")]).unwrap().adc_vref, 5.0);
        assert_eq!(config_from(&[("ADC_CS_PIN", "8")]).unwrap().adc_cs_pin, 8);
        assert!(config_from(&[("ADC_CS_PIN", "gpio5")]).is_err());
    }

    #[test]
    fn parses_env_lines() {
        assert_eq!(parse_env_line("# comment").unwrap(), None);
        assert_eq!(parse_env_line("   ").unwrap(), None);
        assert_eq!(
            parse_env_line("export RUST_LOG=debug # noisy").unwrap(),
            Some(("RUST_LOG".to_string(), "debug".to_string()))
        );
        assert_eq!(
            parse_env_line("DATABASE_URL=\"/var/lib/growlab/db.sqlite\"").unwrap(),
            Some(("DATABASE_URL".to_string(), "/var/lib/growlab/db.sqlite".to_string()))
        );
        assert_eq!(
            parse_env_line("ONEWIRE_SENSOR_ID='28-00000a1b2c3d' # probe").unwrap(),
            Some(("ONEWIRE_SENSOR_ID".to_string(), "28-00000a1b2c3d".to_string()))
        );
        assert!(parse_env_line("NO_EQUALS").is_err());
        assert!(parse_env_line("BAD KEY=1").is_err());
        assert!(parse_env_line("OPEN=\"never closed").is_err());
    }
}
