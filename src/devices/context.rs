use crate::config::Config;
use crate::hal::{self, Clock, GpioBackend, HalError, NoHardware, SystemClock};
use std::path::PathBuf;
use std::rc::Rc;

/// Where the one-wire temperature probe lives in sysfs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneWireSettings {
    pub devices_dir: PathBuf,
    pub sensor_id: Option<String>,
}

/// Everything a device needs besides its pins. Built once at startup and
/// shared by every Device Manager created afterwards.
pub struct DeviceContext {
    pub simulation: bool,
    pub backend: Box<dyn GpioBackend>,
    pub clock: Rc<dyn Clock>,
    pub onewire: OneWireSettings,
    pub relay_active_low: bool,
    pub adc_vref: f64,
    /// GPIO claimed as the ADC chip select whenever an analog sensor is configured.
    pub adc_cs_pin: u8,
}

impl DeviceContext {
    pub fn from_config(cfg: &Config) -> Result<Self, HalError> {
        // simulated devices never ask the backend for a line
        let backend: Box<dyn GpioBackend> = if cfg.simulation {
            Box::new(NoHardware)
        } else {
            hal::default_backend(cfg.adc_vref, cfg.adc_cs_pin)?
        };
        Ok(Self {
            simulation: cfg.simulation,
            backend,
            clock: Rc::new(SystemClock),
            onewire: OneWireSettings {
                devices_dir: cfg.w1_devices_dir.clone(),
                sensor_id: cfg.onewire_sensor_id.clone(),
            },
            relay_active_low: cfg.relay_active_low,
            adc_vref: cfg.adc_vref,
            adc_cs_pin: cfg.adc_cs_pin,
        })
    }
}
