//! Hardware abstraction layer.
//!
//! Devices never talk to GPIO, SPI or the DHT driver directly. They ask a
//! [`GpioBackend`] for line handles at construction time and keep those
//! handles for their whole life. Two backends exist:
//!
//! - `rpi::RpiBackend` (feature `hardware`): real lines through `rppal`.
//! - [`NoHardware`]: every request fails with [`HalError::Unavailable`]. Used
//!   when the crate is built without the `hardware` feature; simulation mode
//!   never asks the backend for anything, so it works with either.

pub mod driver;
#[cfg(feature = "hardware")]
pub mod rpi;

use core::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn from_bool(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HalError {
    /// No hardware backend was compiled in.
    Unavailable,
    Gpio { pin: u8, message: String },
    Spi(String),
    /// The humiture driver reported a (usually transient) read failure.
    Probe(String),
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HalError::Unavailable => {
                write!(f, "hardware access unavailable (built without the `hardware` feature)")
            }
            HalError::Gpio { pin, message } => write!(f, "gpio {}: {}", pin, message),
            HalError::Spi(e) => write!(f, "spi: {}", e),
            HalError::Probe(e) => write!(f, "probe: {}", e),
        }
    }
}

impl std::error::Error for HalError {}

/// A digital output line owned by exactly one device.
pub trait OutputLine {
    fn write(&mut self, level: Level) -> Result<(), HalError>;

    /// Drive the line to `level` and leave it driven after the handle is gone.
    /// Must only affect this line.
    fn park(&mut self, level: Level) -> Result<(), HalError>;
}

pub trait InputLine {
    fn read(&mut self) -> Result<Level, HalError>;
}

/// One channel of an analog-to-digital converter.
pub trait AnalogInput {
    /// Sampled voltage in volts.
    fn voltage(&mut self) -> Result<f64, HalError>;
}

/// A one-wire-style temperature/humidity probe (DHT11).
pub trait HumitureProbe {
    /// Relative humidity in percent.
    fn humidity(&mut self) -> Result<f64, HalError>;
}

pub trait GpioBackend {
    fn output(&self, pin: u8, initial: Level) -> Result<Box<dyn OutputLine>, HalError>;
    fn input(&self, pin: u8) -> Result<Box<dyn InputLine>, HalError>;
    fn analog(&self, channel: u8) -> Result<Box<dyn AnalogInput>, HalError>;
    fn humiture(&self, pin: u8) -> Result<Box<dyn HumitureProbe>, HalError>;
}

pub struct NoHardware;

impl GpioBackend for NoHardware {
    fn output(&self, _pin: u8, _initial: Level) -> Result<Box<dyn OutputLine>, HalError> {
        Err(HalError::Unavailable)
    }

    fn input(&self, _pin: u8) -> Result<Box<dyn InputLine>, HalError> {
        Err(HalError::Unavailable)
    }

    fn analog(&self, _channel: u8) -> Result<Box<dyn AnalogInput>, HalError> {
        Err(HalError::Unavailable)
    }

    fn humiture(&self, _pin: u8) -> Result<Box<dyn HumitureProbe>, HalError> {
        Err(HalError::Unavailable)
    }
}

/// The backend this binary was built with.
pub fn default_backend(adc_vref: f64, adc_cs_pin: u8) -> Result<Box<dyn GpioBackend>, HalError> {
    #[cfg(feature = "hardware")]
    {
        Ok(Box::new(rpi::RpiBackend::new(adc_vref, adc_cs_pin)?))
    }
    #[cfg(not(feature = "hardware"))]
    {
        let _ = (adc_vref, adc_cs_pin);
        Ok(Box::new(NoHardware))
    }
}

/// Time source for dwell periods and busy-wait deadlines.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Whether a device drives real lines or only pretends to.
pub enum Wiring<T> {
    Simulated,
    Physical(T),
}
