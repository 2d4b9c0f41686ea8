use crate::hal::HalError;
use crate::models::device::SensorKind;
use core::fmt;
use log::{debug, warn};

/// Which half of an ultrasonic echo pulse never arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoPhase {
    Rise,
    Fall,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SensorError {
    Hardware(HalError),
    /// One-wire CRC line did not end in `YES`.
    Checksum,
    InvalidData(String),
    Io(String),
    Timeout(EchoPhase),
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorError::Hardware(e) => write!(f, "hardware error: {}", e),
            SensorError::Checksum => write!(f, "checksum marker missing"),
            SensorError::InvalidData(s) => write!(f, "invalid data: {}", s),
            SensorError::Io(s) => write!(f, "io error: {}", s),
            SensorError::Timeout(EchoPhase::Rise) => write!(f, "timeout waiting for echo to go high"),
            SensorError::Timeout(EchoPhase::Fall) => write!(f, "timeout waiting for echo to go low"),
        }
    }
}

impl std::error::Error for SensorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SensorError::Hardware(e) => Some(e),
            _ => None,
        }
    }
}

impl From<HalError> for SensorError {
    fn from(value: HalError) -> Self {
        SensorError::Hardware(value)
    }
}

/// Uniform read contract over every sensing device.
///
/// Implementors only provide [`Sensor::measure`]; callers that just want a
/// value use [`Sensor::read`], which never fails: any error is logged and
/// turned into `None`.
pub trait Sensor {
    fn kind(&self) -> SensorKind;

    fn measure(&mut self) -> Result<f64, SensorError>;

    fn read(&mut self) -> Option<f64> {
        let kind = self.kind();
        match self.measure() {
            Ok(value) => {
                debug!("{}: {}{}", kind.name(), value, kind.unit());
                Some(value)
            }
            Err(e) => {
                warn!("{}: read failed: {}", kind.name(), e);
                None
            }
        }
    }

    /// Put any owned output lines into a safe idle state.
    fn release(&mut self) {}
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    impl Sensor for Broken {
        fn kind(&self) -> SensorKind {
            SensorKind::Light
        }

        fn measure(&mut self) -> Result<f64, SensorError> {
            Err(SensorError::Hardware(HalError::Spi("bus fault".to_string())))
        }
    }

    #[test]
    fn read_swallows_errors() {
        assert_eq!(Broken.read(), None);
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_to(17.154_9, 2), 17.15);
        assert_eq!(round_to(64.95, 1), 65.0);
        assert_eq!(round_to(-3.25, 1), -3.3);
    }
}
