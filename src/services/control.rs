//! Command, test and activation requests against the device manager.
//!
//! Requests and responses are plain serde types so they can travel as JSON;
//! every handler answers with a [`ControlResponse`] rather than an error.

use crate::devices::actuator::{AuditLog, UsageStats};
use crate::devices::context::DeviceContext;
use crate::devices::manager::{DeviceManager, TestOutcome};
use crate::models::device::{ActuatorKind, Device};
use crate::models::pins::PinConfig;
use log::info;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ControlCommand {
    pub device: String,
    /// `true` switches on. Also accepts `"on"`/`"off"` and `1`/`0`.
    #[serde(deserialize_with = "switch_state")]
    pub state: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SwitchState {
    Flag(bool),
    Number(i64),
    Word(String),
}

fn switch_state<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match SwitchState::deserialize(deserializer)? {
        SwitchState::Flag(on) => Ok(on),
        SwitchState::Number(n) => Ok(n != 0),
        SwitchState::Word(word) => match word.trim().to_ascii_lowercase().as_str() {
            "on" | "true" | "1" => Ok(true),
            "off" | "false" | "0" => Ok(false),
            other => Err(de::Error::custom(format!("invalid state {:?}; expected on or off", other))),
        },
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TestRequest {
    pub device: String,
    pub pin: Option<u8>,
    pub pins: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ActivateCommand {
    pub device: String,
    pub seconds: u64,
    pub off_seconds: Option<u64>,
    pub cycles: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ControlResponse {
    Success {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<UsageStats>,
    },
    Error {
        message: String,
    },
}

impl ControlResponse {
    fn ok(message: impl Into<String>) -> Self {
        ControlResponse::Success {
            message: message.into(),
            value: None,
            usage: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        ControlResponse::Error {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ControlResponse::Success { .. })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!(r#"{{"status":"error","message":"{}"}}"#, e))
    }
}

fn actuator_named(name: &str) -> Result<ActuatorKind, ControlResponse> {
    match name.parse::<Device>() {
        Ok(Device::Actuator(kind)) => Ok(kind),
        Ok(device) => Err(ControlResponse::error(format!("{} is not an actuator", device))),
        Err(e) => Err(ControlResponse::error(e.to_string())),
    }
}

pub fn handle_control(devices: &mut DeviceManager, audit: &mut dyn AuditLog, cmd: &ControlCommand) -> ControlResponse {
    let kind = match actuator_named(&cmd.device) {
        Ok(kind) => kind,
        Err(response) => return response,
    };
    let on = cmd.state;
    if devices.actuator(kind).is_none() {
        return ControlResponse::ok(format!("{} is not configured; nothing to do", kind.name()));
    }

    let result = if on {
        devices.turn_on(kind, audit)
    } else {
        devices.turn_off(kind, audit)
    };
    match result {
        Ok(()) => ControlResponse::Success {
            message: format!("{} turned {}", kind.name(), if on { "on" } else { "off" }),
            value: None,
            usage: devices.actuator(kind).map(|a| a.usage_stats()),
        },
        Err(e) => ControlResponse::error(e.to_string()),
    }
}

/// Test a device. When the request carries pins, the test runs on a
/// separate manager wired only for that device.
pub fn handle_test(
    devices: &mut DeviceManager,
    ctx: &DeviceContext,
    audit: &mut dyn AuditLog,
    req: &TestRequest,
) -> ControlResponse {
    let device = match req.device.parse::<Device>() {
        Ok(device) => device,
        Err(e) => return ControlResponse::error(e.to_string()),
    };

    let pins: Vec<u8> = req.pin.into_iter().chain(req.pins.iter().flatten().copied()).collect();
    if pins.is_empty() {
        return run_test(devices, device, audit);
    }

    let wiring = match PinConfig::only(device, &pins) {
        Ok(wiring) => wiring,
        Err(e) => return ControlResponse::error(e),
    };
    info!("Testing {} on pins {:?}", device, pins);
    match DeviceManager::new(&wiring, ctx) {
        Ok(mut scratch) => run_test(&mut scratch, device, audit),
        Err(e) => ControlResponse::error(e.to_string()),
    }
}

fn run_test(devices: &mut DeviceManager, device: Device, audit: &mut dyn AuditLog) -> ControlResponse {
    // sensors go through probe so the failure cause reaches the caller
    if let Device::Sensor(kind) = device {
        return match devices.probe(kind) {
            Ok(value) => ControlResponse::Success {
                message: format!("{} read {}", device, value),
                value: Some(value),
                usage: None,
            },
            Err(e) => ControlResponse::error(e.to_string()),
        };
    }

    match devices.test(device, audit) {
        Ok(TestOutcome::NotConfigured) => ControlResponse::error(format!("{} is not configured", device)),
        Ok(TestOutcome::Cycled { cycles }) => ControlResponse::ok(format!("{} cycled on/off {} times", device, cycles)),
        Ok(TestOutcome::Sensed(value)) => ControlResponse::Success {
            message: format!("{} sampled", device),
            value,
            usage: None,
        },
        Err(e) => ControlResponse::error(e.to_string()),
    }
}

/// Timed activation; pulsed when `cycles` is given.
pub fn handle_activate(devices: &mut DeviceManager, audit: &mut dyn AuditLog, cmd: &ActivateCommand) -> ControlResponse {
    let kind = match actuator_named(&cmd.device) {
        Ok(kind) => kind,
        Err(response) => return response,
    };
    if devices.actuator(kind).is_none() {
        return ControlResponse::ok(format!("{} is not configured; nothing to do", kind.name()));
    }

    let result = match cmd.cycles {
        Some(cycles) => {
            let off_seconds = cmd.off_seconds.unwrap_or(cmd.seconds);
            devices.pulse_activate(kind, cmd.seconds, off_seconds, cycles, audit)
        }
        None => devices.activate_for_duration(kind, cmd.seconds, audit),
    };
    match result {
        Ok(()) => ControlResponse::Success {
            message: format!("{} activated", kind.name()),
            value: None,
            usage: devices.actuator(kind).map(|a| a.usage_stats()),
        },
        Err(e) => ControlResponse::error(e.to_string()),
    }
}
