//! Relay-controlled actuators (light, atomizer, heater, water pump).
//!
//! Every actuator is an on/off relay on one GPIO line. State changes always
//! append an audit entry, even when the state does not change, so the audit
//! trail mirrors the commands that were issued. Runtime is only credited by
//! timed activations, after the relay has been switched off again.

use super::context::DeviceContext;
use crate::hal::{Clock, HalError, Level, OutputLine, Wiring};
use crate::models::device::{ActuatorKind, EventCode};
use core::fmt;
use log::{debug, info, warn};
use serde::Serialize;
use std::rc::Rc;
use std::time::Duration;

/// Sink for actuator audit events.
pub trait AuditLog {
    fn record(&mut self, code: EventCode) -> Result<(), String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActuatorState {
    Off,
    On,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageStats {
    pub state: ActuatorState,
    /// Cumulative seconds of timed activation.
    pub runtime: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActuatorError {
    Pin { kind: ActuatorKind, source: HalError },
    Audit { kind: ActuatorKind, message: String },
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActuatorError::Pin { kind, source } => write!(f, "{}: {}", kind.name(), source),
            ActuatorError::Audit { kind, message } => {
                write!(f, "{}: failed to record audit event: {}", kind.name(), message)
            }
        }
    }
}

impl std::error::Error for ActuatorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ActuatorError::Pin { source, .. } => Some(source),
            ActuatorError::Audit { .. } => None,
        }
    }
}

pub struct RelayComponent {
    kind: ActuatorKind,
    pin: u8,
    active_low: bool,
    wiring: Wiring<Box<dyn OutputLine>>,
    state: ActuatorState,
    runtime: u64,
    released: bool,
    clock: Rc<dyn Clock>,
}

impl RelayComponent {
    /// Claims `pin` and drives it to the OFF level straight away.
    pub fn new(kind: ActuatorKind, pin: u8, ctx: &DeviceContext) -> Result<Self, HalError> {
        let off = level_for(ActuatorState::Off, ctx.relay_active_low);
        let wiring = if ctx.simulation {
            Wiring::Simulated
        } else {
            Wiring::Physical(ctx.backend.output(pin, off)?)
        };
        Ok(Self {
            kind,
            pin,
            active_low: ctx.relay_active_low,
            wiring,
            state: ActuatorState::Off,
            runtime: 0,
            released: false,
            clock: Rc::clone(&ctx.clock),
        })
    }

    pub fn is_on(&self) -> bool {
        self.state == ActuatorState::On
    }

    pub fn runtime(&self) -> u64 {
        self.runtime
    }

    pub fn usage_stats(&self) -> UsageStats {
        UsageStats {
            state: self.state,
            runtime: self.runtime,
        }
    }

    pub fn turn_on(&mut self, audit: &mut dyn AuditLog) -> Result<(), ActuatorError> {
        self.set_state(ActuatorState::On, audit)
    }

    pub fn turn_off(&mut self, audit: &mut dyn AuditLog) -> Result<(), ActuatorError> {
        self.set_state(ActuatorState::Off, audit)
    }

    /// Switch on, hold for `seconds`, switch off, then credit the runtime.
    /// Blocks the caller for the whole dwell.
    pub fn activate_for_duration(&mut self, seconds: u64, audit: &mut dyn AuditLog) -> Result<(), ActuatorError> {
        info!("{} on for {}s", self.kind.name(), seconds);
        if let Err(e) = self.turn_on(audit) {
            if self.is_on()
                && let Err(cleanup) = self.turn_off(audit)
            {
                warn!(
                    "{} may still be on: turning it off after a failed activation also failed: {}",
                    self.kind.name(),
                    cleanup
                );
            }
            return Err(e);
        }
        self.clock.sleep(Duration::from_secs(seconds));
        self.turn_off(audit)?;
        self.runtime += seconds;
        Ok(())
    }

    pub fn pulse_activate(
        &mut self,
        on_seconds: u64,
        off_seconds: u64,
        cycles: u32,
        audit: &mut dyn AuditLog,
    ) -> Result<(), ActuatorError> {
        info!(
            "{} pulsing {}x ({}s on, {}s off)",
            self.kind.name(),
            cycles,
            on_seconds,
            off_seconds
        );
        for _ in 0..cycles {
            self.activate_for_duration(on_seconds, audit)?;
            self.clock.sleep(Duration::from_secs(off_seconds));
        }
        Ok(())
    }

    /// Force the line to its OFF level and leave it driven. Idempotent; no audit entry.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.state = ActuatorState::Off;
        if let Wiring::Physical(line) = &mut self.wiring {
            let off = level_for(ActuatorState::Off, self.active_low);
            if let Err(e) = line.park(off) {
                warn!("{}: failed to park gpio {}: {}", self.kind.name(), self.pin, e);
            }
        }
    }

    fn set_state(&mut self, state: ActuatorState, audit: &mut dyn AuditLog) -> Result<(), ActuatorError> {
        let kind = self.kind;
        if let Wiring::Physical(line) = &mut self.wiring {
            line.write(level_for(state, self.active_low))
                .map_err(|source| ActuatorError::Pin { kind, source })?;
        }
        self.state = state;
        self.released = false;
        debug!("{} (gpio {}) -> {:?}", kind.name(), self.pin, state);

        let code = match state {
            ActuatorState::On => kind.on_code(),
            ActuatorState::Off => kind.off_code(),
        };
        audit
            .record(code)
            .map_err(|message| ActuatorError::Audit { kind, message })
    }
}

impl Drop for RelayComponent {
    fn drop(&mut self) {
        self.release();
    }
}

fn level_for(state: ActuatorState, active_low: bool) -> Level {
    let on = state == ActuatorState::On;
    Level::from_bool(on != active_low)
}
