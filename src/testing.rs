//! Fakes shared by unit tests: a manual clock, a scriptable GPIO backend,
//! audit sinks and an in-memory database.

use crate::db::store;
use crate::devices::actuator::AuditLog;
use crate::devices::context::{DeviceContext, OneWireSettings};
use crate::hal::{AnalogInput, Clock, GpioBackend, HalError, HumitureProbe, InputLine, Level, OutputLine};
use crate::models::device::EventCode;
use diesel::SqliteConnection;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Every `now()` call advances time by one tick so busy-wait loops terminate.
#[derive(Clone)]
pub struct FakeClock {
    base: Instant,
    elapsed: Rc<Cell<Duration>>,
    tick: Duration,
    sleeps: Rc<RefCell<Vec<Duration>>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            elapsed: Rc::new(Cell::new(Duration::ZERO)),
            tick: Duration::from_micros(10),
            sleeps: Rc::default(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed.get()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        let now = self.base + self.elapsed.get();
        self.elapsed.set(self.elapsed.get() + self.tick);
        now
    }

    fn sleep(&self, duration: Duration) {
        self.elapsed.set(self.elapsed.get() + duration);
        self.sleeps.borrow_mut().push(duration);
    }
}

type EchoScript = Rc<dyn Fn(Duration) -> Level>;

#[derive(Default)]
struct Lines {
    writes: HashMap<u8, Vec<Level>>,
    parked: HashMap<u8, Vec<Level>>,
    voltages: HashMap<u8, VecDeque<f64>>,
    humidity: VecDeque<Result<f64, HalError>>,
    echo: HashMap<u8, (FakeClock, EchoScript)>,
    humiture_unavailable: bool,
}

/// Records output writes and replays scripted inputs. Clones share state.
#[derive(Clone, Default)]
pub struct FakeBackend {
    lines: Rc<RefCell<Lines>>,
}

impl FakeBackend {
    /// Every level written to `pin`, starting with the level it was claimed at.
    pub fn writes(&self, pin: u8) -> Vec<Level> {
        self.lines.borrow().writes.get(&pin).cloned().unwrap_or_default()
    }

    pub fn parked(&self, pin: u8) -> Option<Level> {
        self.lines.borrow().parked.get(&pin).and_then(|p| p.last().copied())
    }

    pub fn park_count(&self, pin: u8) -> usize {
        self.lines.borrow().parked.get(&pin).map_or(0, Vec::len)
    }

    pub fn set_voltages(&self, channel: u8, samples: &[f64]) {
        self.lines
            .borrow_mut()
            .voltages
            .entry(channel)
            .or_default()
            .extend(samples.iter().copied());
    }

    pub fn push_humidity(&self, result: Result<f64, HalError>) {
        self.lines.borrow_mut().humidity.push_back(result);
    }

    pub fn pending_humidity(&self) -> usize {
        self.lines.borrow().humidity.len()
    }

    pub fn fail_humiture(&self) {
        self.lines.borrow_mut().humiture_unavailable = true;
    }

    /// Drive input `pin` from a function of time elapsed on `clock`.
    pub fn set_echo(&self, pin: u8, clock: FakeClock, script: impl Fn(Duration) -> Level + 'static) {
        self.lines.borrow_mut().echo.insert(pin, (clock, Rc::new(script)));
    }
}

impl GpioBackend for FakeBackend {
    fn output(&self, pin: u8, initial: Level) -> Result<Box<dyn OutputLine>, HalError> {
        self.lines.borrow_mut().writes.entry(pin).or_default().push(initial);
        Ok(Box::new(FakeOutput {
            pin,
            lines: Rc::clone(&self.lines),
        }))
    }

    fn input(&self, pin: u8) -> Result<Box<dyn InputLine>, HalError> {
        let script = self.lines.borrow().echo.get(&pin).cloned();
        Ok(Box::new(FakeInput { script }))
    }

    fn analog(&self, channel: u8) -> Result<Box<dyn AnalogInput>, HalError> {
        Ok(Box::new(FakeAdc {
            channel,
            lines: Rc::clone(&self.lines),
        }))
    }

    fn humiture(&self, pin: u8) -> Result<Box<dyn HumitureProbe>, HalError> {
        if self.lines.borrow().humiture_unavailable {
            return Err(HalError::Gpio {
                pin,
                message: "busy".to_string(),
            });
        }
        Ok(Box::new(FakeProbe {
            lines: Rc::clone(&self.lines),
        }))
    }
}

struct FakeOutput {
    pin: u8,
    lines: Rc<RefCell<Lines>>,
}

impl OutputLine for FakeOutput {
    fn write(&mut self, level: Level) -> Result<(), HalError> {
        self.lines.borrow_mut().writes.entry(self.pin).or_default().push(level);
        Ok(())
    }

    fn park(&mut self, level: Level) -> Result<(), HalError> {
        self.lines.borrow_mut().parked.entry(self.pin).or_default().push(level);
        Ok(())
    }
}

struct FakeInput {
    script: Option<(FakeClock, EchoScript)>,
}

impl InputLine for FakeInput {
    fn read(&mut self) -> Result<Level, HalError> {
        Ok(match &self.script {
            Some((clock, script)) => script(clock.elapsed()),
            None => Level::Low,
        })
    }
}

struct FakeAdc {
    channel: u8,
    lines: Rc<RefCell<Lines>>,
}

impl AnalogInput for FakeAdc {
    fn voltage(&mut self) -> Result<f64, HalError> {
        self.lines
            .borrow_mut()
            .voltages
            .get_mut(&self.channel)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| HalError::Spi(format!("no sample scripted for channel {}", self.channel)))
    }
}

struct FakeProbe {
    lines: Rc<RefCell<Lines>>,
}

impl HumitureProbe for FakeProbe {
    fn humidity(&mut self) -> Result<f64, HalError> {
        self.lines
            .borrow_mut()
            .humidity
            .pop_front()
            .unwrap_or_else(|| Err(HalError::Probe("no reading scripted".to_string())))
    }
}

impl AuditLog for Vec<EventCode> {
    fn record(&mut self, code: EventCode) -> Result<(), String> {
        self.push(code);
        Ok(())
    }
}

pub struct FailingAudit;

impl AuditLog for FailingAudit {
    fn record(&mut self, _code: EventCode) -> Result<(), String> {
        Err("database is locked".to_string())
    }
}

pub fn context(simulation: bool, backend: FakeBackend) -> DeviceContext {
    context_with_clock(simulation, backend, FakeClock::new())
}

pub fn context_with_clock(simulation: bool, backend: FakeBackend, clock: FakeClock) -> DeviceContext {
    DeviceContext {
        simulation,
        backend: Box::new(backend),
        clock: Rc::new(clock),
        onewire: OneWireSettings {
            devices_dir: PathBuf::from("/nonexistent/w1"),
            sensor_id: None,
        },
        relay_active_low: false,
        adc_vref: 3.3,
        adc_cs_pin: 5,
    }
}

/// Fresh in-memory database with every migration applied.
pub fn test_db() -> SqliteConnection {
    store::connect(":memory:").unwrap()
}
