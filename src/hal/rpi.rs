//! Raspberry Pi backend built on `rppal`.
//!
//! - GPIO lines: one `rppal` pin handle per device line.
//! - Analog inputs: one MCP3008 on SPI0, shared by every channel. Its chip
//!   select is a plain GPIO driven by hand, so the SPI0 hardware CE0 line is
//!   not connected to it.
//! - DHT11: read through python's `adafruit_dht` in a subprocess.

use super::driver;
use super::{AnalogInput, GpioBackend, HalError, HumitureProbe, InputLine, Level, OutputLine};
use rppal::gpio::{self, Gpio, InputPin, OutputPin};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
use std::cell::RefCell;
use std::process::Command;
use std::rc::Rc;
use std::time::Duration;

const MCP3008_CLOCK_HZ: u32 = 1_350_000;
const MCP3008_MAX_RAW: f64 = 1023.0;
/// A DHT11 read takes a couple of seconds at most; anything longer is a hung driver.
const DHT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RpiBackend {
    gpio: Gpio,
    adc_vref: f64,
    adc_cs_pin: u8,
    /// Opened on the first analog request and kept across device rebuilds.
    adc: RefCell<Option<Rc<RefCell<Mcp3008>>>>,
}

impl RpiBackend {
    pub fn new(adc_vref: f64, adc_cs_pin: u8) -> Result<Self, HalError> {
        let gpio = Gpio::new().map_err(|e| HalError::Gpio {
            pin: 0,
            message: format!("gpio init failed: {}", e),
        })?;
        log::info!(
            "Using rppal GPIO backend (adc vref {:.2} V, chip select gpio {})",
            adc_vref,
            adc_cs_pin
        );
        Ok(Self {
            gpio,
            adc_vref,
            adc_cs_pin,
            adc: RefCell::new(None),
        })
    }

    fn pin(&self, pin: u8) -> Result<gpio::Pin, HalError> {
        self.gpio.get(pin).map_err(|e| gpio_err(pin, e))
    }

    fn adc(&self) -> Result<Rc<RefCell<Mcp3008>>, HalError> {
        let mut slot = self.adc.borrow_mut();
        if let Some(adc) = slot.as_ref() {
            return Ok(Rc::clone(adc));
        }
        let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, MCP3008_CLOCK_HZ, Mode::Mode0)
            .map_err(|e| HalError::Spi(e.to_string()))?;
        let chip_select = self.pin(self.adc_cs_pin)?.into_output_high();
        let adc = Rc::new(RefCell::new(Mcp3008 { spi, chip_select }));
        *slot = Some(Rc::clone(&adc));
        Ok(adc)
    }
}

fn gpio_err(pin: u8, e: gpio::Error) -> HalError {
    HalError::Gpio {
        pin,
        message: e.to_string(),
    }
}

fn to_rppal(level: Level) -> gpio::Level {
    match level {
        Level::Low => gpio::Level::Low,
        Level::High => gpio::Level::High,
    }
}

impl GpioBackend for RpiBackend {
    fn output(&self, pin: u8, initial: Level) -> Result<Box<dyn OutputLine>, HalError> {
        let out = match initial {
            Level::Low => self.pin(pin)?.into_output_low(),
            Level::High => self.pin(pin)?.into_output_high(),
        };
        Ok(Box::new(RpiOutput { pin, out }))
    }

    fn input(&self, pin: u8) -> Result<Box<dyn InputLine>, HalError> {
        Ok(Box::new(RpiInput {
            input: self.pin(pin)?.into_input(),
        }))
    }

    fn analog(&self, channel: u8) -> Result<Box<dyn AnalogInput>, HalError> {
        Ok(Box::new(Mcp3008Channel {
            adc: self.adc()?,
            channel,
            vref: self.adc_vref,
        }))
    }

    fn humiture(&self, pin: u8) -> Result<Box<dyn HumitureProbe>, HalError> {
        Ok(Box::new(Dht11 { pin }))
    }
}

struct RpiOutput {
    pin: u8,
    out: OutputPin,
}

impl OutputLine for RpiOutput {
    fn write(&mut self, level: Level) -> Result<(), HalError> {
        self.out.write(to_rppal(level));
        Ok(())
    }

    fn park(&mut self, level: Level) -> Result<(), HalError> {
        self.out.write(to_rppal(level));
        // rppal would otherwise restore the pin's previous mode on drop and let a relay float
        self.out.set_reset_on_drop(false);
        log::debug!("gpio {} parked {:?}", self.pin, level);
        Ok(())
    }
}

struct RpiInput {
    input: InputPin,
}

impl InputLine for RpiInput {
    fn read(&mut self) -> Result<Level, HalError> {
        Ok(match self.input.read() {
            gpio::Level::Low => Level::Low,
            gpio::Level::High => Level::High,
        })
    }
}

struct Mcp3008 {
    spi: Spi,
    chip_select: OutputPin,
}

impl Mcp3008 {
    /// Raw 10-bit sample of `channel`, with the chip selected only for the transfer.
    fn sample(&mut self, channel: u8) -> Result<u16, HalError> {
        // start bit, single-ended mode + channel, padding
        let write = [0x01, (0x08 | channel) << 4, 0x00];
        let mut read = [0u8; 3];
        self.chip_select.set_low();
        let transfer = self.spi.transfer(&mut read, &write);
        self.chip_select.set_high();
        transfer.map_err(|e| HalError::Spi(e.to_string()))?;
        Ok((u16::from(read[1] & 0x03) << 8) | u16::from(read[2]))
    }
}

struct Mcp3008Channel {
    adc: Rc<RefCell<Mcp3008>>,
    channel: u8,
    vref: f64,
}

impl AnalogInput for Mcp3008Channel {
    fn voltage(&mut self) -> Result<f64, HalError> {
        let raw = self.adc.borrow_mut().sample(self.channel)?;
        Ok(f64::from(raw) * self.vref / MCP3008_MAX_RAW)
    }
}

struct Dht11 {
    pin: u8,
}

impl HumitureProbe for Dht11 {
    fn humidity(&mut self) -> Result<f64, HalError> {
        let script = format!(
            r#"
import sys, json
try:
    import adafruit_dht, board
    dht = adafruit_dht.DHT11(board.D{})
    try:
        print(json.dumps({{"h": dht.humidity}}))
    finally:
        dht.exit()
except Exception as e:
    print(str(e), file=sys.stderr)
    sys.exit(1)
"#,
            self.pin
        );

        let output = driver::output_within(Command::new("python3").args(["-c", &script]), DHT_TIMEOUT)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HalError::Probe(stderr.trim().to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let parsed: serde_json::Value = serde_json::from_str(stdout.trim())
            .map_err(|e| HalError::Probe(format!("unexpected driver output {:?}: {}", stdout.trim(), e)))?;
        parsed["h"]
            .as_f64()
            .ok_or_else(|| HalError::Probe("driver returned no humidity".to_string()))
    }
}
