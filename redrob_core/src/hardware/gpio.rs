//! GPIO capability.
//!
//! The controllers only need pin function get/set and level read/write,
//! keyed by BCM pin number. [`SimGpio`] keeps everything in memory and is
//! the default backend; [`RpiGpio`] drives the Raspberry Pi header through
//! rppal when the `gpio-hardware` feature is enabled.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::RedrobResult;

/// Pin function selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinFunction {
    Input,
    Output,
    /// Alternate function 0..=5
    Alt(u8),
}

/// Pin level access.
pub trait Gpio: Send + Sync {
    fn set_function(&self, pin: u8, function: PinFunction) -> RedrobResult<()>;
    fn get_function(&self, pin: u8) -> RedrobResult<PinFunction>;
    fn read_pin(&self, pin: u8) -> RedrobResult<bool>;
    fn write_pin(&self, pin: u8, high: bool) -> RedrobResult<()>;
}

pub type SharedGpio = Arc<dyn Gpio>;

/// Save the current function of `pins` and switch them to `function`.
/// Returns the saved functions in the same order.
pub fn claim_pins(
    gpio: &dyn Gpio,
    pins: &[u8],
    function: PinFunction,
) -> RedrobResult<Vec<(u8, PinFunction)>> {
    let mut saved = Vec::with_capacity(pins.len());
    for &pin in pins {
        saved.push((pin, gpio.get_function(pin)?));
        gpio.set_function(pin, function)?;
    }
    Ok(saved)
}

/// Put back functions saved by [`claim_pins`].
pub fn restore_pins(gpio: &dyn Gpio, saved: &[(u8, PinFunction)]) -> RedrobResult<()> {
    for &(pin, function) in saved {
        gpio.set_function(pin, function)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct SimPin {
    function: PinFunction,
    level: bool,
}

impl Default for SimPin {
    fn default() -> Self {
        Self {
            function: PinFunction::Input,
            level: false,
        }
    }
}

/// In-memory GPIO.
///
/// Writes are only accepted on output pins, like the real header. Tests
/// drive input levels with [`SimGpio::set_input`].
#[derive(Debug, Default)]
pub struct SimGpio {
    pins: Mutex<HashMap<u8, SimPin>>,
}

impl SimGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force the level seen by `read_pin`, whatever the pin function.
    pub fn set_input(&self, pin: u8, high: bool) {
        self.pins.lock().entry(pin).or_default().level = high;
    }

    /// Current level of `pin`.
    pub fn level(&self, pin: u8) -> bool {
        self.pins.lock().get(&pin).map(|p| p.level).unwrap_or(false)
    }

    /// Current function of `pin`.
    pub fn function(&self, pin: u8) -> PinFunction {
        self.pins
            .lock()
            .get(&pin)
            .map(|p| p.function)
            .unwrap_or(PinFunction::Input)
    }
}

impl Gpio for SimGpio {
    fn set_function(&self, pin: u8, function: PinFunction) -> RedrobResult<()> {
        self.pins.lock().entry(pin).or_default().function = function;
        Ok(())
    }

    fn get_function(&self, pin: u8) -> RedrobResult<PinFunction> {
        Ok(self.function(pin))
    }

    fn read_pin(&self, pin: u8) -> RedrobResult<bool> {
        Ok(self.level(pin))
    }

    fn write_pin(&self, pin: u8, high: bool) -> RedrobResult<()> {
        let mut pins = self.pins.lock();
        let entry = pins.entry(pin).or_default();
        if entry.function == PinFunction::Output {
            entry.level = high;
        }
        Ok(())
    }
}

/// Raspberry Pi GPIO through rppal.
#[cfg(feature = "gpio-hardware")]
pub struct RpiGpio {
    gpio: rppal::gpio::Gpio,
    pins: Mutex<HashMap<u8, rppal::gpio::IoPin>>,
}

#[cfg(feature = "gpio-hardware")]
impl RpiGpio {
    pub fn new() -> RedrobResult<Self> {
        Ok(Self {
            gpio: rppal::gpio::Gpio::new()?,
            pins: Mutex::new(HashMap::new()),
        })
    }

    fn with_pin<T>(
        &self,
        pin: u8,
        op: impl FnOnce(&mut rppal::gpio::IoPin) -> T,
    ) -> RedrobResult<T> {
        let mut pins = self.pins.lock();
        if !pins.contains_key(&pin) {
            let raw = self.gpio.get(pin)?;
            let mode = raw.mode();
            let mut io = raw.into_io(mode);
            // Leave the header as configured when the daemon exits
            io.set_reset_on_drop(false);
            pins.insert(pin, io);
        }
        match pins.get_mut(&pin) {
            Some(io) => Ok(op(io)),
            None => Err(crate::redrob_internal!("GPIO pin {} vanished", pin)),
        }
    }
}

#[cfg(feature = "gpio-hardware")]
impl Gpio for RpiGpio {
    fn set_function(&self, pin: u8, function: PinFunction) -> RedrobResult<()> {
        use rppal::gpio::Mode;

        let mode = match function {
            PinFunction::Input => Mode::Input,
            PinFunction::Output => Mode::Output,
            PinFunction::Alt(0) => Mode::Alt0,
            PinFunction::Alt(1) => Mode::Alt1,
            PinFunction::Alt(2) => Mode::Alt2,
            PinFunction::Alt(3) => Mode::Alt3,
            PinFunction::Alt(4) => Mode::Alt4,
            PinFunction::Alt(5) => Mode::Alt5,
            PinFunction::Alt(n) => {
                return Err(crate::error::RedrobError::bad_argument(format!(
                    "alternate function {} on pin {}",
                    n, pin
                )))
            }
        };
        self.with_pin(pin, |io| io.set_mode(mode))
    }

    fn get_function(&self, pin: u8) -> RedrobResult<PinFunction> {
        use rppal::gpio::Mode;

        self.with_pin(pin, |io| match io.mode() {
            Mode::Input => PinFunction::Input,
            Mode::Output => PinFunction::Output,
            Mode::Alt0 => PinFunction::Alt(0),
            Mode::Alt1 => PinFunction::Alt(1),
            Mode::Alt2 => PinFunction::Alt(2),
            Mode::Alt3 => PinFunction::Alt(3),
            Mode::Alt4 => PinFunction::Alt(4),
            Mode::Alt5 => PinFunction::Alt(5),
            #[allow(unreachable_patterns)]
            _ => PinFunction::Input,
        })
    }

    fn read_pin(&self, pin: u8) -> RedrobResult<bool> {
        self.with_pin(pin, |io| io.read() == rppal::gpio::Level::High)
    }

    fn write_pin(&self, pin: u8, high: bool) -> RedrobResult<()> {
        use rppal::gpio::Level;

        self.with_pin(pin, |io| io.write(if high { Level::High } else { Level::Low }))
    }
}
