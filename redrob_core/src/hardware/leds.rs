use crate::error::RedrobResult;
use crate::hardware::gpio::{claim_pins, restore_pins, PinFunction, SharedGpio};

/// BCM pins of the three status LEDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedPins {
    pub sysfail: u8,
    pub alive: u8,
    pub bat_low: u8,
}

/// One LED on an output pin.
#[derive(Clone)]
pub struct Led {
    gpio: SharedGpio,
    pin: u8,
}

impl Led {
    pub fn new(gpio: SharedGpio, pin: u8) -> Self {
        Self { gpio, pin }
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }

    pub fn set(&self, on: bool) -> RedrobResult<()> {
        self.gpio.write_pin(self.pin, on)
    }

    pub fn toggle(&self) -> RedrobResult<()> {
        let on = self.gpio.read_pin(self.pin)?;
        self.gpio.write_pin(self.pin, !on)
    }
}

/// Status LEDs on the robot front panel.
///
/// Owns the pin setup. Workers get [`Led`] handles for the LEDs they drive.
pub struct StatusLeds {
    gpio: SharedGpio,
    pins: LedPins,
    saved: Vec<(u8, PinFunction)>,
}

impl StatusLeds {
    pub fn new(gpio: SharedGpio, pins: LedPins) -> Self {
        Self {
            gpio,
            pins,
            saved: Vec::new(),
        }
    }

    /// Claim the LED pins as outputs, all off.
    pub fn initialize(&mut self) -> RedrobResult<()> {
        let pins = [self.pins.sysfail, self.pins.alive, self.pins.bat_low];
        self.saved = claim_pins(self.gpio.as_ref(), &pins, PinFunction::Output)?;
        for pin in pins {
            self.gpio.write_pin(pin, false)?;
        }
        Ok(())
    }

    /// Restore the pin functions saved by `initialize`. The sysfail LED is
    /// left as is so a failure stays visible after exit.
    pub fn finalize(&mut self) -> RedrobResult<()> {
        self.alive().set(false)?;
        self.bat_low().set(false)?;
        let sysfail = self.pins.sysfail;
        let saved: Vec<_> = self
            .saved
            .drain(..)
            .filter(|(pin, _)| *pin != sysfail)
            .collect();
        restore_pins(self.gpio.as_ref(), &saved)
    }

    pub fn sysfail(&self) -> Led {
        Led::new(self.gpio.clone(), self.pins.sysfail)
    }

    pub fn alive(&self) -> Led {
        Led::new(self.gpio.clone(), self.pins.alive)
    }

    pub fn bat_low(&self) -> Led {
        Led::new(self.gpio.clone(), self.pins.bat_low)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::gpio::{Gpio, SimGpio};
    use std::sync::Arc;

    const PINS: LedPins = LedPins {
        sysfail: 18,
        alive: 2,
        bat_low: 3,
    };

    #[test]
    fn test_leds_toggle_and_restore() {
        let gpio = Arc::new(SimGpio::new());
        gpio.set_function(2, PinFunction::Alt(0)).unwrap();
        let mut leds = StatusLeds::new(gpio.clone(), PINS);

        leds.initialize().unwrap();
        assert_eq!(gpio.function(2), PinFunction::Output);

        let alive = leds.alive();
        alive.toggle().unwrap();
        assert!(gpio.level(2));
        alive.toggle().unwrap();
        assert!(!gpio.level(2));

        leds.sysfail().set(true).unwrap();
        leds.bat_low().set(true).unwrap();
        leds.finalize().unwrap();

        assert_eq!(gpio.function(2), PinFunction::Alt(0));
        assert!(!gpio.level(3));
        assert!(gpio.level(18));
        assert_eq!(gpio.function(18), PinFunction::Output);
    }
}
