use crate::control::codes::RcSteering;
use crate::control::remote::{ActiveLatch, RemoteControl};
use crate::error::RedrobResult;
use crate::hardware::gpio::{claim_pins, restore_pins, PinFunction, SharedGpio};

/// Receiver output pins, BCM numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RfPins {
    pub forward: u8,
    pub reverse: u8,
    pub right: u8,
    pub left: u8,
}

/// Radio receiver wired to four GPIO inputs, one per direction.
pub struct RfRemote {
    gpio: SharedGpio,
    pins: RfPins,
    saved: Vec<(u8, PinFunction)>,
    latch: ActiveLatch,
}

impl RfRemote {
    pub fn new(gpio: SharedGpio, pins: RfPins) -> Self {
        Self {
            gpio,
            pins,
            saved: Vec::new(),
            latch: ActiveLatch::default(),
        }
    }
}

impl RemoteControl for RfRemote {
    fn initialize(&mut self) -> RedrobResult<()> {
        let pins = [
            self.pins.forward,
            self.pins.reverse,
            self.pins.right,
            self.pins.left,
        ];
        self.saved = claim_pins(self.gpio.as_ref(), &pins, PinFunction::Input)?;
        self.latch.reset();
        Ok(())
    }

    fn finalize(&mut self) -> RedrobResult<()> {
        restore_pins(self.gpio.as_ref(), &self.saved)?;
        self.saved.clear();
        self.latch.reset();
        Ok(())
    }

    fn get_steering(&mut self) -> RedrobResult<RcSteering> {
        let mut steering = RcSteering::NONE;
        for (pin, bit) in [
            (self.pins.forward, RcSteering::FORWARD),
            (self.pins.reverse, RcSteering::REVERSE),
            (self.pins.right, RcSteering::RIGHT),
            (self.pins.left, RcSteering::LEFT),
        ] {
            if self.gpio.read_pin(pin)? {
                steering |= bit;
            }
        }
        self.latch.observe(steering);
        Ok(steering)
    }

    fn is_active(&self) -> bool {
        self.latch.is_active()
    }
}
