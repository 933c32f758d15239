//! Skid-steer motor control over an L293D H-bridge.
//!
//! Each motor has two bridge inputs: A high / B low drives forward, A low /
//! B high drives reverse, both low stops. Turning runs the motors in
//! opposite directions.
//!
//! Two steering modes:
//! - `Continuous`: outputs follow the input every call, `None` stops.
//! - `Memory`: releasing a direction keeps it driven; the same direction
//!   must be given again to stop.

use crate::control::codes::SteerCode;
use crate::error::RedrobResult;
use crate::hardware::gpio::{claim_pins, restore_pins, PinFunction, SharedGpio};
use crate::tlog;

/// Bridge inputs, BCM numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorPins {
    pub right_a: u8,
    pub right_b: u8,
    pub left_a: u8,
    pub left_b: u8,
}

impl MotorPins {
    fn all(&self) -> [u8; 4] {
        [self.right_a, self.right_b, self.left_a, self.left_b]
    }
}

/// Rotation of a single motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorDirection {
    Stop,
    Forward,
    Reverse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SteerMode {
    Continuous,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorState {
    Init,
    Forward,
    Reverse,
    Left,
    Right,
    Memory,
    Stop,
}

impl MotorState {
    fn direction(self) -> Option<SteerCode> {
        match self {
            MotorState::Forward => Some(SteerCode::Forward),
            MotorState::Reverse => Some(SteerCode::Reverse),
            MotorState::Left => Some(SteerCode::Left),
            MotorState::Right => Some(SteerCode::Right),
            _ => None,
        }
    }
}

pub struct MotorController {
    gpio: SharedGpio,
    pins: MotorPins,
    saved: Vec<(u8, PinFunction)>,
    mode: SteerMode,
    state: MotorState,
    last_steering: SteerCode,
    memory_done: bool,
    /// (right, left)
    outputs: (MotorDirection, MotorDirection),
}

impl MotorController {
    pub fn new(gpio: SharedGpio, pins: MotorPins) -> Self {
        Self {
            gpio,
            pins,
            saved: Vec::new(),
            mode: SteerMode::Memory,
            state: MotorState::Init,
            last_steering: SteerCode::None,
            memory_done: false,
            outputs: (MotorDirection::Stop, MotorDirection::Stop),
        }
    }

    /// Claim the bridge pins and stop both motors.
    pub fn initialize(&mut self, mode: SteerMode) -> RedrobResult<()> {
        self.saved = claim_pins(self.gpio.as_ref(), &self.pins.all(), PinFunction::Output)?;
        self.mode = mode;
        self.last_steering = SteerCode::None;
        self.memory_done = false;
        self.write_outputs(MotorDirection::Stop, MotorDirection::Stop)?;
        self.state = MotorState::Init;
        Ok(())
    }

    /// Stop both motors and give the pins back.
    pub fn finalize(&mut self) -> RedrobResult<()> {
        self.halt()?;
        restore_pins(self.gpio.as_ref(), &self.saved)?;
        self.saved.clear();
        Ok(())
    }

    pub fn mode(&self) -> SteerMode {
        self.mode
    }

    pub fn state(&self) -> MotorState {
        self.state
    }

    /// Current (right, left) motor directions.
    pub fn outputs(&self) -> (MotorDirection, MotorDirection) {
        self.outputs
    }

    pub fn steer(&mut self, code: SteerCode) -> RedrobResult<()> {
        match code {
            SteerCode::Stop => {
                self.memory_done = false;
                return self.halt();
            }
            SteerCode::Unknown(raw) => {
                tlog!(warn, "Unknown steer code 0x{:x}, stopping", raw);
                self.memory_done = false;
                return self.halt();
            }
            _ => {}
        }

        match self.mode {
            SteerMode::Continuous => {
                if code.is_direction() {
                    self.drive(code)
                } else {
                    self.halt()
                }
            }
            SteerMode::Memory => self.steer_memory(code),
        }
    }

    fn steer_memory(&mut self, code: SteerCode) -> RedrobResult<()> {
        match self.state {
            MotorState::Init => {
                if code.is_direction() {
                    self.drive(code)?;
                }
                Ok(())
            }
            MotorState::Forward | MotorState::Reverse | MotorState::Left | MotorState::Right => {
                if code == SteerCode::None {
                    // Released: keep driving, remember what was released
                    self.last_steering = self.state.direction().unwrap_or(SteerCode::None);
                    self.state = MotorState::Memory;
                    Ok(())
                } else {
                    self.drive(code)
                }
            }
            MotorState::Memory => {
                if code == SteerCode::None {
                    Ok(())
                } else if code == self.last_steering {
                    self.memory_done = true;
                    self.halt()
                } else {
                    self.drive(code)
                }
            }
            MotorState::Stop => {
                // Still holding the direction that just stopped us
                if self.memory_done && code == self.last_steering {
                    return Ok(());
                }
                self.memory_done = false;
                if code.is_direction() {
                    self.drive(code)?;
                }
                Ok(())
            }
        }
    }

    fn drive(&mut self, code: SteerCode) -> RedrobResult<()> {
        use MotorDirection::{Forward, Reverse};

        let (right, left, state) = match code {
            SteerCode::Forward => (Forward, Forward, MotorState::Forward),
            SteerCode::Reverse => (Reverse, Reverse, MotorState::Reverse),
            SteerCode::Right => (Reverse, Forward, MotorState::Right),
            SteerCode::Left => (Forward, Reverse, MotorState::Left),
            _ => return self.halt(),
        };
        self.write_outputs(right, left)?;
        self.state = state;
        Ok(())
    }

    fn halt(&mut self) -> RedrobResult<()> {
        self.write_outputs(MotorDirection::Stop, MotorDirection::Stop)?;
        self.state = MotorState::Stop;
        Ok(())
    }

    fn write_outputs(&mut self, right: MotorDirection, left: MotorDirection) -> RedrobResult<()> {
        self.write_motor(self.pins.right_a, self.pins.right_b, right)?;
        self.write_motor(self.pins.left_a, self.pins.left_b, left)?;
        self.outputs = (right, left);
        Ok(())
    }

    fn write_motor(&self, pin_a: u8, pin_b: u8, direction: MotorDirection) -> RedrobResult<()> {
        let (a, b) = match direction {
            MotorDirection::Stop => (false, false),
            MotorDirection::Forward => (true, false),
            MotorDirection::Reverse => (false, true),
        };
        self.gpio.write_pin(pin_a, a)?;
        self.gpio.write_pin(pin_b, b)
    }
}
