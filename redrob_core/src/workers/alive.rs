//! Liveness beacon: blinks the alive LED.

use crate::error::RedrobResult;
use crate::hardware::leds::Led;
use crate::task::{CyclicBody, SupervisionTimeouts};

pub const ALIVE_TASK_NAME: &str = "REDROBD_ALIVE";
pub const ALIVE_FREQUENCY: f64 = 2.0;
pub const ALIVE_TIMEOUTS: SupervisionTimeouts =
    SupervisionTimeouts::from_millis(1000, 500, 1500);

pub struct AliveBeacon {
    led: Led,
}

impl AliveBeacon {
    pub fn new(led: Led) -> Self {
        Self { led }
    }
}

impl CyclicBody for AliveBeacon {
    fn setup(&mut self) -> RedrobResult<()> {
        self.led.set(true)
    }

    fn cyclic_step(&mut self) -> RedrobResult<()> {
        self.led.toggle()
    }

    fn cleanup(&mut self) -> RedrobResult<()> {
        self.led.set(false)
    }
}
