//! DIP switches wired to ADC channels.

use crate::error::RedrobResult;
use crate::hardware::adc::SharedAdc;

/// A channel above this voltage reads as logic 1.
pub const MIN_HIGH_VOLTAGE: f32 = 2.0;

/// Hardware configuration switches.
pub struct HwSwitches {
    adc: SharedAdc,
    shutdown_channel: u8,
    cont_steer_channel: u8,
}

impl HwSwitches {
    pub fn new(adc: SharedAdc, shutdown_channel: u8, cont_steer_channel: u8) -> Self {
        Self {
            adc,
            shutdown_channel,
            cont_steer_channel,
        }
    }

    fn channel_high(&self, channel: u8) -> RedrobResult<bool> {
        Ok(self.adc.read_voltage(channel)? > MIN_HIGH_VOLTAGE)
    }

    /// Shutdown switch: pulled up while running, pulled down to request
    /// a shutdown.
    pub fn select_shutdown(&self) -> RedrobResult<bool> {
        Ok(!self.channel_high(self.shutdown_channel)?)
    }

    /// Steering switch: pulled up selects continuous steering.
    pub fn select_continuous_steering(&self) -> RedrobResult<bool> {
        self.channel_high(self.cont_steer_channel)
    }
}
