//! Collaborator hardware: GPIO, ADC, external processes, `/proc` stats,
//! status LEDs and configuration switches.

pub mod adc;
pub mod gpio;
pub mod leds;
pub mod process;
pub mod switches;
pub mod sys_stat;

use std::sync::Arc;

pub use adc::{Adc, SharedAdc, SimAdc};
pub use gpio::{Gpio, PinFunction, SharedGpio, SimGpio};
pub use leds::{Led, LedPins, StatusLeds};
pub use process::{ProcessRunner, SharedRunner, ShellRunner};
pub use switches::HwSwitches;
pub use sys_stat::{SysStatSampler, SysStats};

#[cfg(feature = "gpio-hardware")]
pub use adc::Mcp3008;
#[cfg(feature = "gpio-hardware")]
pub use gpio::RpiGpio;

/// Collaborator handles shared by the daemon, the control loop and its
/// workers.
#[derive(Clone)]
pub struct Hardware {
    pub gpio: SharedGpio,
    pub adc: SharedAdc,
    pub runner: SharedRunner,
}

impl Hardware {
    pub fn new(gpio: SharedGpio, adc: SharedAdc, runner: SharedRunner) -> Self {
        Self { gpio, adc, runner }
    }

    /// Simulated GPIO and ADC, real process runner.
    pub fn simulated(adc_reference: f32) -> Self {
        Self {
            gpio: Arc::new(SimGpio::new()),
            adc: Arc::new(SimAdc::new(adc_reference)),
            runner: Arc::new(ShellRunner),
        }
    }

    /// Raspberry Pi GPIO and an MCP3008 on SPI0.
    #[cfg(feature = "gpio-hardware")]
    pub fn raspberry_pi(adc_reference: f32) -> crate::error::RedrobResult<Self> {
        Ok(Self {
            gpio: Arc::new(RpiGpio::new()?),
            adc: Arc::new(Mcp3008::new(adc_reference)?),
            runner: Arc::new(ShellRunner),
        })
    }
}
