//! 10-bit ADC capability.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{RedrobError, RedrobResult};

/// Full-scale raw reading of a 10-bit converter.
pub const ADC_MAX_RAW: u16 = 1023;

pub trait Adc: Send + Sync {
    /// Single-ended conversion of `channel`.
    fn read_channel(&self, channel: u8) -> RedrobResult<u16>;

    /// Convert a raw reading to volts at the input pin.
    fn raw_to_voltage(&self, raw: u16) -> f32;

    /// Read `channel` and convert it.
    fn read_voltage(&self, channel: u8) -> RedrobResult<f32> {
        Ok(self.raw_to_voltage(self.read_channel(channel)?))
    }
}

pub type SharedAdc = Arc<dyn Adc>;

fn scale(raw: u16, reference: f32) -> f32 {
    f32::from(raw.min(ADC_MAX_RAW)) * reference / f32::from(ADC_MAX_RAW)
}

/// In-memory ADC. Unset channels read 0.
#[derive(Debug)]
pub struct SimAdc {
    reference: f32,
    channels: Mutex<HashMap<u8, u16>>,
}

impl SimAdc {
    pub fn new(reference: f32) -> Self {
        Self {
            reference,
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_raw(&self, channel: u8, raw: u16) {
        self.channels.lock().insert(channel, raw.min(ADC_MAX_RAW));
    }

    /// Set the channel to the raw value closest to `volts`.
    pub fn set_voltage(&self, channel: u8, volts: f32) {
        let raw = (volts / self.reference * f32::from(ADC_MAX_RAW)).round();
        self.set_raw(channel, raw.clamp(0.0, f32::from(ADC_MAX_RAW)) as u16);
    }
}

impl Adc for SimAdc {
    fn read_channel(&self, channel: u8) -> RedrobResult<u16> {
        if channel > 7 {
            return Err(RedrobError::bad_argument(format!("ADC channel {}", channel)));
        }
        Ok(self.channels.lock().get(&channel).copied().unwrap_or(0))
    }

    fn raw_to_voltage(&self, raw: u16) -> f32 {
        scale(raw, self.reference)
    }
}

/// MCP3008 on the Raspberry Pi SPI bus.
#[cfg(feature = "gpio-hardware")]
pub struct Mcp3008 {
    spi: Mutex<rppal::spi::Spi>,
    reference: f32,
}

#[cfg(feature = "gpio-hardware")]
impl Mcp3008 {
    /// SPI0 with chip select CE1, 64 kHz clock.
    pub fn new(reference: f32) -> RedrobResult<Self> {
        use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

        let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss1, 64_000, Mode::Mode0)?;
        Ok(Self {
            spi: Mutex::new(spi),
            reference,
        })
    }
}

#[cfg(feature = "gpio-hardware")]
impl Adc for Mcp3008 {
    fn read_channel(&self, channel: u8) -> RedrobResult<u16> {
        if channel > 7 {
            return Err(RedrobError::bad_argument(format!("ADC channel {}", channel)));
        }
        // Start bit, single-ended + channel, padding
        let tx = [0x01, (0x08 | channel) << 4, 0x00];
        let mut rx = [0u8; 3];
        self.spi.lock().transfer(&mut rx, &tx)?;
        Ok((u16::from(rx[1] & 0x03) << 8) | u16::from(rx[2]))
    }

    fn raw_to_voltage(&self, raw: u16) -> f32 {
        scale(raw, self.reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_to_voltage_full_scale() {
        let adc = SimAdc::new(3.3);
        assert_eq!(adc.raw_to_voltage(0), 0.0);
        assert!((adc.raw_to_voltage(ADC_MAX_RAW) - 3.3).abs() < 1e-6);
        assert!((adc.raw_to_voltage(2000) - 3.3).abs() < 1e-6);
    }

    #[test]
    fn test_sim_adc_channels() {
        let adc = SimAdc::new(3.3);
        assert_eq!(adc.read_channel(7).unwrap(), 0);

        adc.set_voltage(7, 2.2);
        let v = adc.read_voltage(7).unwrap();
        assert!((v - 2.2).abs() < 0.005, "got {}", v);

        assert!(matches!(adc.read_channel(8), Err(RedrobError::BadArgument(_))));
    }
}
