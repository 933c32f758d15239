//! Battery voltage monitor.
//!
//! The battery is measured through a resistor divider on an ADC channel.
//! `v_mon` is the voltage at the ADC pin, `v_in` the battery voltage.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{RedrobError, RedrobResult};
use crate::hardware::adc::SharedAdc;
use crate::task::{CyclicBody, SupervisionTimeouts};
use crate::tlog;

pub const BATTERY_TASK_NAME: &str = "REDROBD_BAT_MON";
pub const BATTERY_FREQUENCY: f64 = 4.0;
pub const BATTERY_TIMEOUTS: SupervisionTimeouts =
    SupervisionTimeouts::from_millis(1000, 500, 1250);

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatteryVoltage {
    pub v_mon: f32,
    pub v_in: f32,
}

/// Latest reading, shared with the control loop.
#[derive(Debug, Default)]
pub struct BatteryCell {
    voltage: Mutex<BatteryVoltage>,
}

impl BatteryCell {
    pub fn get(&self) -> BatteryVoltage {
        *self.voltage.lock()
    }

    fn set(&self, voltage: BatteryVoltage) {
        *self.voltage.lock() = voltage;
    }
}

pub struct BatteryMonitor {
    adc: SharedAdc,
    channel: u8,
    scale_factor: f32,
    cell: Arc<BatteryCell>,
}

impl BatteryMonitor {
    /// `scale_factor` is the divider ratio R2 / (R1 + R2).
    pub fn new(adc: SharedAdc, channel: u8, scale_factor: f32) -> RedrobResult<Self> {
        if !scale_factor.is_finite() || scale_factor <= 0.0 {
            return Err(RedrobError::bad_argument(format!(
                "battery scale factor {}",
                scale_factor
            )));
        }
        Ok(Self {
            adc,
            channel,
            scale_factor,
            cell: Arc::new(BatteryCell::default()),
        })
    }

    pub fn cell(&self) -> Arc<BatteryCell> {
        Arc::clone(&self.cell)
    }
}

impl CyclicBody for BatteryMonitor {
    fn cyclic_step(&mut self) -> RedrobResult<()> {
        let raw = self.adc.read_channel(self.channel)?;
        let v_mon = self.adc.raw_to_voltage(raw);
        let v_in = v_mon / self.scale_factor;
        self.cell.set(BatteryVoltage { v_mon, v_in });
        tlog!(debug, "Battery v_mon={:.3} V, v_in={:.3} V", v_mon, v_in);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::adc::SimAdc;

    #[test]
    fn test_divider_scaling() {
        let adc = Arc::new(SimAdc::new(3.3));
        // 7.4 V battery behind the 0.296837 divider
        adc.set_voltage(7, 7.4 * 0.296837);
        let mut monitor = BatteryMonitor::new(adc, 7, 0.296837).unwrap();
        let cell = monitor.cell();
        assert_eq!(cell.get(), BatteryVoltage::default());

        monitor.cyclic_step().unwrap();
        let reading = cell.get();
        assert!((reading.v_mon - 2.1966).abs() < 0.005, "v_mon {}", reading.v_mon);
        assert!((reading.v_in - 7.4).abs() < 0.02, "v_in {}", reading.v_in);
    }

    #[test]
    fn test_rejects_bad_scale_factor() {
        let adc = Arc::new(SimAdc::new(3.3));
        assert!(BatteryMonitor::new(adc.clone(), 7, 0.0).is_err());
        assert!(BatteryMonitor::new(adc, 7, f32::NAN).is_err());
    }
}
