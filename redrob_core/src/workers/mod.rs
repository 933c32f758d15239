//! Cyclic workers supervised by the control loop.

pub mod alive;
pub mod battery;

pub use alive::AliveBeacon;
pub use battery::{BatteryCell, BatteryMonitor, BatteryVoltage};
