//! Steering and camera command codes.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Motor controller input. Exactly one direction at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SteerCode {
    #[default]
    None,
    Stop,
    Forward,
    Reverse,
    Right,
    Left,
    /// Anything the motor controller does not recognise
    Unknown(u16),
}

impl SteerCode {
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            0x00 => SteerCode::None,
            0x01 => SteerCode::Stop,
            0x02 => SteerCode::Forward,
            0x04 => SteerCode::Reverse,
            0x08 => SteerCode::Right,
            0x10 => SteerCode::Left,
            other => SteerCode::Unknown(other),
        }
    }

    pub fn raw(self) -> u16 {
        match self {
            SteerCode::None => 0x00,
            SteerCode::Stop => 0x01,
            SteerCode::Forward => 0x02,
            SteerCode::Reverse => 0x04,
            SteerCode::Right => 0x08,
            SteerCode::Left => 0x10,
            SteerCode::Unknown(raw) => raw,
        }
    }

    /// Forward, Reverse, Right or Left.
    pub fn is_direction(self) -> bool {
        matches!(
            self,
            SteerCode::Forward | SteerCode::Reverse | SteerCode::Right | SteerCode::Left
        )
    }
}

impl fmt::Display for SteerCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SteerCode::None => write!(f, "NONE"),
            SteerCode::Stop => write!(f, "STOP"),
            SteerCode::Forward => write!(f, "FORWARD"),
            SteerCode::Reverse => write!(f, "REVERSE"),
            SteerCode::Right => write!(f, "RIGHT"),
            SteerCode::Left => write!(f, "LEFT"),
            SteerCode::Unknown(raw) => write!(f, "UNKNOWN(0x{:x})", raw),
        }
    }
}

/// OR-combinable direction bits from a remote-control source.
///
/// The network protocol carries the same bit values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RcSteering(u8);

impl RcSteering {
    pub const NONE: RcSteering = RcSteering(0x00);
    pub const FORWARD: RcSteering = RcSteering(0x01);
    pub const REVERSE: RcSteering = RcSteering(0x02);
    pub const RIGHT: RcSteering = RcSteering(0x04);
    pub const LEFT: RcSteering = RcSteering(0x08);

    pub const fn from_bits(bits: u8) -> Self {
        RcSteering(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Map to a motor code. A single direction maps to that direction,
    /// no bits to `None`, anything else to `Unknown`.
    pub fn to_steer_code(self) -> SteerCode {
        match self {
            RcSteering::NONE => SteerCode::None,
            RcSteering::FORWARD => SteerCode::Forward,
            RcSteering::REVERSE => SteerCode::Reverse,
            RcSteering::RIGHT => SteerCode::Right,
            RcSteering::LEFT => SteerCode::Left,
            RcSteering(bits) => SteerCode::Unknown(u16::from(bits)),
        }
    }
}

impl BitOr for RcSteering {
    type Output = RcSteering;

    fn bitor(self, rhs: RcSteering) -> RcSteering {
        RcSteering(self.0 | rhs.0)
    }
}

impl BitOrAssign for RcSteering {
    fn bitor_assign(&mut self, rhs: RcSteering) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for RcSteering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

/// Camera controller input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CameraCode {
    #[default]
    None,
    StopStream,
    StartStream,
    Unknown(u8),
}

impl CameraCode {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => CameraCode::None,
            1 => CameraCode::StopStream,
            2 => CameraCode::StartStream,
            other => CameraCode::Unknown(other),
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            CameraCode::None => 0,
            CameraCode::StopStream => 1,
            CameraCode::StartStream => 2,
            CameraCode::Unknown(raw) => raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steer_code_raw_values() {
        for raw in [0x00, 0x01, 0x02, 0x04, 0x08, 0x10] {
            let code = SteerCode::from_raw(raw);
            assert!(!matches!(code, SteerCode::Unknown(_)));
            assert_eq!(code.raw(), raw);
        }
        assert_eq!(SteerCode::from_raw(0x03), SteerCode::Unknown(0x03));
        assert!(SteerCode::Left.is_direction());
        assert!(!SteerCode::Stop.is_direction());
    }

    #[test]
    fn test_rc_bits_normalize() {
        assert_eq!(RcSteering::NONE.to_steer_code(), SteerCode::None);
        assert_eq!(RcSteering::FORWARD.to_steer_code(), SteerCode::Forward);
        assert_eq!(RcSteering::LEFT.to_steer_code(), SteerCode::Left);

        let combined = RcSteering::FORWARD | RcSteering::RIGHT;
        assert_eq!(combined.bits(), 0x05);
        assert_eq!(combined.to_steer_code(), SteerCode::Unknown(0x05));
    }

    #[test]
    fn test_camera_codes() {
        assert_eq!(CameraCode::from_raw(2), CameraCode::StartStream);
        assert_eq!(CameraCode::from_raw(1), CameraCode::StopStream);
        assert_eq!(CameraCode::from_raw(9), CameraCode::Unknown(9));
        assert_eq!(CameraCode::Unknown(9).raw(), 9);
    }
}
