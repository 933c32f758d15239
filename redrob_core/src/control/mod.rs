//! Motor and camera controllers, command codes and remote-control sources.

pub mod camera;
pub mod codes;
pub mod motor;
pub mod remote;

pub use camera::{CameraController, CameraState};
pub use codes::{CameraCode, RcSteering, SteerCode};
pub use motor::{MotorController, MotorDirection, MotorPins, MotorState, SteerMode};
pub use remote::{Arbiter, NetRemote, RemoteControl, RemoteSource, RfPins, RfRemote};
