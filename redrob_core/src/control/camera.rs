//! Video stream control through an external script.
//!
//! The script is invoked as `<script> start` and `<script> shutdown`.

use std::path::{Path, PathBuf};

use crate::control::codes::CameraCode;
use crate::error::RedrobResult;
use crate::hardware::process::SharedRunner;
use crate::tlog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraState {
    Init,
    Active,
    Deactive,
}

pub struct CameraController {
    runner: SharedRunner,
    script: PathBuf,
    state: CameraState,
}

impl CameraController {
    pub fn new(runner: SharedRunner, script: impl AsRef<Path>) -> Self {
        Self {
            runner,
            script: script.as_ref().to_path_buf(),
            state: CameraState::Init,
        }
    }

    pub fn initialize(&mut self) -> RedrobResult<()> {
        self.state = CameraState::Init;
        Ok(())
    }

    /// Stop the stream if it is running.
    pub fn finalize(&mut self) -> RedrobResult<()> {
        if self.state == CameraState::Active {
            self.run_script("shutdown");
            self.state = CameraState::Deactive;
        }
        Ok(())
    }

    pub fn state(&self) -> CameraState {
        self.state
    }

    pub fn command(&mut self, code: CameraCode) -> RedrobResult<()> {
        match (self.state, code) {
            (CameraState::Init | CameraState::Deactive, CameraCode::StartStream) => {
                self.run_script("start");
                self.state = CameraState::Active;
            }
            (CameraState::Active, CameraCode::StopStream) => {
                self.run_script("shutdown");
                self.state = CameraState::Deactive;
            }
            (_, CameraCode::Unknown(raw)) => {
                tlog!(warn, "Unknown camera code 0x{:x} ignored", raw);
            }
            _ => {}
        }
        Ok(())
    }

    /// A script that fails, or cannot be spawned, is logged only. The
    /// state still moves so the same command is not retried every cycle.
    fn run_script(&self, action: &str) {
        let script = self.script.to_string_lossy();
        let outcome = match self.runner.run(&script, &[action]) {
            Ok(Some(0)) => "OK",
            Ok(Some(1)) => "FAIL",
            Ok(Some(_)) => "UNEXPECTED",
            Ok(None) => "UNKNOWN",
            Err(e) => {
                tlog!(warn, "Running {} failed: {}", script, e);
                "UNEXPECTED"
            }
        };
        tlog!(info, "Video stream {} [{}]", action, outcome);
    }
}
