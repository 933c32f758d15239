//! External process invocation (camera stream script, system shutdown).

use std::process::{Command, Stdio};
use std::sync::Arc;

use crate::error::RedrobResult;

pub trait ProcessRunner: Send + Sync {
    /// Run `program` to completion. Returns the exit code, or `None` when
    /// the process was killed by a signal.
    fn run(&self, program: &str, args: &[&str]) -> RedrobResult<Option<i32>>;
}

pub type SharedRunner = Arc<dyn ProcessRunner>;

/// Runs commands through `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellRunner;

impl ProcessRunner for ShellRunner {
    fn run(&self, program: &str, args: &[&str]) -> RedrobResult<Option<i32>> {
        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        Ok(status.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_runner_exit_codes() {
        let runner = ShellRunner;
        assert_eq!(runner.run("sh", &["-c", "exit 0"]).unwrap(), Some(0));
        assert_eq!(runner.run("sh", &["-c", "exit 3"]).unwrap(), Some(3));
    }

    #[test]
    fn test_shell_runner_missing_program() {
        let err = ShellRunner
            .run("/nonexistent/redrob-stream.sh", &["start"])
            .unwrap_err();
        assert_eq!(err.source_kind(), crate::error::ErrorSource::Os);
    }
}
