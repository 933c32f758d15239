//! Supervision of worker tasks.
//!
//! Every worker is brought up, checked and torn down through the same three
//! calls. Timeouts are wall-clock based and independent of the worker's own
//! frequency.

use std::thread;
use std::time::{Duration, Instant};

use crate::error::{RedrobError, RedrobResult};
use crate::task::lifecycle::{Task, TaskBody};
use crate::task::state::TaskState;

/// How often state is polled while waiting for a transition.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Start, setup and release deadlines for one worker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupervisionTimeouts {
    pub start: Duration,
    pub execute: Duration,
    pub stop: Duration,
}

impl SupervisionTimeouts {
    /// Deadlines in milliseconds.
    pub const fn from_millis(start: u64, execute: u64, stop: u64) -> Self {
        Self {
            start: Duration::from_millis(start),
            execute: Duration::from_millis(execute),
            stop: Duration::from_millis(stop),
        }
    }
}

/// Start `task`, wait for setup, release it and wait until it executes.
///
/// No release is issued unless setup completed with an OK status inside
/// `start_timeout`.
pub fn initialize_task<B: TaskBody>(
    task: &mut Task<B>,
    arg: B::Arg,
    start_timeout: Duration,
    execute_timeout: Duration,
) -> RedrobResult<()> {
    task.start(arg)?;

    wait_for_state(task, TaskState::SetupDone, start_timeout)?;
    check_status(task)?;

    task.release()?;

    wait_for_state(task, TaskState::Executing, execute_timeout)?;
    check_status(task)
}

/// Stop `task` and join it within `stop_timeout`.
pub fn finalize_task<B: TaskBody>(task: &mut Task<B>, stop_timeout: Duration) -> RedrobResult<()> {
    task.stop()?;
    task.wait_timed(stop_timeout)?;
    check_status(task)
}

/// Fails unless `task` is executing with an OK status.
pub fn check_task<B: TaskBody>(task: &Task<B>) -> RedrobResult<()> {
    let state = task.state();
    if state != TaskState::Executing {
        return Err(RedrobError::ThreadStateNotOk {
            task: task.name().to_string(),
            state: state.to_string(),
        });
    }
    check_status(task)
}

/// Bring down a task whose initialization failed part way.
///
/// A task still parked before release is abandoned, one that got as far as
/// executing is stopped and joined. Anything else is left alone.
pub fn abort_task<B: TaskBody>(task: &mut Task<B>, timeout: Duration) -> RedrobResult<()> {
    match task.state() {
        TaskState::Started | TaskState::SetupDone => task.abandon(timeout),
        TaskState::Executing | TaskState::Done => {
            task.stop()?;
            task.wait_timed(timeout)
        }
        TaskState::NotStarted => Ok(()),
    }
}

fn check_status<B: TaskBody>(task: &Task<B>) -> RedrobResult<()> {
    let status = task.status();
    if !status.is_ok() {
        return Err(RedrobError::ThreadStatusNotOk {
            task: task.name().to_string(),
            status: status.to_string(),
        });
    }
    Ok(())
}

fn wait_for_state<B: TaskBody>(
    task: &Task<B>,
    target: TaskState,
    timeout: Duration,
) -> RedrobResult<()> {
    let started = Instant::now();
    loop {
        if task.state() == target {
            return Ok(());
        }
        let elapsed = started.elapsed();
        if elapsed >= timeout {
            return Err(RedrobError::timeout(format!(
                "task '{}' did not reach {} within {:?} (state {})",
                task.name(),
                target,
                timeout,
                task.state()
            )));
        }
        thread::sleep(POLL_INTERVAL.min(timeout - elapsed));
    }
}
