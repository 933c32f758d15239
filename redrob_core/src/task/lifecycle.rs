//! Task runtime: one OS thread per task, driven through
//! start, setup, release, execute, cleanup.
//!
//! A [`Task`] owns its body while idle. `start` moves the body into a
//! freshly spawned thread, and a successful `wait` hands it back, so the
//! owner can restart the task or inspect the body afterwards.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::{Condvar, Mutex};

use crate::error::{RedrobError, RedrobResult};
use crate::logging::{clear_task_context, set_task_context, set_task_cycle};
use crate::task::state::{TaskState, TaskStatus};
use crate::{redrob_internal, tlog};

/// Work carried out by a task thread.
///
/// `setup` and `cleanup` default to no-ops. Errors and panics from any of
/// the three are caught on the task thread and folded into the task's
/// [`TaskStatus`].
pub trait TaskBody: Send + 'static {
    /// Value handed to `execute` by [`Task::start`].
    type Arg: Send + 'static;

    fn setup(&mut self) -> RedrobResult<()> {
        Ok(())
    }

    fn execute(&mut self, arg: Self::Arg, ctx: &TaskContext) -> RedrobResult<()>;

    fn cleanup(&mut self) -> RedrobResult<()> {
        Ok(())
    }
}

/// State shared between a task handle and its thread.
#[derive(Debug, Default)]
struct TaskShared {
    state: AtomicU8,
    status: AtomicU32,
    exe_count: AtomicU64,
    stop: AtomicBool,
    done: Mutex<bool>,
    done_cv: Condvar,
}

impl TaskShared {
    fn state(&self) -> TaskState {
        TaskState::from(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: TaskState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn raise(&self, bit: TaskStatus) {
        self.status.fetch_or(bit.bits(), Ordering::SeqCst);
    }

    fn reset(&self) {
        self.status.store(TaskStatus::OK.bits(), Ordering::SeqCst);
        self.exe_count.store(0, Ordering::SeqCst);
        self.stop.store(false, Ordering::SeqCst);
        *self.done.lock() = false;
    }

    fn mark_done(&self) {
        let mut done = self.done.lock();
        self.set_state(TaskState::Done);
        *done = true;
        self.done_cv.notify_all();
    }
}

/// View of the running task passed to [`TaskBody::execute`].
pub struct TaskContext {
    name: String,
    shared: Arc<TaskShared>,
}

impl TaskContext {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the owner has called [`Task::stop`].
    pub fn is_stopped(&self) -> bool {
        self.shared.stop.load(Ordering::SeqCst)
    }

    /// Count one completed execution cycle. Returns the new count.
    pub fn update_exe_cnt(&self) -> u64 {
        let count = self.shared.exe_count.fetch_add(1, Ordering::SeqCst) + 1;
        set_task_cycle(count);
        count
    }
}

/// Handle to a task thread.
pub struct Task<B: TaskBody> {
    name: String,
    shared: Arc<TaskShared>,
    body: Option<B>,
    gate: Option<Sender<()>>,
    handle: Option<JoinHandle<B>>,
}

impl<B: TaskBody> Task<B> {
    pub fn new(name: impl Into<String>, body: B) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(TaskShared::default()),
            body: Some(body),
            gate: None,
            handle: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> TaskState {
        self.shared.state()
    }

    pub fn status(&self) -> TaskStatus {
        TaskStatus::from_bits(self.shared.status.load(Ordering::SeqCst))
    }

    /// Completed execution cycles since the last `start`.
    pub fn exe_count(&self) -> u64 {
        self.shared.exe_count.load(Ordering::SeqCst)
    }

    /// The body, available while no thread owns it.
    pub fn body(&self) -> Option<&B> {
        self.body.as_ref()
    }

    pub fn body_mut(&mut self) -> Option<&mut B> {
        self.body.as_mut()
    }

    /// Spawn the task thread. It runs `setup` and then blocks on the
    /// release gate.
    pub fn start(&mut self, arg: B::Arg) -> RedrobResult<()> {
        let state = self.state();
        if state != TaskState::NotStarted {
            return Err(RedrobError::wrong_state(format!(
                "start '{}' in state {}",
                self.name, state
            )));
        }
        let body = self.body.take().ok_or_else(|| {
            RedrobError::wrong_state(format!("start '{}' while its thread is alive", self.name))
        })?;

        self.shared.reset();
        self.shared.set_state(TaskState::Started);

        let (gate_tx, gate_rx) = bounded::<()>(1);
        let name = self.name.clone();
        let shared = Arc::clone(&self.shared);

        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || run_task(name, body, arg, shared, gate_rx));

        match spawned {
            Ok(handle) => {
                self.gate = Some(gate_tx);
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.set_state(TaskState::NotStarted);
                Err(RedrobError::Os(e))
            }
        }
    }

    /// Open the release gate so the thread proceeds into `execute`.
    pub fn release(&mut self) -> RedrobResult<()> {
        let state = self.state();
        if !matches!(state, TaskState::Started | TaskState::SetupDone) {
            return Err(RedrobError::wrong_state(format!(
                "release '{}' in state {}",
                self.name, state
            )));
        }
        let gate = self
            .gate
            .as_ref()
            .ok_or_else(|| redrob_internal!("task '{}' has no release gate", self.name))?;
        match gate.try_send(()) {
            // Already released
            Ok(()) | Err(TrySendError::Full(())) => Ok(()),
            Err(TrySendError::Disconnected(())) => Err(redrob_internal!(
                "task '{}' thread left the release gate",
                self.name
            )),
        }
    }

    /// Ask `execute` to finish. Does not block.
    pub fn stop(&self) -> RedrobResult<()> {
        let state = self.state();
        if !matches!(state, TaskState::Executing | TaskState::Done) {
            return Err(RedrobError::wrong_state(format!(
                "stop '{}' in state {}",
                self.name, state
            )));
        }
        self.shared.stop.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Join the task thread.
    pub fn wait(&mut self) -> RedrobResult<()> {
        self.check_joinable()?;
        self.join()
    }

    /// Join the task thread, waiting at most `timeout` for it to finish.
    ///
    /// On timeout the thread is left running and `TimeoutOccurred` is
    /// returned.
    pub fn wait_timed(&mut self, timeout: Duration) -> RedrobResult<()> {
        self.check_joinable()?;
        self.wait_done(timeout)?;
        self.join()
    }

    /// Give up on a task that was started but never released.
    ///
    /// Closing the release gate makes the thread skip `execute`, mark
    /// `SETUP_FAILED` and run `cleanup`. The thread is joined within
    /// `timeout`.
    pub fn abandon(&mut self, timeout: Duration) -> RedrobResult<()> {
        let state = self.state();
        if self.handle.is_none() || !matches!(state, TaskState::Started | TaskState::SetupDone) {
            return Err(RedrobError::wrong_state(format!(
                "abandon '{}' in state {}",
                self.name, state
            )));
        }
        self.gate = None;
        self.wait_done(timeout)?;
        self.join()
    }

    fn wait_done(&self, timeout: Duration) -> RedrobResult<()> {
        let mut done = self.shared.done.lock();
        if !*done {
            let result = self
                .shared
                .done_cv
                .wait_while_for(&mut done, |done| !*done, timeout);
            if result.timed_out() && !*done {
                return Err(RedrobError::timeout(format!(
                    "task '{}' did not finish within {:?}",
                    self.name, timeout
                )));
            }
        }
        Ok(())
    }

    fn check_joinable(&self) -> RedrobResult<()> {
        let state = self.state();
        if self.handle.is_none() || !matches!(state, TaskState::Executing | TaskState::Done) {
            return Err(RedrobError::wrong_state(format!(
                "wait for '{}' in state {}",
                self.name, state
            )));
        }
        Ok(())
    }

    fn join(&mut self) -> RedrobResult<()> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| redrob_internal!("task '{}' has no thread", self.name))?;
        self.gate = None;
        match handle.join() {
            Ok(body) => {
                self.body = Some(body);
                self.shared.set_state(TaskState::NotStarted);
                Ok(())
            }
            Err(_) => Err(redrob_internal!("joining task '{}' failed", self.name)),
        }
    }
}

fn run_task<B: TaskBody>(
    name: String,
    mut body: B,
    arg: B::Arg,
    shared: Arc<TaskShared>,
    gate: Receiver<()>,
) -> B {
    set_task_context(&name, 0);
    let ctx = TaskContext {
        name,
        shared: Arc::clone(&shared),
    };

    if let Err(reason) = guarded(|| body.setup()) {
        tlog!(error, "Setup failed: {}", reason);
        shared.raise(TaskStatus::SETUP_FAILED);
    }
    shared.set_state(TaskState::SetupDone);

    if gate.recv().is_ok() {
        shared.set_state(TaskState::Executing);
        if let Err(reason) = guarded(|| body.execute(arg, &ctx)) {
            tlog!(error, "Execute failed: {}", reason);
            shared.raise(TaskStatus::EXECUTE_FAILED);
        }
    } else {
        tlog!(warn, "Handle dropped before release, skipping execute");
        shared.raise(TaskStatus::SETUP_FAILED);
    }

    if let Err(reason) = guarded(|| body.cleanup()) {
        tlog!(error, "Cleanup failed: {}", reason);
        shared.raise(TaskStatus::CLEANUP_FAILED);
    }

    if catch_unwind(AssertUnwindSafe(|| shared.mark_done())).is_err() {
        shared.raise(TaskStatus::DONE_FAILED);
        shared.set_state(TaskState::Done);
    }
    clear_task_context();
    body
}

/// Run one lifecycle phase, turning errors and panics into a message.
fn guarded<F: FnOnce() -> RedrobResult<()>>(phase: F) -> Result<(), String> {
    match catch_unwind(AssertUnwindSafe(phase)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(panic) => Err(if let Some(s) = panic.downcast_ref::<&str>() {
            format!("panicked: {}", s)
        } else if let Some(s) = panic.downcast_ref::<String>() {
            format!("panicked: {}", s)
        } else {
            "panicked with unknown payload".to_string()
        }),
    }
}
