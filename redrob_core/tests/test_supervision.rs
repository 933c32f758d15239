// Supervision protocol: initialize, check and finalize under timeouts.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use redrob_core::task::abort_task;
use redrob_core::{
    check_task, finalize_task, initialize_task, CyclicBody, CyclicTask, RedrobError,
    RedrobResult, TaskState, TaskStatus,
};

mod common;
use common::{init_logging, wait_until};

struct Worker {
    setup_delay: Duration,
    fail_setup: bool,
    fail_after: Option<usize>,
    steps: Arc<AtomicUsize>,
    cleaned_up: Arc<AtomicBool>,
}

impl Worker {
    fn new() -> Self {
        Self {
            setup_delay: Duration::ZERO,
            fail_setup: false,
            fail_after: None,
            steps: Arc::new(AtomicUsize::new(0)),
            cleaned_up: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl CyclicBody for Worker {
    fn setup(&mut self) -> RedrobResult<()> {
        thread::sleep(self.setup_delay);
        if self.fail_setup {
            return Err(RedrobError::hardware("ADC not responding"));
        }
        Ok(())
    }

    fn cyclic_step(&mut self) -> RedrobResult<()> {
        let step = self.steps.fetch_add(1, Ordering::SeqCst) + 1;
        if Some(step) == self.fail_after {
            return Err(RedrobError::hardware("ADC read failed"));
        }
        Ok(())
    }

    fn cleanup(&mut self) -> RedrobResult<()> {
        self.cleaned_up.store(true, Ordering::SeqCst);
        Ok(())
    }
}

const START: Duration = Duration::from_millis(1000);
const EXECUTE: Duration = Duration::from_millis(500);
const STOP: Duration = Duration::from_millis(1500);

#[test]
fn test_initialize_check_finalize() {
    init_logging();
    let worker = Worker::new();
    let steps = Arc::clone(&worker.steps);
    let cleaned_up = Arc::clone(&worker.cleaned_up);
    let mut task = CyclicTask::cyclic("worker", 50.0, worker).unwrap();

    initialize_task(&mut task, (), START, EXECUTE).unwrap();
    assert_eq!(task.state(), TaskState::Executing);
    check_task(&task).unwrap();

    assert!(wait_until(Duration::from_secs(2), || steps.load(Ordering::SeqCst) >= 5));
    check_task(&task).unwrap();

    finalize_task(&mut task, STOP).unwrap();
    assert!(cleaned_up.load(Ordering::SeqCst));
    assert!(matches!(
        check_task(&task),
        Err(RedrobError::ThreadStateNotOk { .. })
    ));
}

#[test]
fn test_slow_setup_times_out_without_release() {
    init_logging();
    let mut worker = Worker::new();
    worker.setup_delay = Duration::from_millis(600);
    let steps = Arc::clone(&worker.steps);
    let cleaned_up = Arc::clone(&worker.cleaned_up);
    let mut task = CyclicTask::cyclic("slow", 50.0, worker).unwrap();

    let started = Instant::now();
    let err = initialize_task(&mut task, (), Duration::from_millis(200), EXECUTE).unwrap_err();
    assert!(err.is_timeout(), "unexpected {:?}", err);
    assert!(started.elapsed() < Duration::from_millis(500));

    // Never released: abandoning it skips execute entirely
    abort_task(&mut task, Duration::from_secs(2)).unwrap();
    assert_eq!(steps.load(Ordering::SeqCst), 0);
    assert!(cleaned_up.load(Ordering::SeqCst));
    assert!(task.status().contains(TaskStatus::SETUP_FAILED));
}

#[test]
fn test_failed_setup_is_fatal_to_initialize() {
    init_logging();
    let mut worker = Worker::new();
    worker.fail_setup = true;
    let steps = Arc::clone(&worker.steps);
    let mut task = CyclicTask::cyclic("broken", 50.0, worker).unwrap();

    let err = initialize_task(&mut task, (), START, EXECUTE).unwrap_err();
    match err {
        RedrobError::ThreadStatusNotOk { task: name, status } => {
            assert_eq!(name, "broken");
            assert!(status.contains("SETUP_FAILED"), "{}", status);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(task.state(), TaskState::SetupDone);

    abort_task(&mut task, STOP).unwrap();
    assert_eq!(steps.load(Ordering::SeqCst), 0);
}

#[test]
fn test_crashed_worker_fails_check() {
    init_logging();
    let mut worker = Worker::new();
    worker.fail_after = Some(3);
    let mut task = CyclicTask::cyclic("crashy", 100.0, worker).unwrap();

    initialize_task(&mut task, (), START, EXECUTE).unwrap();
    assert!(wait_until(Duration::from_secs(2), || check_task(&task).is_err()));

    match check_task(&task) {
        Err(RedrobError::ThreadStateNotOk { state, .. }) => assert_eq!(state, "Done"),
        other => panic!("unexpected {:?}", other),
    }

    let err = finalize_task(&mut task, STOP).unwrap_err();
    assert!(matches!(err, RedrobError::ThreadStatusNotOk { .. }));
    assert_eq!(task.status(), TaskStatus::EXECUTE_FAILED);
}

#[test]
fn test_finalize_times_out_on_wedged_worker() {
    init_logging();

    struct Wedged;
    impl CyclicBody for Wedged {
        fn cyclic_step(&mut self) -> RedrobResult<()> {
            thread::sleep(Duration::from_millis(400));
            Ok(())
        }
    }

    let mut task = CyclicTask::cyclic("wedged", 100.0, Wedged).unwrap();
    initialize_task(&mut task, (), START, EXECUTE).unwrap();
    thread::sleep(Duration::from_millis(20));

    let err = finalize_task(&mut task, Duration::from_millis(50)).unwrap_err();
    assert!(err.is_timeout());

    // Still joinable once the step returns
    task.wait_timed(Duration::from_secs(2)).unwrap();
    assert!(task.status().is_ok());
}
