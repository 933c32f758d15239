//! Thread-local task logging context.
//!
//! Every task runs on its own thread. The task runtime sets the context
//! when the thread starts and clears it when the thread ends, so code
//! running inside a task can log with `tlog!()` and have the task name
//! attached without passing it around.
//!
//! ```ignore
//! use redrob_core::tlog;
//!
//! fn cyclic_step(&mut self) -> RedrobResult<()> {
//!     tlog!(debug, "Battery {:.2} V", v_in);
//!     Ok(())
//! }
//! ```

use std::cell::RefCell;

thread_local! {
    static CURRENT_TASK: RefCell<Option<TaskLogContext>> = const { RefCell::new(None) };
}

/// Thread-local context for task logging.
pub struct TaskLogContext {
    /// Task name for log attribution.
    pub name: String,
    /// Completed cycles (0 for non-cyclic tasks).
    pub cycle: u64,
}

/// Set the current task context for this thread.
pub fn set_task_context(name: &str, cycle: u64) {
    CURRENT_TASK.with(|ctx| {
        let mut slot = ctx.borrow_mut();
        if let Some(ref mut existing) = *slot {
            existing.name.clear();
            existing.name.push_str(name);
            existing.cycle = cycle;
        } else {
            *slot = Some(TaskLogContext {
                name: name.to_owned(),
                cycle,
            });
        }
    });
}

/// Update the cycle count of the current context, if any.
pub fn set_task_cycle(cycle: u64) {
    CURRENT_TASK.with(|ctx| {
        if let Some(ref mut existing) = *ctx.borrow_mut() {
            existing.cycle = cycle;
        }
    });
}

/// Clear the current task context for this thread.
pub fn clear_task_context() {
    CURRENT_TASK.with(|ctx| {
        *ctx.borrow_mut() = None;
    });
}

/// Current task name if set, otherwise "main".
pub fn current_task_name() -> String {
    CURRENT_TASK.with(|ctx| {
        ctx.borrow()
            .as_ref()
            .map(|c| c.name.clone())
            .unwrap_or_else(|| "main".to_string())
    })
}

/// Current cycle count if set, otherwise 0.
pub fn current_task_cycle() -> u64 {
    CURRENT_TASK.with(|ctx| ctx.borrow().as_ref().map(|c| c.cycle).unwrap_or(0))
}

/// Used by `tlog!()`. Forwards to the `log` facade with the task name
/// as prefix.
pub fn log_with_context(level: log::Level, message: std::fmt::Arguments<'_>) {
    if !log::log_enabled!(target: "redrob", level) {
        return;
    }
    CURRENT_TASK.with(|ctx| match *ctx.borrow() {
        Some(ref c) if c.cycle > 0 => {
            log::log!(target: "redrob", level, "[{}#{}] {}", c.name, c.cycle, message)
        }
        Some(ref c) => log::log!(target: "redrob", level, "[{}] {}", c.name, message),
        None => log::log!(target: "redrob", level, "[main] {}", message),
    });
}

/// Log a message from within a task.
///
/// ```ignore
/// tlog!(info, "Server listening on {}", addr);
/// tlog!(warn, "Undefined steering 0x{:x}", bits);
/// tlog!(error, "Step failed: {}", err);
/// tlog!(debug, "v_mon={:.3}", v_mon);
/// ```
#[macro_export]
macro_rules! tlog {
    (info, $($arg:tt)*) => {
        $crate::logging::log_with_context(::log::Level::Info, format_args!($($arg)*))
    };
    (warn, $($arg:tt)*) => {
        $crate::logging::log_with_context(::log::Level::Warn, format_args!($($arg)*))
    };
    (error, $($arg:tt)*) => {
        $crate::logging::log_with_context(::log::Level::Error, format_args!($($arg)*))
    };
    (debug, $($arg:tt)*) => {
        $crate::logging::log_with_context(::log::Level::Debug, format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_defaults_to_main() {
        clear_task_context();
        assert_eq!(current_task_name(), "main");
        assert_eq!(current_task_cycle(), 0);
    }

    #[test]
    fn test_context_set_and_clear() {
        set_task_context("REDROBD_ALIVE", 0);
        assert_eq!(current_task_name(), "REDROBD_ALIVE");

        set_task_cycle(12);
        assert_eq!(current_task_cycle(), 12);

        // Reuse of the existing slot
        set_task_context("REDROBD_BAT_MON", 3);
        assert_eq!(current_task_name(), "REDROBD_BAT_MON");
        assert_eq!(current_task_cycle(), 3);

        clear_task_context();
        assert_eq!(current_task_name(), "main");
    }

    #[test]
    fn test_context_is_per_thread() {
        set_task_context("outer", 0);
        let inner = std::thread::spawn(current_task_name).join().unwrap();
        assert_eq!(inner, "main");
        assert_eq!(current_task_name(), "outer");
        clear_task_context();
    }

    #[test]
    fn test_tlog_without_logger_is_silent() {
        set_task_context("quiet", 1);
        crate::tlog!(info, "value {}", 1);
        crate::tlog!(debug, "value {}", 2);
        clear_task_context();
    }
}
