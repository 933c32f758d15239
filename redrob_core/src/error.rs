//! Unified error handling for redrob
//!
//! One error type is shared by the task runtime, the controllers and the
//! daemon core. Failures that reach the daemon are folded into an
//! [`ErrorRecord`] and parked in the [`LastError`] latch until an operator
//! reads them.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;

use parking_lot::Mutex;
use thiserror::Error;

/// Main error type for redrob operations
#[derive(Debug, Error)]
pub enum RedrobError {
    /// Lifecycle operation called from a state that does not allow it
    #[error("Wrong state: {0}")]
    WrongState(String),

    /// Supervision deadline expired
    #[error("Operation timed out: {0}")]
    TimeoutOccurred(String),

    /// A supervised task is not executing
    #[error("Task '{task}' not executing (state {state})")]
    ThreadStateNotOk { task: String, state: String },

    /// A supervised task reports a failure status
    #[error("Task '{task}' status not OK (status {status})")]
    ThreadStatusNotOk { task: String, status: String },

    /// Socket level failure that was not requested by a controlled shutdown
    #[error("Socket operation failed: {0}")]
    SocketOperationFailed(String),

    /// Operating system error
    #[error("OS error: {0}")]
    Os(#[from] std::io::Error),

    /// Caller supplied an argument outside the accepted range
    #[error("Bad argument: {0}")]
    BadArgument(String),

    #[error("Not initialized")]
    NotInitialized,

    #[error("Already initialized")]
    AlreadyInitialized,

    /// Configuration parsing or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// GPIO, ADC or other collaborator hardware failure
    #[error("Hardware error: {0}")]
    Hardware(String),

    /// Internal errors with source location for debugging.
    /// Use the `redrob_internal!()` macro to create these, it captures
    /// file/line and, when enabled, a backtrace.
    #[error("Internal error: {message} (at {file}:{line})")]
    Internal {
        message: String,
        file: &'static str,
        line: u32,
        trace: Option<String>,
    },
}

/// Create an internal error with automatic file/line capture.
///
/// ```rust,ignore
/// return Err(redrob_internal!("Unexpected code: {}", code));
/// ```
#[macro_export]
macro_rules! redrob_internal {
    ($($arg:tt)*) => {
        $crate::error::RedrobError::Internal {
            message: format!($($arg)*),
            file: file!(),
            line: line!(),
            trace: $crate::error::capture_trace(),
        }
    };
}

/// Convenience type alias for Results using RedrobError
pub type RedrobResult<T> = std::result::Result<T, RedrobError>;

/// Capture a backtrace at the call site if backtraces are enabled
/// (`RUST_BACKTRACE` / `RUST_LIB_BACKTRACE`).
pub fn capture_trace() -> Option<String> {
    let trace = Backtrace::capture();
    match trace.status() {
        BacktraceStatus::Captured => Some(trace.to_string()),
        _ => None,
    }
}

impl From<serde_yaml::Error> for RedrobError {
    fn from(err: serde_yaml::Error) -> Self {
        RedrobError::Config(format!("YAML error: {}", err))
    }
}

#[cfg(feature = "gpio-hardware")]
impl From<rppal::gpio::Error> for RedrobError {
    fn from(err: rppal::gpio::Error) -> Self {
        RedrobError::Hardware(format!("GPIO: {}", err))
    }
}

#[cfg(feature = "gpio-hardware")]
impl From<rppal::spi::Error> for RedrobError {
    fn from(err: rppal::spi::Error) -> Self {
        RedrobError::Hardware(format!("SPI: {}", err))
    }
}

impl RedrobError {
    pub fn wrong_state<S: Into<String>>(msg: S) -> Self {
        RedrobError::WrongState(msg.into())
    }

    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        RedrobError::TimeoutOccurred(msg.into())
    }

    pub fn socket<S: Into<String>>(msg: S) -> Self {
        RedrobError::SocketOperationFailed(msg.into())
    }

    pub fn bad_argument<S: Into<String>>(msg: S) -> Self {
        RedrobError::BadArgument(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        RedrobError::Config(msg.into())
    }

    pub fn hardware<S: Into<String>>(msg: S) -> Self {
        RedrobError::Hardware(msg.into())
    }

    /// Which side raised the error.
    pub fn source_kind(&self) -> ErrorSource {
        match self {
            RedrobError::Os(_) => ErrorSource::Os,
            _ => ErrorSource::Internal,
        }
    }

    /// Stable numeric code. OS errors report the raw errno when known.
    pub fn code(&self) -> i32 {
        match self {
            RedrobError::WrongState(_) => 1,
            RedrobError::TimeoutOccurred(_) => 2,
            RedrobError::ThreadStateNotOk { .. } => 3,
            RedrobError::ThreadStatusNotOk { .. } => 4,
            RedrobError::SocketOperationFailed(_) => 5,
            RedrobError::BadArgument(_) => 6,
            RedrobError::NotInitialized => 7,
            RedrobError::AlreadyInitialized => 8,
            RedrobError::Config(_) => 9,
            RedrobError::Hardware(_) => 10,
            RedrobError::Internal { .. } => 11,
            RedrobError::Os(err) => err.raw_os_error().unwrap_or(-1),
        }
    }

    /// Whether this is a supervision timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, RedrobError::TimeoutOccurred(_))
    }
}

/// Origin of a latched error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSource {
    Internal,
    Os,
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSource::Internal => write!(f, "INTERNAL"),
            ErrorSource::Os => write!(f, "OS"),
        }
    }
}

/// Snapshot of an error as presented to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub source: ErrorSource,
    pub code: i32,
    pub info: String,
    pub trace: Option<String>,
}

impl From<&RedrobError> for ErrorRecord {
    fn from(err: &RedrobError) -> Self {
        let trace = match err {
            RedrobError::Internal { trace, .. } => trace.clone(),
            _ => None,
        };
        ErrorRecord {
            source: err.source_kind(),
            code: err.code(),
            info: err.to_string(),
            trace,
        }
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] code={} {}", self.source, self.code, self.info)?;
        if let Some(trace) = &self.trace {
            write!(f, "\n{}", trace)?;
        }
        Ok(())
    }
}

/// Single-slot error latch.
///
/// Holds at most one unread record. Errors arriving while a record is
/// waiting are dropped until [`LastError::take`] empties the slot.
#[derive(Debug, Default)]
pub struct LastError {
    slot: Mutex<Option<ErrorRecord>>,
}

impl LastError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `record` if the slot is empty. Returns true if it was stored.
    pub fn latch(&self, record: ErrorRecord) -> bool {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(record);
        true
    }

    /// Read and clear.
    pub fn take(&self) -> Option<ErrorRecord> {
        self.slot.lock().take()
    }

    pub fn is_set(&self) -> bool {
        self.slot.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_macro_captures_location() {
        let err = redrob_internal!("bad value {}", 42);
        match &err {
            RedrobError::Internal { message, file, line, .. } => {
                assert_eq!(message, "bad value 42");
                assert!(file.ends_with("error.rs"));
                assert!(*line > 0);
            }
            other => panic!("unexpected variant: {:?}", other),
        }
        assert_eq!(err.source_kind(), ErrorSource::Internal);
    }

    #[test]
    fn test_os_error_keeps_errno() {
        let err = RedrobError::from(std::io::Error::from_raw_os_error(libc::EADDRINUSE));
        assert_eq!(err.source_kind(), ErrorSource::Os);
        assert_eq!(err.code(), libc::EADDRINUSE);
    }

    #[test]
    fn test_record_from_error() {
        let err = RedrobError::timeout("REDROBD_ALIVE setup");
        let record = ErrorRecord::from(&err);
        assert_eq!(record.source, ErrorSource::Internal);
        assert_eq!(record.code, 2);
        assert!(record.info.contains("REDROBD_ALIVE"));
        assert!(record.trace.is_none());
    }

    #[test]
    fn test_last_error_keeps_first_until_read() {
        let last = LastError::new();
        assert!(last.take().is_none());

        assert!(last.latch(ErrorRecord::from(&RedrobError::NotInitialized)));
        assert!(!last.latch(ErrorRecord::from(&RedrobError::AlreadyInitialized)));

        let record = last.take().unwrap();
        assert_eq!(record.code, 7);
        assert!(last.take().is_none());

        assert!(last.latch(ErrorRecord::from(&RedrobError::AlreadyInitialized)));
        assert_eq!(last.take().unwrap().code, 8);
    }
}
