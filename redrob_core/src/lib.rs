//! # redrob core
//!
//! Control core of the redrob robot daemon.
//!
//! - **Tasks**: one OS thread per worker with a five-state lifecycle, plus
//!   fixed-frequency cyclic tasks paced by absolute deadlines
//! - **Supervision**: start, release, check and stop workers under timeouts
//! - **Control**: motor and camera state machines, radio and network
//!   remote-control sources and their arbitration
//! - **Net**: the remote control TCP server and its wire protocol
//! - **Daemon**: the control loop and the core object the binary drives
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use redrob_core::{DaemonConfig, Hardware, RedrobCore};
//!
//! let config = DaemonConfig::default();
//! let core = RedrobCore::new(Hardware::simulated(config.adc.reference_voltage));
//! core.initialize(&config)?;
//! core.check_run_status()?;
//! core.finalize()?;
//! # Ok::<(), redrob_core::RedrobError>(())
//! ```

pub mod config;
pub mod control;
pub mod control_loop;
pub mod daemon;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod net;
pub mod task;
pub mod workers;

pub use config::DaemonConfig;
pub use control_loop::{ControlLoop, CTRL_TASK_NAME, CTRL_TIMEOUTS};
pub use daemon::{prod_info, ProdInfo, RedrobCore};
pub use error::{ErrorRecord, ErrorSource, LastError, RedrobError, RedrobResult};
pub use hardware::Hardware;
pub use task::{
    check_task, finalize_task, initialize_task, CyclicBody, CyclicTask, SupervisionTimeouts, Task,
    TaskBody, TaskContext, TaskState, TaskStatus,
};
