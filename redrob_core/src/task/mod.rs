//! Task runtime, fixed-frequency scheduling and supervision.

pub mod cyclic;
pub mod lifecycle;
pub mod state;
pub mod supervision;

pub use cyclic::{Cyclic, CyclicBody, CyclicTask, Pacer};
pub use lifecycle::{Task, TaskBody, TaskContext};
pub use state::{TaskState, TaskStatus};
pub use supervision::{
    abort_task, check_task, finalize_task, initialize_task, SupervisionTimeouts, POLL_INTERVAL,
};
