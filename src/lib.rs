//! Background task subsystem: tracks shell commands running as child
//! processes, buffers their output, caps how many run at once, and stops
//! them with SIGTERM followed by SIGKILL.

pub mod app;
pub mod exec;
pub mod manager;
pub mod models;
pub mod worker;

pub use app::launcher::launch_background;
pub use exec::{
    ExecutionHandle, ExecutionResult, OsSignaller, ProcessSignaller, ShellExecutionAdapter, Signal,
};
pub use manager::{TaskManager, TaskManagerSlot};
pub use models::{
    config::TaskManagerConfig,
    error::{ConfigError, ExecError, Result, TaskError},
    task::{Task, TaskId, TaskStatus, TaskSummary},
};
