mod adapter;
mod handle;
mod signal;

#[cfg(test)]
pub(crate) mod testing;

pub use adapter::{ShellExecutionAdapter, GRACEFUL_KILL_TIMEOUT};
pub use handle::{ExecutionHandle, ExecutionResult};
pub use signal::{OsSignaller, ProcessSignaller, Signal};
pub(crate) use signal::is_no_such_process;
