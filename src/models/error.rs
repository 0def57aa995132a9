use std::io;

use thiserror::Error;

use super::task::TaskId;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("process has no pid")]
    MissingPid,

    #[error("failed to spawn process: {0}")]
    Spawn(#[source] io::Error),

    #[error("failed to signal process: {0}")]
    Signal(#[source] io::Error),
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Maximum concurrent tasks limit reached ({limit})")]
    CapacityExceeded { limit: usize },

    #[error("task {0} has no pid")]
    MissingPid(TaskId),

    #[error("failed to kill task {id}: {source}")]
    Signal {
        id: TaskId,
        #[source]
        source: io::Error,
    },

    #[error("task manager has been destroyed")]
    ManagerClosed,

    #[error("failed to start monitor thread: {0}")]
    Spawn(#[source] io::Error),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}")]
    Invalid { key: &'static str, value: String },
}

pub type Result<T, E = TaskError> = std::result::Result<T, E>;
