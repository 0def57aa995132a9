use super::task::TaskId;
use crate::exec::ExecutionResult;

#[derive(Debug)]
pub enum TaskMessage {
    /// A monitor observed its handle's result, or failed waiting for it.
    Finished(TaskId, Result<ExecutionResult, String>),
    Shutdown,
}
