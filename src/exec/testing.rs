//! In-memory handles for exercising the manager without real processes.

use crossbeam_channel::Receiver;

use super::handle::{ExecutionHandle, ExecutionResult, ResultCell};
use crate::models::error::ExecError;

pub(crate) struct FakeHandle {
    pid: Option<u32>,
    result: ResultCell,
}

impl FakeHandle {
    /// A handle whose result never arrives unless `resolve` is called.
    pub(crate) fn pending(pid: Option<u32>) -> Self {
        Self {
            pid,
            result: ResultCell::default(),
        }
    }

    pub(crate) fn resolved(pid: u32, result: ExecutionResult) -> Self {
        let handle = Self::pending(Some(pid));
        handle.resolve(result);
        handle
    }

    /// A handle whose result is settled without a value.
    pub(crate) fn abandoned(pid: u32) -> Self {
        let handle = Self::pending(Some(pid));
        handle.result.abandon();
        handle
    }

    pub(crate) fn resolve(&self, result: ExecutionResult) {
        self.result.fulfill(result);
    }
}

impl ExecutionHandle for FakeHandle {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn result(&self) -> Receiver<ExecutionResult> {
        self.result.subscribe()
    }

    fn kill(&self) -> Result<(), ExecError> {
        Ok(())
    }
}

pub(crate) fn exited(code: i32, output: &str) -> ExecutionResult {
    ExecutionResult {
        exit_code: Some(code),
        output: output.to_string(),
        ..Default::default()
    }
}
