use std::sync::Mutex;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::models::error::ExecError;

/// Terminal outcome of one process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    /// Set iff `kill` was invoked on the handle.
    pub aborted: bool,
    /// Abnormal start/run failure, distinct from a non-zero exit code.
    pub error: Option<String>,
    /// Everything the process wrote to stdout and stderr.
    pub output: String,
}

/// A live OS process the task manager can supervise.
pub trait ExecutionHandle: Send + Sync {
    fn pid(&self) -> Option<u32>;

    /// A fresh receiver that yields the result once it is known. Every call
    /// gets its own receiver and every receiver sees the same value, so the
    /// manager's monitor and any other caller can wait side by side.
    fn result(&self) -> Receiver<ExecutionResult>;

    /// Terminates the process, returning once it has closed.
    fn kill(&self) -> Result<(), ExecError>;
}

/// Write-once result fanned out to any number of readers.
///
/// Readers that subscribe before the value is set are parked as one-slot
/// channels and woken by `fulfill`; later readers get the stored value
/// straight away.
#[derive(Default)]
pub(crate) struct ResultCell {
    state: Mutex<CellState>,
}

#[derive(Default)]
struct CellState {
    value: Option<ExecutionResult>,
    waiters: Vec<Sender<ExecutionResult>>,
    abandoned: bool,
}

impl ResultCell {
    pub(crate) fn subscribe(&self) -> Receiver<ExecutionResult> {
        let (tx, rx) = bounded(1);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match &state.value {
            Some(value) => {
                let _ = tx.send(value.clone());
            }
            // Dropping `tx` leaves the receiver disconnected.
            None if state.abandoned => {}
            None => state.waiters.push(tx),
        }
        rx
    }

    /// Stores the result and wakes every waiting reader. Returns false if
    /// the cell was already settled.
    pub(crate) fn fulfill(&self, result: ExecutionResult) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.value.is_some() || state.abandoned {
            return false;
        }
        for waiter in state.waiters.drain(..) {
            let _ = waiter.send(result.clone());
        }
        state.value = Some(result);
        true
    }

    /// Settles the cell without a value; readers see a disconnected channel.
    pub(crate) fn abandon(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.value.is_none() {
            state.abandoned = true;
            state.waiters.clear();
        }
    }
}
