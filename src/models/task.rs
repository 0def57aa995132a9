use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use uuid::Uuid;

use crate::exec::ExecutionHandle;

pub type TaskId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
    Killed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Killed => "killed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "killed" => Ok(TaskStatus::Killed),
            other => Err(format!("unknown task status '{}'", other)),
        }
    }
}

/// One tracked background command.
///
/// Records handed out by the manager are snapshots; mutating a clone has no
/// effect on the registry.
#[derive(Clone)]
pub struct Task {
    pub id: TaskId,
    pub command: String,
    pub cwd: String,
    pub pid: Option<u32>,
    pub start_time: DateTime<Utc>,
    pub status: TaskStatus,
    pub output_buffer: Vec<String>,
    pub last_read_position: usize,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub error: Option<String>,
    // Set by `kill_task` before signalling so the result that follows is
    // recorded as a kill rather than a natural exit.
    pub(crate) kill_requested: bool,
    pub handle: Arc<dyn ExecutionHandle>,
}

impl Task {
    pub fn new(command: String, cwd: String, handle: Arc<dyn ExecutionHandle>) -> Self {
        Self {
            id: Uuid::new_v4(),
            command,
            cwd,
            pid: handle.pid(),
            start_time: Utc::now(),
            status: TaskStatus::Running,
            output_buffer: vec![],
            last_read_position: 0,
            exit_code: None,
            signal: None,
            error: None,
            kill_requested: false,
            handle,
        }
    }

    /// Moves a running task to `status`. Returns false and leaves the record
    /// untouched if the task already reached a terminal status.
    pub fn finish(&mut self, status: TaskStatus) -> bool {
        if self.status.is_terminal() {
            debug!(
                "Ignoring transition of task {} from {} to {}",
                self.id, self.status, status
            );
            return false;
        }
        self.status = status;
        true
    }

    /// Appends one line, evicting the oldest lines so the buffer never holds
    /// more than `max_lines`. Returns the number of evicted lines.
    pub fn push_line(&mut self, line: String, max_lines: usize) -> usize {
        self.output_buffer.push(line);
        let overflow = self.output_buffer.len().saturating_sub(max_lines);
        if overflow > 0 {
            self.output_buffer.drain(..overflow);
            self.last_read_position = self.last_read_position.saturating_sub(overflow);
            debug!("Task {} evicted {} buffered line(s)", self.id, overflow);
        }
        self.last_read_position = self.last_read_position.min(self.output_buffer.len());
        overflow
    }

    pub fn output_from(&self, position: usize) -> Vec<String> {
        self.output_buffer
            .get(position..)
            .map(<[String]>::to_vec)
            .unwrap_or_default()
    }

    pub fn age(&self, now: DateTime<Utc>) -> std::time::Duration {
        (now - self.start_time).to_std().unwrap_or_default()
    }

    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            id: self.id,
            command: self.command.clone(),
            cwd: self.cwd.clone(),
            pid: self.pid,
            start_time: self.start_time,
            status: self.status,
            exit_code: self.exit_code,
            signal: self.signal,
            error: self.error.clone(),
            output_lines: self.output_buffer.len(),
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("cwd", &self.cwd)
            .field("pid", &self.pid)
            .field("start_time", &self.start_time)
            .field("status", &self.status)
            .field("output_lines", &self.output_buffer.len())
            .field("last_read_position", &self.last_read_position)
            .field("exit_code", &self.exit_code)
            .field("signal", &self.signal)
            .field("error", &self.error)
            .finish()
    }
}

/// Handle-free view of a task, suitable for structured responses.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub id: TaskId,
    pub command: String,
    pub cwd: String,
    pub pid: Option<u32>,
    pub start_time: DateTime<Utc>,
    pub status: TaskStatus,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub error: Option<String>,
    pub output_lines: usize,
}
