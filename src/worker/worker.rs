use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, Weak},
    thread::{self, JoinHandle},
    time::Duration,
};

use chrono::Utc;
use crossbeam_channel::{select, tick, Receiver, Sender};
use log::{debug, error, info, warn};

use crate::exec::{ExecutionHandle, ExecutionResult};
use crate::models::{
    message::TaskMessage,
    task::{Task, TaskId, TaskStatus},
};

pub type Registry = Mutex<HashMap<TaskId, Task>>;

/// Locks the registry, recovering the map if a panicking thread poisoned it.
pub fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<TaskId, Task>> {
    registry.lock().unwrap_or_else(|e| e.into_inner())
}

/// Single owner of monitor completions: applies every result to the registry
/// in the order the monitors report them.
pub fn spawn_worker_thread(
    receiver: Receiver<TaskMessage>,
    tasks: Arc<Registry>,
    max_buffer_lines: usize,
) -> std::io::Result<()> {
    thread::Builder::new()
        .name("bg-task-worker".into())
        .spawn(move || {
            loop {
                match receiver.recv() {
                    Ok(TaskMessage::Finished(id, outcome)) => {
                        handle_finished(id, outcome, &tasks, max_buffer_lines)
                    }
                    Ok(TaskMessage::Shutdown) => {
                        debug!("Task worker shutting down");
                        break;
                    }
                    Err(_) => break,
                }
            }
        })
        .map(|_| ())
}

/// Waits once on the handle's result and forwards it to the worker.
pub fn spawn_monitor(
    id: TaskId,
    handle: Arc<dyn ExecutionHandle>,
    sender: Sender<TaskMessage>,
) -> std::io::Result<()> {
    let result = handle.result();
    thread::Builder::new()
        .name(format!("bg-monitor-{}", id))
        .spawn(move || {
            let outcome = result
                .recv()
                .map_err(|_| "execution handle dropped its result without resolving".to_string());
            if sender.send(TaskMessage::Finished(id, outcome)).is_err() {
                debug!("Task {} finished after the worker stopped", id);
            }
        })
        .map(|_| ())
}

/// Runs `cleanup` on every tick until `stop` disconnects or the registry is
/// gone. Holds only a weak reference, so it never keeps the registry alive.
pub fn spawn_cleanup_ticker(
    tasks: Weak<Registry>,
    interval: Duration,
    cleanup_after: Duration,
    stop: Receiver<()>,
) -> std::io::Result<JoinHandle<()>> {
    let ticker = tick(interval);
    thread::Builder::new()
        .name("bg-task-cleanup".into())
        .spawn(move || loop {
            select! {
                recv(ticker) -> _ => {
                    let Some(tasks) = tasks.upgrade() else { break };
                    let removed = remove_expired(&tasks, cleanup_after);
                    if removed > 0 {
                        info!("Auto-cleanup removed {} finished task(s)", removed);
                    }
                }
                recv(stop) -> _ => break,
            }
        })
}

pub fn remove_expired(tasks: &Registry, cleanup_after: Duration) -> usize {
    let now = Utc::now();
    let mut guard = lock(tasks);
    let before = guard.len();
    guard.retain(|_, task| task.status == TaskStatus::Running || task.age(now) <= cleanup_after);
    before - guard.len()
}

fn handle_finished(
    id: TaskId,
    outcome: Result<ExecutionResult, String>,
    tasks: &Registry,
    max_buffer_lines: usize,
) {
    let mut guard = lock(tasks);
    let Some(task) = guard.get_mut(&id) else {
        debug!("Result for task {} arrived after it was removed", id);
        return;
    };

    match outcome {
        Ok(result) => apply_result(task, result, max_buffer_lines),
        Err(reason) => {
            error!("Monitor for task {} failed: {}", id, reason);
            if task.finish(TaskStatus::Failed) {
                task.error = Some(reason);
            }
        }
    }
}

pub fn apply_result(task: &mut Task, result: ExecutionResult, max_buffer_lines: usize) {
    let status = if result.aborted || task.kill_requested {
        TaskStatus::Killed
    } else if result.error.is_some() {
        TaskStatus::Failed
    } else {
        TaskStatus::Completed
    };

    if task.finish(status) {
        if let Some(error) = &result.error {
            warn!("Task {} failed: {}", task.id, error);
        }
        task.error = result.error;
        info!("Task {} {} (exit code {:?})", task.id, status, result.exit_code);
    }
    if task.exit_code.is_none() {
        task.exit_code = result.exit_code;
    }
    if task.signal.is_none() {
        task.signal = result.signal;
    }

    if !result.output.trim().is_empty() {
        for line in result.output.lines() {
            task.push_line(line.to_string(), max_buffer_lines);
        }
    }
}
