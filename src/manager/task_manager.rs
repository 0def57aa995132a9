use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{bounded, unbounded, Sender};
use log::{debug, info, warn};

use crate::exec::{is_no_such_process, ExecutionHandle, OsSignaller, ProcessSignaller, Signal};
use crate::models::{
    config::TaskManagerConfig,
    error::{Result, TaskError},
    message::TaskMessage,
    task::{Task, TaskId, TaskStatus},
};
use crate::worker::worker::{
    lock, remove_expired, spawn_cleanup_ticker, spawn_monitor, spawn_worker_thread, Registry,
};

/// Registry and scheduler for background tasks.
///
/// Every mutation of a task record goes through the registry lock. Results
/// from monitors are applied by one worker thread, so a task reaches its
/// terminal status exactly once no matter who races for it.
pub struct TaskManager {
    tasks: Arc<Registry>,
    sender: Sender<TaskMessage>,
    config: TaskManagerConfig,
    signaller: Arc<dyn ProcessSignaller>,
    cleanup: Mutex<Option<CleanupTicker>>,
    closed: AtomicBool,
}

struct CleanupTicker {
    // Never sent on; dropping it stops the ticker.
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

impl TaskManager {
    pub fn new(config: TaskManagerConfig) -> Result<Self> {
        Self::with_signaller(config, Arc::new(OsSignaller))
    }

    pub fn with_signaller(
        config: TaskManagerConfig,
        signaller: Arc<dyn ProcessSignaller>,
    ) -> Result<Self> {
        let tasks: Arc<Registry> = Arc::default();
        let (sender, receiver) = unbounded();
        spawn_worker_thread(receiver, Arc::clone(&tasks), config.max_buffer_lines)
            .map_err(TaskError::Spawn)?;

        let (stop, stop_rx) = bounded(0);
        let ticker = spawn_cleanup_ticker(
            Arc::downgrade(&tasks),
            config.cleanup_interval,
            config.cleanup_after,
            stop_rx,
        )
        .map_err(TaskError::Spawn)?;

        Ok(TaskManager {
            tasks,
            sender,
            config,
            signaller,
            cleanup: Mutex::new(Some(CleanupTicker { stop, thread: ticker })),
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &TaskManagerConfig {
        &self.config
    }

    /// Admits a new task and starts monitoring its handle.
    ///
    /// Fails with [`TaskError::CapacityExceeded`] when `max_concurrent_tasks`
    /// tasks are already running; nothing is recorded in that case.
    pub fn register_task(
        &self,
        command: impl Into<String>,
        cwd: impl Into<String>,
        handle: Arc<dyn ExecutionHandle>,
    ) -> Result<Task> {
        let mut tasks = lock(&self.tasks);
        // Checked under the lock: `destroy` raises the flag before it takes
        // the lock to clear the registry.
        if self.closed.load(Ordering::SeqCst) {
            return Err(TaskError::ManagerClosed);
        }
        let running = tasks
            .values()
            .filter(|task| task.status == TaskStatus::Running)
            .count();
        if running >= self.config.max_concurrent_tasks {
            warn!(
                "Rejecting task: {} of {} slots in use",
                running, self.config.max_concurrent_tasks
            );
            return Err(TaskError::CapacityExceeded {
                limit: self.config.max_concurrent_tasks,
            });
        }

        let task = Task::new(command.into(), cwd.into(), handle);
        spawn_monitor(task.id, Arc::clone(&task.handle), self.sender.clone())
            .map_err(TaskError::Spawn)?;
        tasks.insert(task.id, task.clone());
        info!("Task '{}' registered (pid {:?}): {}", task.id, task.pid, task.command);
        Ok(task)
    }

    pub fn get_task(&self, id: &TaskId) -> Option<Task> {
        lock(&self.tasks).get(id).cloned()
    }

    /// Buffered lines from `from_position` to the end; empty when the
    /// position is past the end, `None` for an unknown task.
    pub fn get_output(&self, id: &TaskId, from_position: usize) -> Option<Vec<String>> {
        lock(&self.tasks).get(id).map(|task| task.output_from(from_position))
    }

    /// Lines not yet returned by a previous call; advances the read cursor.
    pub fn read_new_output(&self, id: &TaskId) -> Option<Vec<String>> {
        let mut tasks = lock(&self.tasks);
        let task = tasks.get_mut(id)?;
        let lines = task.output_from(task.last_read_position);
        task.last_read_position = task.output_buffer.len();
        Some(lines)
    }

    pub fn append_output(&self, id: &TaskId, line: impl Into<String>) -> bool {
        match lock(&self.tasks).get_mut(id) {
            Some(task) => {
                task.push_line(line.into(), self.config.max_buffer_lines);
                true
            }
            None => false,
        }
    }

    /// Terminates a running task: SIGTERM, a grace window, then SIGKILL if
    /// the process is still alive.
    ///
    /// Returns `Ok(false)` for unknown or already finished tasks. A process
    /// that vanished before it could be signalled is recorded as completed
    /// and also yields `Ok(false)`.
    pub fn kill_task(&self, id: &TaskId) -> Result<bool> {
        let pid = {
            let mut tasks = lock(&self.tasks);
            let Some(task) = tasks.get_mut(id) else {
                return Ok(false);
            };
            if task.status != TaskStatus::Running {
                return Ok(false);
            }
            let pid = task.pid.ok_or(TaskError::MissingPid(*id))?;
            task.kill_requested = true;
            pid
        };

        let outcome = terminate(self.signaller.as_ref(), pid, self.config.kill_grace);

        let mut tasks = lock(&self.tasks);
        match outcome {
            Ok(()) => {
                if let Some(task) = tasks.get_mut(id) {
                    task.finish(TaskStatus::Killed);
                    if task.status == TaskStatus::Killed {
                        task.signal = Some(Signal::Terminate.number());
                    }
                }
                info!("Task '{}' killed.", id);
                Ok(true)
            }
            Err(e) if is_no_such_process(&e) => {
                debug!("Task '{}' exited before it could be killed", id);
                if let Some(task) = tasks.get_mut(id) {
                    task.kill_requested = false;
                    task.finish(TaskStatus::Completed);
                }
                Ok(false)
            }
            Err(source) => {
                if let Some(task) = tasks.get_mut(id) {
                    task.kill_requested = false;
                }
                Err(TaskError::Signal { id: *id, source })
            }
        }
    }

    /// All tasks, or only those in `status`, in registry order.
    pub fn list_tasks(&self, status: Option<TaskStatus>) -> Vec<Task> {
        lock(&self.tasks)
            .values()
            .filter(|task| status.map_or(true, |s| task.status == s))
            .cloned()
            .collect()
    }

    pub fn remove_task(&self, id: &TaskId) -> bool {
        lock(&self.tasks).remove(id).is_some()
    }

    /// Drops finished tasks older than `cleanup_after`; running tasks are
    /// never touched. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let removed = remove_expired(&self.tasks, self.config.cleanup_after);
        if removed > 0 {
            info!("Cleaned up {} finished task(s)", removed);
        }
        removed
    }

    /// Stops auto-cleanup and the worker, empties the registry, and fires
    /// termination at every process that was still running without waiting
    /// for it to finish.
    pub fn destroy(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop_background();

        let pids: Vec<u32> = {
            let mut tasks = lock(&self.tasks);
            let pids = tasks
                .values()
                .filter(|task| task.status == TaskStatus::Running)
                .filter_map(|task| task.pid)
                .collect();
            tasks.clear();
            pids
        };
        info!("Task manager destroyed, terminating {} running task(s)", pids.len());
        if pids.is_empty() {
            return;
        }

        let signaller = Arc::clone(&self.signaller);
        let grace = self.config.kill_grace;
        let spawned = thread::Builder::new()
            .name("bg-task-reaper".into())
            .spawn(move || terminate_all(signaller.as_ref(), &pids, grace));
        if let Err(e) = spawned {
            warn!("Could not start reaper thread: {}", e);
        }
    }

    fn stop_background(&self) {
        let ticker = self
            .cleanup
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(CleanupTicker { stop, thread }) = ticker {
            drop(stop);
            if thread.join().is_err() {
                warn!("Cleanup ticker panicked");
            }
        }
        let _ = self.sender.send(TaskMessage::Shutdown);
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.stop_background();
    }
}

fn terminate(signaller: &dyn ProcessSignaller, pid: u32, grace: Duration) -> io::Result<()> {
    signaller.send(pid, Signal::Terminate)?;
    thread::sleep(grace);
    if signaller.send(pid, Signal::Probe).is_ok() {
        signaller.send(pid, Signal::Kill)?;
    }
    Ok(())
}

fn terminate_all(signaller: &dyn ProcessSignaller, pids: &[u32], grace: Duration) {
    let signalled: Vec<u32> = pids
        .iter()
        .copied()
        .filter(|pid| signaller.send(*pid, Signal::Terminate).is_ok())
        .collect();
    thread::sleep(grace);
    for pid in signalled {
        if signaller.send(pid, Signal::Probe).is_ok() {
            let _ = signaller.send(pid, Signal::Kill);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::{exited, FakeHandle};
    use crate::exec::ExecutionResult;
    use std::time::Instant;

    /// Records every signal; answers the liveness probe as configured.
    #[derive(Default)]
    struct RecordingSignaller {
        calls: Mutex<Vec<(u32, Signal)>>,
        alive_after_term: bool,
        term_errno: Option<i32>,
    }

    impl RecordingSignaller {
        fn alive() -> Arc<Self> {
            Arc::new(Self { alive_after_term: true, ..Default::default() })
        }

        fn failing(errno: i32) -> Arc<Self> {
            Arc::new(Self { term_errno: Some(errno), ..Default::default() })
        }

        fn calls(&self) -> Vec<(u32, Signal)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ProcessSignaller for RecordingSignaller {
        fn send(&self, pid: u32, signal: Signal) -> io::Result<()> {
            self.calls.lock().unwrap().push((pid, signal));
            match signal {
                Signal::Terminate => match self.term_errno {
                    Some(errno) => Err(io::Error::from_raw_os_error(errno)),
                    None => Ok(()),
                },
                Signal::Probe if !self.alive_after_term => {
                    Err(io::Error::from_raw_os_error(libc::ESRCH))
                }
                _ => Ok(()),
            }
        }
    }

    fn config() -> TaskManagerConfig {
        TaskManagerConfig::default()
            .with_max_buffer_lines(100)
            .with_cleanup_after(Duration::from_millis(1000))
            .with_max_concurrent_tasks(5)
            .with_kill_grace(Duration::from_millis(5))
    }

    fn manager_with(signaller: Arc<RecordingSignaller>) -> TaskManager {
        TaskManager::with_signaller(config(), signaller).unwrap()
    }

    fn manager() -> TaskManager {
        manager_with(RecordingSignaller::alive())
    }

    fn pending(pid: u32) -> Arc<FakeHandle> {
        Arc::new(FakeHandle::pending(Some(pid)))
    }

    fn wait_until<F: Fn() -> bool>(condition: F) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn status_of(manager: &TaskManager, id: &TaskId) -> Option<TaskStatus> {
        manager.get_task(id).map(|task| task.status)
    }

    #[test]
    fn registers_running_task_with_unique_id() {
        let manager = manager();
        let first = manager.register_task("echo test", "/tmp", pending(12345)).unwrap();
        let second = manager.register_task("cmd2", "/tmp", pending(222)).unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(first.command, "echo test");
        assert_eq!(first.cwd, "/tmp");
        assert_eq!(first.pid, Some(12345));
        assert_eq!(first.status, TaskStatus::Running);
        assert!(first.output_buffer.is_empty());
        assert_eq!(first.last_read_position, 0);
        assert_eq!(manager.get_task(&first.id).unwrap().id, first.id);
    }

    #[test]
    fn completed_result_flushes_output() {
        let manager = manager();
        let handle = Arc::new(FakeHandle::resolved(111, exited(0, "hello")));
        let task = manager.register_task("echo hello", "/tmp", handle).unwrap();

        wait_until(|| status_of(&manager, &task.id) == Some(TaskStatus::Completed));
        let task = manager.get_task(&task.id).unwrap();
        assert_eq!(task.exit_code, Some(0));
        assert_eq!(task.signal, None);
        assert_eq!(manager.get_output(&task.id, 0).unwrap(), vec!["hello"]);
    }

    #[test]
    fn other_readers_of_the_result_do_not_starve_the_monitor() {
        let manager = manager();
        let handle = pending(111);
        let before = handle.result();
        let task = manager.register_task("echo hello", "/tmp", handle.clone()).unwrap();
        let after = handle.result();

        handle.resolve(exited(0, "hello\n"));
        for reader in [before, after] {
            let seen = reader.recv_timeout(Duration::from_secs(5)).unwrap();
            assert_eq!(seen.exit_code, Some(0));
        }

        wait_until(|| status_of(&manager, &task.id) == Some(TaskStatus::Completed));
        let task = manager.get_task(&task.id).unwrap();
        assert_eq!(task.exit_code, Some(0));
        assert!(task.error.is_none());
        assert_eq!(task.output_buffer, vec!["hello"]);
    }

    #[test]
    fn error_result_marks_task_failed() {
        let manager = manager();
        let result = ExecutionResult {
            exit_code: Some(1),
            error: Some("Command failed".into()),
            ..Default::default()
        };
        let task = manager
            .register_task("failing-cmd", "/tmp", Arc::new(FakeHandle::resolved(1, result)))
            .unwrap();

        wait_until(|| status_of(&manager, &task.id) == Some(TaskStatus::Failed));
        assert_eq!(manager.get_task(&task.id).unwrap().error.as_deref(), Some("Command failed"));
    }

    #[test]
    fn abandoned_result_is_recorded_as_failure() {
        let manager = manager();
        let task = manager
            .register_task("lost", "/tmp", Arc::new(FakeHandle::abandoned(5)))
            .unwrap();

        wait_until(|| status_of(&manager, &task.id) == Some(TaskStatus::Failed));
        assert!(manager.get_task(&task.id).unwrap().error.is_some());
    }

    #[test]
    fn capacity_is_enforced_until_a_slot_frees() {
        let manager = manager();
        let handles: Vec<_> = (0..5).map(|i| pending(1000 + i)).collect();
        let ids: Vec<_> = handles
            .iter()
            .map(|h| manager.register_task("cmd", "/tmp", h.clone()).unwrap().id)
            .collect();

        let err = manager.register_task("cmd6", "/tmp", pending(9999)).unwrap_err();
        assert!(matches!(err, TaskError::CapacityExceeded { limit: 5 }));
        assert!(err.to_string().contains("Maximum concurrent tasks limit reached"));
        assert_eq!(manager.list_tasks(None).len(), 5);

        handles[0].resolve(exited(0, ""));
        wait_until(|| status_of(&manager, &ids[0]) == Some(TaskStatus::Completed));
        assert!(manager.register_task("cmd6", "/tmp", pending(9999)).is_ok());
    }

    #[test]
    fn fifty_default_slots_then_kill_frees_one() {
        let manager = TaskManager::with_signaller(
            TaskManagerConfig::default().with_kill_grace(Duration::from_millis(1)),
            RecordingSignaller::alive(),
        )
        .unwrap();
        let ids: Vec<_> = (0..50)
            .map(|i| manager.register_task("sleep", "/tmp", pending(2000 + i)).unwrap().id)
            .collect();

        assert!(manager.register_task("one more", "/tmp", pending(3000)).is_err());
        assert!(manager.kill_task(&ids[17]).unwrap());
        assert!(manager.register_task("one more", "/tmp", pending(3000)).is_ok());
    }

    #[test]
    fn get_output_slices_from_position() {
        let manager = manager();
        let task = manager.register_task("echo", "/tmp", pending(1)).unwrap();
        for line in ["line 1", "line 2", "line 3"] {
            assert!(manager.append_output(&task.id, line));
        }

        assert_eq!(manager.get_output(&task.id, 0).unwrap(), vec!["line 1", "line 2", "line 3"]);
        assert_eq!(manager.get_output(&task.id, 2).unwrap(), vec!["line 3"]);
        assert!(manager.get_output(&task.id, 3).unwrap().is_empty());
        assert!(manager.get_output(&task.id, 10).unwrap().is_empty());
        assert!(manager.get_output(&TaskId::new_v4(), 0).is_none());
    }

    #[test]
    fn append_output_caps_buffer_and_keeps_latest() {
        let manager = manager();
        let task = manager.register_task("yes", "/tmp", pending(1)).unwrap();
        for i in 0..150 {
            manager.append_output(&task.id, format!("line {}", i));
        }

        let output = manager.get_output(&task.id, 0).unwrap();
        assert_eq!(output.len(), 100);
        assert_eq!(output.first().map(String::as_str), Some("line 50"));
        assert_eq!(output.last().map(String::as_str), Some("line 149"));
        assert!(!manager.append_output(&TaskId::new_v4(), "x"));
    }

    #[test]
    fn read_new_output_is_incremental() {
        let manager = manager();
        let task = manager.register_task("tail", "/tmp", pending(1)).unwrap();
        manager.append_output(&task.id, "a");
        manager.append_output(&task.id, "b");
        assert_eq!(manager.read_new_output(&task.id).unwrap(), vec!["a", "b"]);
        assert!(manager.read_new_output(&task.id).unwrap().is_empty());

        manager.append_output(&task.id, "c");
        assert_eq!(manager.read_new_output(&task.id).unwrap(), vec!["c"]);
        assert_eq!(manager.get_task(&task.id).unwrap().last_read_position, 3);
    }

    #[test]
    fn kill_escalates_when_process_survives_grace() {
        let signaller = RecordingSignaller::alive();
        let manager = manager_with(Arc::clone(&signaller));
        let task = manager.register_task("sleep 100", "/tmp", pending(4242)).unwrap();

        assert!(manager.kill_task(&task.id).unwrap());
        assert_eq!(
            signaller.calls(),
            vec![(4242, Signal::Terminate), (4242, Signal::Probe), (4242, Signal::Kill)]
        );
        let task = manager.get_task(&task.id).unwrap();
        assert_eq!(task.status, TaskStatus::Killed);
        assert_eq!(task.signal, Some(15));
    }

    #[test]
    fn kill_skips_sigkill_when_process_exits_in_grace() {
        let signaller = Arc::new(RecordingSignaller::default());
        let manager = manager_with(Arc::clone(&signaller));
        let task = manager.register_task("sleep 100", "/tmp", pending(7)).unwrap();

        assert!(manager.kill_task(&task.id).unwrap());
        assert_eq!(signaller.calls(), vec![(7, Signal::Terminate), (7, Signal::Probe)]);
        assert_eq!(status_of(&manager, &task.id), Some(TaskStatus::Killed));
    }

    #[test]
    fn kill_of_finished_task_changes_nothing() {
        let signaller = RecordingSignaller::alive();
        let manager = manager_with(Arc::clone(&signaller));
        let handle = Arc::new(FakeHandle::resolved(8, exited(3, "done")));
        let task = manager.register_task("true", "/tmp", handle).unwrap();
        wait_until(|| status_of(&manager, &task.id) == Some(TaskStatus::Completed));
        let before = manager.get_task(&task.id).unwrap();

        assert!(!manager.kill_task(&task.id).unwrap());
        let after = manager.get_task(&task.id).unwrap();
        assert_eq!(after.status, before.status);
        assert_eq!(after.exit_code, Some(3));
        assert_eq!(after.signal, before.signal);
        assert_eq!(after.output_buffer, before.output_buffer);
        assert!(signaller.calls().is_empty());
        assert!(!manager.kill_task(&TaskId::new_v4()).unwrap());
    }

    #[test]
    fn vanished_process_is_recorded_as_completed() {
        let manager = manager_with(RecordingSignaller::failing(libc::ESRCH));
        let task = manager.register_task("gone", "/tmp", pending(9)).unwrap();

        assert!(!manager.kill_task(&task.id).unwrap());
        assert_eq!(status_of(&manager, &task.id), Some(TaskStatus::Completed));
    }

    #[test]
    fn other_signal_failures_are_surfaced() {
        let manager = manager_with(RecordingSignaller::failing(libc::EPERM));
        let task = manager.register_task("root-owned", "/tmp", pending(1)).unwrap();

        let err = manager.kill_task(&task.id).unwrap_err();
        assert!(matches!(err, TaskError::Signal { id, .. } if id == task.id));
        assert_eq!(status_of(&manager, &task.id), Some(TaskStatus::Running));
    }

    #[test]
    fn kill_without_pid_is_an_error() {
        let manager = manager();
        let task = manager
            .register_task("ghost", "/tmp", Arc::new(FakeHandle::pending(None)))
            .unwrap();
        assert!(matches!(manager.kill_task(&task.id), Err(TaskError::MissingPid(_))));
    }

    #[test]
    fn list_tasks_filters_by_status() {
        let manager = manager();
        let running = manager.register_task("a", "/tmp", pending(1)).unwrap();
        let done = manager
            .register_task("b", "/tmp", Arc::new(FakeHandle::resolved(2, exited(0, ""))))
            .unwrap();
        wait_until(|| status_of(&manager, &done.id) == Some(TaskStatus::Completed));

        assert_eq!(manager.list_tasks(None).len(), 2);
        let listed = manager.list_tasks(Some(TaskStatus::Running));
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, running.id);
        assert!(manager.list_tasks(Some(TaskStatus::Killed)).is_empty());
    }

    #[test]
    fn remove_task_deletes_once() {
        let manager = manager();
        let task = manager.register_task("a", "/tmp", pending(1)).unwrap();
        assert!(manager.remove_task(&task.id));
        assert!(!manager.remove_task(&task.id));
        assert!(manager.get_task(&task.id).is_none());
    }

    #[test]
    fn cleanup_removes_only_old_finished_tasks() {
        let manager = TaskManager::with_signaller(
            config().with_cleanup_after(Duration::from_millis(1)),
            RecordingSignaller::alive(),
        )
        .unwrap();
        let running = manager.register_task("a", "/tmp", pending(1)).unwrap();
        let done = manager
            .register_task("b", "/tmp", Arc::new(FakeHandle::resolved(2, exited(0, ""))))
            .unwrap();
        wait_until(|| status_of(&manager, &done.id) == Some(TaskStatus::Completed));
        thread::sleep(Duration::from_millis(10));

        assert_eq!(manager.cleanup(), 1);
        assert!(manager.get_task(&done.id).is_none());
        assert!(manager.get_task(&running.id).is_some());
        assert_eq!(manager.cleanup(), 0);
    }

    #[test]
    fn cleanup_keeps_recent_finished_tasks() {
        let manager = manager();
        let done = manager
            .register_task("b", "/tmp", Arc::new(FakeHandle::resolved(2, exited(0, ""))))
            .unwrap();
        wait_until(|| status_of(&manager, &done.id) == Some(TaskStatus::Completed));
        assert_eq!(manager.cleanup(), 0);
    }

    #[test]
    fn auto_cleanup_runs_on_interval() {
        let manager = TaskManager::with_signaller(
            config()
                .with_cleanup_after(Duration::from_millis(1))
                .with_cleanup_interval(Duration::from_millis(20)),
            RecordingSignaller::alive(),
        )
        .unwrap();
        let done = manager
            .register_task("b", "/tmp", Arc::new(FakeHandle::resolved(2, exited(0, ""))))
            .unwrap();
        wait_until(|| manager.get_task(&done.id).is_none());
    }

    #[test]
    fn destroy_clears_registry_and_terminates_running() {
        let signaller = RecordingSignaller::alive();
        let manager = manager_with(Arc::clone(&signaller));
        manager.register_task("a", "/tmp", pending(31)).unwrap();
        manager.register_task("b", "/tmp", pending(32)).unwrap();

        manager.destroy();
        assert!(manager.list_tasks(None).is_empty());
        assert!(matches!(
            manager.register_task("c", "/tmp", pending(33)),
            Err(TaskError::ManagerClosed)
        ));

        wait_until(|| signaller.calls().iter().filter(|(_, s)| *s == Signal::Kill).count() == 2);
        let terminated: Vec<u32> = signaller
            .calls()
            .into_iter()
            .filter(|(_, s)| *s == Signal::Terminate)
            .map(|(pid, _)| pid)
            .collect();
        assert_eq!(terminated.len(), 2);
        assert!(terminated.contains(&31) && terminated.contains(&32));

        manager.destroy();
    }

    #[test]
    fn destroy_stops_cleanup_ticker() {
        let manager = TaskManager::with_signaller(
            config().with_cleanup_interval(Duration::from_millis(10)),
            RecordingSignaller::alive(),
        )
        .unwrap();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(Arc::weak_count(&manager.tasks), 1);

        manager.destroy();
        assert_eq!(Arc::weak_count(&manager.tasks), 0);
        assert!(manager.cleanup.lock().unwrap().is_none());
    }

    #[test]
    fn register_waiting_on_lock_sees_concurrent_destroy() {
        let manager = Arc::new(manager());
        let guard = lock(&manager.tasks);
        let registering = {
            let manager = Arc::clone(&manager);
            thread::spawn(move || manager.register_task("late", "/tmp", pending(77)).map(|t| t.id))
        };

        // `destroy` raises the flag before it needs the lock.
        thread::sleep(Duration::from_millis(50));
        manager.closed.store(true, Ordering::SeqCst);
        drop(guard);

        assert!(matches!(registering.join().unwrap(), Err(TaskError::ManagerClosed)));
        assert!(manager.list_tasks(None).is_empty());
    }
}
