use std::io::Read;
use std::os::unix::process::ExitStatusExt;
use std::process::Child;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, warn};

use super::handle::{ExecutionHandle, ExecutionResult, ResultCell};
use super::signal::{is_no_such_process, OsSignaller, ProcessSignaller, Signal};
use crate::models::error::ExecError;

pub const GRACEFUL_KILL_TIMEOUT: Duration = Duration::from_millis(2000);

const READ_CHUNK: usize = 8 * 1024;

/// Wraps a spawned child process as an [`ExecutionHandle`].
///
/// Stdout and stderr are drained on their own threads into one buffer, in
/// the order chunks arrive. A waiter thread owns the child, reaps it, and
/// publishes the result once both streams hit EOF.
pub struct ShellExecutionAdapter {
    pid: u32,
    result: Arc<ResultCell>,
    // Never carries a message; disconnects when the process has closed.
    closed: Receiver<()>,
    aborted: Arc<AtomicBool>,
    kill_timeout: Duration,
}

impl ShellExecutionAdapter {
    pub fn new(mut child: Child) -> Result<Self, ExecError> {
        let pid = child.id();
        if pid == 0 {
            return Err(ExecError::MissingPid);
        }

        let output = Arc::new(Mutex::new(String::new()));
        let aborted = Arc::new(AtomicBool::new(false));
        let result = Arc::new(ResultCell::default());
        let (closed_tx, closed_rx) = bounded::<()>(0);

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(format!("bg-stdout-{}", pid), stdout, &output)?);
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(format!("bg-stderr-{}", pid), stderr, &output)?);
        }

        let waiter_output = Arc::clone(&output);
        let waiter_aborted = Arc::clone(&aborted);
        let waiter_result = Arc::clone(&result);
        thread::Builder::new()
            .name(format!("bg-wait-{}", pid))
            .spawn(move || {
                wait_for_close(child, readers, waiter_output, waiter_aborted, waiter_result, closed_tx)
            })
            .map_err(ExecError::Spawn)?;

        Ok(Self {
            pid,
            result,
            closed: closed_rx,
            aborted,
            kill_timeout: GRACEFUL_KILL_TIMEOUT,
        })
    }

    /// Overrides how long `kill` waits after SIGTERM before sending SIGKILL.
    pub fn with_kill_timeout(mut self, timeout: Duration) -> Self {
        self.kill_timeout = timeout;
        self
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.closed.try_recv(), Err(TryRecvError::Disconnected))
    }

    fn signal(&self, signal: Signal) -> Result<(), ExecError> {
        match OsSignaller.send(self.pid, signal) {
            Ok(()) => Ok(()),
            Err(e) if is_no_such_process(&e) => Ok(()),
            Err(e) => Err(ExecError::Signal(e)),
        }
    }
}

impl ExecutionHandle for ShellExecutionAdapter {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn result(&self) -> Receiver<ExecutionResult> {
        self.result.subscribe()
    }

    fn kill(&self) -> Result<(), ExecError> {
        if self.is_closed() {
            return Ok(());
        }
        self.aborted.store(true, Ordering::SeqCst);

        self.signal(Signal::Terminate)?;
        if let Err(RecvTimeoutError::Timeout) = self.closed.recv_timeout(self.kill_timeout) {
            debug!("Process {} ignored SIGTERM, sending SIGKILL", self.pid);
            self.signal(Signal::Kill)?;
            let _ = self.closed.recv();
        }
        Ok(())
    }
}

fn spawn_reader<R>(
    name: String,
    mut stream: R,
    output: &Arc<Mutex<String>>,
) -> Result<JoinHandle<()>, ExecError>
where
    R: Read + Send + 'static,
{
    let output = Arc::clone(output);
    thread::Builder::new()
        .name(name)
        .spawn(move || {
            let mut buf = [0u8; READ_CHUNK];
            loop {
                match stream.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        let chunk = String::from_utf8_lossy(&buf[..n]);
                        output
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .push_str(&chunk);
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!("Stopped reading process output: {}", e);
                        break;
                    }
                }
            }
        })
        .map_err(ExecError::Spawn)
}

fn wait_for_close(
    mut child: Child,
    readers: Vec<JoinHandle<()>>,
    output: Arc<Mutex<String>>,
    aborted: Arc<AtomicBool>,
    result: Arc<ResultCell>,
    closed: Sender<()>,
) {
    let status = child.wait();
    for reader in readers {
        let _ = reader.join();
    }
    let output = output.lock().unwrap_or_else(|e| e.into_inner()).clone();
    let aborted = aborted.load(Ordering::SeqCst);

    let outcome = match status {
        Ok(status) => ExecutionResult {
            exit_code: status.code(),
            signal: status.signal(),
            aborted,
            error: None,
            output,
        },
        Err(e) => ExecutionResult {
            exit_code: Some(1),
            signal: None,
            aborted,
            error: Some(e.to_string()),
            output,
        },
    };
    debug!("Process {} closed: {:?}", child.id(), outcome.exit_code);

    // The result is visible before `closed` disconnects.
    result.fulfill(outcome);
    drop(closed);
}
