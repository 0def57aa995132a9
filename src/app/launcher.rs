use std::{
    path::Path,
    process::{Command, Stdio},
    sync::Arc,
};

use log::{info, warn};

use crate::exec::{ExecutionHandle, ShellExecutionAdapter};
use crate::manager::TaskManager;
use crate::models::{
    error::{ExecError, Result},
    task::Task,
};

/// Runs `command` through `sh -c` in `cwd` and hands it to the manager.
///
/// If the manager refuses the task the freshly spawned process is killed
/// before the error is returned.
pub fn launch_background(manager: &TaskManager, command: &str, cwd: &Path) -> Result<Task> {
    let child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(ExecError::Spawn)?;

    let handle = Arc::new(ShellExecutionAdapter::new(child)?);
    match manager.register_task(command, cwd.display().to_string(), handle.clone()) {
        Ok(task) => {
            info!("Background task {} started with pid {:?}", task.id, task.pid);
            Ok(task)
        }
        Err(e) => {
            warn!("Discarding process {:?}: {}", handle.pid(), e);
            if let Err(kill_err) = handle.kill() {
                warn!("Failed to stop discarded process: {}", kill_err);
            }
            Err(e)
        }
    }
}
