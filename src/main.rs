use std::process::ExitCode;

use bgtask::app::cli;
use bgtask::{TaskManagerConfig, TaskManagerSlot, TaskStatus};
use log::error;

fn main() -> ExitCode {
    env_logger::init();

    let config = match TaskManagerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let slot = TaskManagerSlot::new(config);
    let manager = match slot.get() {
        Ok(manager) => manager,
        Err(e) => {
            eprintln!("Failed to start task manager: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = cli::run_cli(&manager);
    for task in manager.list_tasks(Some(TaskStatus::Running)) {
        if let Err(e) = manager.kill_task(&task.id) {
            error!("{}", e);
        }
    }
    slot.reset();
    if let Err(e) = result {
        error!("Console failed: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
