use std::sync::{Arc, Mutex};

use log::debug;

use super::task_manager::TaskManager;
use crate::models::{config::TaskManagerConfig, error::Result};

/// Owns at most one [`TaskManager`], built on first use.
///
/// Collaborators receive the slot (or the manager it hands out) explicitly
/// instead of reaching for a global. `reset` destroys the current manager so
/// the next `get` starts from an empty registry.
pub struct TaskManagerSlot {
    config: TaskManagerConfig,
    current: Mutex<Option<Arc<TaskManager>>>,
}

impl TaskManagerSlot {
    pub fn new(config: TaskManagerConfig) -> Self {
        Self {
            config,
            current: Mutex::new(None),
        }
    }

    pub fn get(&self) -> Result<Arc<TaskManager>> {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(manager) = current.as_ref() {
            return Ok(Arc::clone(manager));
        }
        let manager = Arc::new(TaskManager::new(self.config.clone())?);
        debug!("Task manager created");
        *current = Some(Arc::clone(&manager));
        Ok(manager)
    }

    pub fn is_initialized(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    pub fn reset(&self) {
        let previous = self
            .current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(manager) = previous {
            manager.destroy();
        }
    }
}

impl Default for TaskManagerSlot {
    fn default() -> Self {
        Self::new(TaskManagerConfig::default())
    }
}
