use std::env;
use std::str::FromStr;
use std::time::Duration;

use super::error::ConfigError;

pub const DEFAULT_MAX_BUFFER_LINES: usize = 10_000;
pub const DEFAULT_CLEANUP_AFTER: Duration = Duration::from_millis(3_600_000);
pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 50;
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_millis(3_600_000);
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_millis(200);

const ENV_MAX_BUFFER_LINES: &str = "BGTASK_MAX_BUFFER_LINES";
const ENV_CLEANUP_AFTER_MS: &str = "BGTASK_CLEANUP_AFTER_MS";
const ENV_MAX_CONCURRENT_TASKS: &str = "BGTASK_MAX_CONCURRENT_TASKS";
const ENV_CLEANUP_INTERVAL_MS: &str = "BGTASK_CLEANUP_INTERVAL_MS";

/// Settings fixed for the lifetime of a task manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskManagerConfig {
    /// Lines kept per task before the oldest are evicted.
    pub max_buffer_lines: usize,
    /// Age after which finished tasks are dropped by cleanup.
    pub cleanup_after: Duration,
    /// Ceiling on tasks in the running state.
    pub max_concurrent_tasks: usize,
    pub cleanup_interval: Duration,
    /// Wait between the graceful and the forceful signal in `kill_task`.
    pub kill_grace: Duration,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self {
            max_buffer_lines: DEFAULT_MAX_BUFFER_LINES,
            cleanup_after: DEFAULT_CLEANUP_AFTER,
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }
}

impl TaskManagerConfig {
    pub fn with_max_buffer_lines(mut self, lines: usize) -> Self {
        self.max_buffer_lines = lines;
        self
    }

    pub fn with_cleanup_after(mut self, after: Duration) -> Self {
        self.cleanup_after = after;
        self
    }

    pub fn with_max_concurrent_tasks(mut self, limit: usize) -> Self {
        self.max_concurrent_tasks = limit;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Defaults overridden by `BGTASK_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(lines) = parse(&lookup, ENV_MAX_BUFFER_LINES)? {
            config.max_buffer_lines = lines;
        }
        if let Some(ms) = parse(&lookup, ENV_CLEANUP_AFTER_MS)? {
            config.cleanup_after = Duration::from_millis(ms);
        }
        if let Some(limit) = parse(&lookup, ENV_MAX_CONCURRENT_TASKS)? {
            config.max_concurrent_tasks = limit;
        }
        if let Some(ms) = parse::<u64, _>(&lookup, ENV_CLEANUP_INTERVAL_MS)? {
            if ms == 0 {
                return Err(ConfigError::Invalid {
                    key: ENV_CLEANUP_INTERVAL_MS,
                    value: ms.to_string(),
                });
            }
            config.cleanup_interval = Duration::from_millis(ms);
        }
        Ok(config)
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}
