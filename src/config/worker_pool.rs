//! Worker pool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for a [`WorkerPool`](crate::core::WorkerPool).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Target number of unblocked workers.
    pub worker_count: usize,
    /// Prefix for worker thread names; the worker id is appended.
    pub thread_name_prefix: String,
    /// Stack size of each worker thread in bytes.
    pub thread_stack_size: usize,
    /// Extra workers that may be started while others are blocked.
    pub max_compensating_threads: usize,
    /// How long a surplus worker idles before retiring, in milliseconds.
    pub keep_alive_ms: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get(),
            thread_name_prefix: "wiring-worker".to_string(),
            thread_stack_size: 2 * 1024 * 1024,
            max_compensating_threads: 256,
            keep_alive_ms: 1_000,
        }
    }
}

impl WorkerPoolConfig {
    /// Defaults: one worker per CPU.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of workers.
    #[must_use]
    pub const fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the worker stack size in bytes.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = bytes;
        self
    }

    /// Set the compensation limit.
    #[must_use]
    pub const fn with_max_compensating_threads(mut self, max: usize) -> Self {
        self.max_compensating_threads = max;
        self
    }

    /// Set the surplus-worker keep-alive.
    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive_ms = u64::try_from(keep_alive.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Surplus-worker keep-alive as a duration.
    #[must_use]
    pub const fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.thread_name_prefix.is_empty() {
            return Err("thread_name_prefix must not be empty".into());
        }
        if self.thread_stack_size < 64 * 1024 {
            return Err("thread_stack_size must be at least 64 KiB".into());
        }
        if self.keep_alive_ms == 0 {
            return Err("keep_alive_ms must be greater than 0".into());
        }
        Ok(())
    }
}
