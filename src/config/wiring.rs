//! Model-level configuration.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::config::{SchedulerConfig, WorkerPoolConfig};
use crate::core::AppResult;

/// Environment variable overriding the default pool's parallelism.
pub const ENV_POOL_PARALLELISM: &str = "WIRING_POOL_PARALLELISM";
/// Environment variable overriding the default retry sleep (ms).
pub const ENV_SLEEP_DURATION_MS: &str = "WIRING_SLEEP_DURATION_MS";
/// Environment variable overriding the heartbeat poll interval (ms).
pub const ENV_HEARTBEAT_POLL_MS: &str = "WIRING_HEARTBEAT_POLL_MS";

/// Defaults shared by every scheduler a model builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WiringConfig {
    /// Settings for the model's default worker pool.
    pub pool: WorkerPoolConfig,
    /// Retry sleep for backpressure and flush waits, in milliseconds.
    pub default_sleep_duration_ms: u64,
    /// Longest the heartbeat thread sleeps between checks, in milliseconds.
    pub heartbeat_poll_ms: u64,
    /// Per-scheduler settings, matched by name.
    pub schedulers: Vec<SchedulerConfig>,
}

impl Default for WiringConfig {
    fn default() -> Self {
        Self {
            pool: WorkerPoolConfig::default(),
            default_sleep_duration_ms: 1,
            heartbeat_poll_ms: 10,
            schedulers: Vec::new(),
        }
    }
}

impl WiringConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the default pool settings.
    #[must_use]
    pub fn with_pool(mut self, pool: WorkerPoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Add a per-scheduler entry.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.schedulers.push(scheduler);
        self
    }

    /// Default retry sleep.
    #[must_use]
    pub const fn default_sleep_duration(&self) -> Duration {
        Duration::from_millis(self.default_sleep_duration_ms)
    }

    /// Heartbeat poll interval.
    #[must_use]
    pub const fn heartbeat_poll(&self) -> Duration {
        Duration::from_millis(self.heartbeat_poll_ms)
    }

    /// Entry for the scheduler called `name`.
    #[must_use]
    pub fn scheduler(&self, name: &str) -> Option<&SchedulerConfig> {
        self.schedulers.iter().find(|entry| entry.name == name)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        self.pool.validate().map_err(|e| format!("pool invalid: {e}"))?;
        if self.default_sleep_duration_ms == 0 {
            return Err("default_sleep_duration_ms must be greater than 0".into());
        }
        if self.heartbeat_poll_ms == 0 {
            return Err("heartbeat_poll_ms must be greater than 0".into());
        }
        let mut seen = HashSet::new();
        for scheduler in &self.schedulers {
            scheduler.validate()?;
            if !seen.insert(scheduler.name.as_str()) {
                return Err(format!("scheduler `{}` configured twice", scheduler.name));
            }
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, parsed or validated.
    pub fn from_json_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading wiring config {}", path.display()))?;
        Self::from_json_str(&contents)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("loading wiring config {}", path.display()))
    }

    /// Defaults overridden by environment variables, after loading `.env` if present.
    ///
    /// # Errors
    ///
    /// Returns a message if a variable is not a number or the result is invalid.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by values from `lookup`, keyed by the `WIRING_*` variable names.
    ///
    /// # Errors
    ///
    /// Returns a message if a value is not a number or the result is invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let mut cfg = Self::default();
        if let Some(parallelism) = parse_var(&lookup, ENV_POOL_PARALLELISM)? {
            cfg.pool.worker_count = usize::try_from(parallelism)
                .map_err(|_| format!("{ENV_POOL_PARALLELISM} out of range"))?;
        }
        if let Some(sleep) = parse_var(&lookup, ENV_SLEEP_DURATION_MS)? {
            cfg.default_sleep_duration_ms = sleep;
        }
        if let Some(poll) = parse_var(&lookup, ENV_HEARTBEAT_POLL_MS)? {
            cfg.heartbeat_poll_ms = poll;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_var(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>, String> {
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map_err(|e| format!("{key}=`{raw}` is not a valid number: {e}"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TaskSchedulerType;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let cfg = WiringConfig::new();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.default_sleep_duration(), Duration::from_millis(1));
        assert_eq!(cfg.heartbeat_poll(), Duration::from_millis(10));
    }

    #[test]
    fn parses_nested_json() {
        let cfg = WiringConfig::from_json_str(
            r#"{
                "pool": { "worker_count": 3 },
                "heartbeat_poll_ms": 5,
                "schedulers": [
                    { "name": "ingest", "type": "SEQUENTIAL_THREAD", "unhandled_task_capacity": 16 }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.pool.worker_count, 3);
        assert_eq!(cfg.pool.thread_name_prefix, "wiring-worker");
        assert_eq!(cfg.heartbeat_poll_ms, 5);
        let ingest = cfg.scheduler("ingest").unwrap();
        assert_eq!(ingest.scheduler_type, TaskSchedulerType::SequentialThread);
        assert!(cfg.scheduler("missing").is_none());
    }

    #[test]
    fn rejects_duplicate_scheduler_entries() {
        let cfg = WiringConfig::new()
            .with_scheduler(SchedulerConfig::new("a"))
            .with_scheduler(SchedulerConfig::new("a"));
        assert!(cfg.validate().unwrap_err().contains("configured twice"));
    }

    #[test]
    fn lookup_overrides_defaults() {
        let vars: HashMap<&str, &str> = [
            (ENV_POOL_PARALLELISM, "2"),
            (ENV_SLEEP_DURATION_MS, " 5 "),
            (ENV_HEARTBEAT_POLL_MS, "20"),
        ]
        .into_iter()
        .collect();
        let cfg = WiringConfig::from_lookup(|key| vars.get(key).map(|v| (*v).to_string())).unwrap();
        assert_eq!(cfg.pool.worker_count, 2);
        assert_eq!(cfg.default_sleep_duration_ms, 5);
        assert_eq!(cfg.heartbeat_poll_ms, 20);
    }

    #[test]
    fn lookup_rejects_garbage() {
        let err = WiringConfig::from_lookup(|key| (key == ENV_POOL_PARALLELISM).then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.contains(ENV_POOL_PARALLELISM));

        let err = WiringConfig::from_lookup(|key| (key == ENV_POOL_PARALLELISM).then(|| "0".to_string()))
            .unwrap_err();
        assert!(err.contains("worker_count"));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = WiringConfig::from_json_file("/nonexistent/wiring.json").unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/wiring.json"));
    }
}
