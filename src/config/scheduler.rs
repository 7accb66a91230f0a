//! Declarative scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::TaskSchedulerType;
use crate::util::validate_name;

/// Serializable mirror of the scheduler builder settings.
///
/// Entries listed in [`WiringConfig::schedulers`](crate::config::WiringConfig)
/// are applied automatically by the model's scheduler builder; builder calls
/// made afterwards take precedence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Scheduler name.
    pub name: String,
    /// Execution discipline.
    #[serde(rename = "type", default)]
    pub scheduler_type: TaskSchedulerType,
    /// Ceiling on unprocessed tasks; unbounded when absent.
    #[serde(default)]
    pub unhandled_task_capacity: Option<u64>,
    /// Whether an external counter applies backpressure to this scheduler.
    #[serde(default)]
    pub external_back_pressure: bool,
    /// Retry sleep for backpressure waits; the model default when absent.
    #[serde(default)]
    pub sleep_duration_ms: Option<u64>,
    /// Whether squelching can be toggled.
    #[serde(default)]
    pub squelching_enabled: bool,
    /// Whether `flush` is supported.
    #[serde(default)]
    pub flushing_enabled: bool,
}

impl SchedulerConfig {
    /// Configuration for `name` with every option at its default.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scheduler_type: TaskSchedulerType::default(),
            unhandled_task_capacity: None,
            external_back_pressure: false,
            sleep_duration_ms: None,
            squelching_enabled: false,
            flushing_enabled: false,
        }
    }

    /// Retry sleep, if configured.
    #[must_use]
    pub fn sleep_duration(&self) -> Option<Duration> {
        self.sleep_duration_ms.map(Duration::from_millis)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        validate_name(&self.name).map_err(|e| e.to_string())?;
        if self.unhandled_task_capacity == Some(0) {
            return Err(format!(
                "scheduler `{}`: unhandled_task_capacity must be greater than 0",
                self.name
            ));
        }
        if self.sleep_duration_ms == Some(0) {
            return Err(format!(
                "scheduler `{}`: sleep_duration_ms must be greater than 0",
                self.name
            ));
        }
        Ok(())
    }

    /// Parse scheduler configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
