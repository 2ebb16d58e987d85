//! Durable execution settings: per-stage timeouts, retry policy, worker
//! pool size and the checkpoint journal.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::common::{
    ConfigError, MAX_CONCURRENT_ACTIVITIES, MAX_RETRY_ATTEMPTS, check_limit, check_non_zero,
    check_range,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub timeouts: StageTimeouts,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default = "default_max_concurrent_activities")]
    pub max_concurrent_activities: usize,

    /// redb file holding run records and step results.
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: String,

    /// Finished runs kept in the journal; older ones are pruned.
    #[serde(default = "default_retain_runs")]
    pub retain_runs: usize,
}

fn default_max_concurrent_activities() -> usize {
    8
}
fn default_checkpoint_path() -> String {
    "data/checkpoints.redb".to_string()
}
fn default_retain_runs() -> usize {
    100
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            timeouts: StageTimeouts::default(),
            retry: RetryConfig::default(),
            max_concurrent_activities: default_max_concurrent_activities(),
            checkpoint_path: default_checkpoint_path(),
            retain_runs: default_retain_runs(),
        }
    }
}

impl WorkflowConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        self.timeouts.validate()?;
        self.retry.validate()?;
        check_non_zero(
            "workflow.max_concurrent_activities",
            self.max_concurrent_activities as u64,
        )?;
        check_limit(
            "workflow.max_concurrent_activities",
            self.max_concurrent_activities,
            MAX_CONCURRENT_ACTIVITIES,
        )?;
        if self.checkpoint_path.is_empty() {
            return Err(ConfigError::validation(
                "workflow.checkpoint_path",
                "must not be empty",
            ));
        }
        check_non_zero("workflow.retain_runs", self.retain_runs as u64)
    }
}

/// Start-to-close timeout per activity, by stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageTimeouts {
    #[serde(default = "default_inventory_secs")]
    pub inventory_secs: u64,
    #[serde(default = "default_detection_secs")]
    pub detection_secs: u64,
    #[serde(default = "default_cleanup_secs")]
    pub cleanup_secs: u64,
    #[serde(default = "default_report_secs")]
    pub report_secs: u64,
    #[serde(default = "default_notify_secs")]
    pub notify_secs: u64,
}

fn default_inventory_secs() -> u64 {
    300
}
fn default_detection_secs() -> u64 {
    600
}
fn default_cleanup_secs() -> u64 {
    600
}
fn default_report_secs() -> u64 {
    300
}
fn default_notify_secs() -> u64 {
    30
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            inventory_secs: default_inventory_secs(),
            detection_secs: default_detection_secs(),
            cleanup_secs: default_cleanup_secs(),
            report_secs: default_report_secs(),
            notify_secs: default_notify_secs(),
        }
    }
}

impl StageTimeouts {
    fn validate(&self) -> Result<(), ConfigError> {
        check_non_zero("workflow.timeouts.inventory_secs", self.inventory_secs)?;
        check_non_zero("workflow.timeouts.detection_secs", self.detection_secs)?;
        check_non_zero("workflow.timeouts.cleanup_secs", self.cleanup_secs)?;
        check_non_zero("workflow.timeouts.report_secs", self.report_secs)?;
        check_non_zero("workflow.timeouts.notify_secs", self.notify_secs)
    }

    pub fn inventory(&self) -> Duration {
        Duration::from_secs(self.inventory_secs)
    }
    pub fn detection(&self) -> Duration {
        Duration::from_secs(self.detection_secs)
    }
    pub fn cleanup(&self) -> Duration {
        Duration::from_secs(self.cleanup_secs)
    }
    pub fn report(&self) -> Duration {
        Duration::from_secs(self.report_secs)
    }
    pub fn notify(&self) -> Duration {
        Duration::from_secs(self.notify_secs)
    }
}

/// Exponential backoff shared by every activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    #[serde(default = "default_maximum_attempts")]
    pub maximum_attempts: u32,
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,
    #[serde(default = "default_backoff_coefficient")]
    pub backoff_coefficient: f64,
    #[serde(default = "default_maximum_interval_ms")]
    pub maximum_interval_ms: u64,
    /// Error types that fail immediately (`validation`, `not_found`, ...).
    #[serde(default = "default_non_retryable_errors")]
    pub non_retryable_errors: Vec<String>,
}

fn default_maximum_attempts() -> u32 {
    3
}
fn default_initial_interval_ms() -> u64 {
    1_000
}
fn default_backoff_coefficient() -> f64 {
    2.0
}
fn default_maximum_interval_ms() -> u64 {
    10_000
}
fn default_non_retryable_errors() -> Vec<String> {
    vec!["validation".to_string(), "not_found".to_string()]
}

/// Error types activities can fail with.
const KNOWN_ERROR_TYPES: &[&str] = &[
    "unavailable",
    "timeout",
    "validation",
    "not_found",
    "internal",
    "cancelled",
];

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            maximum_attempts: default_maximum_attempts(),
            initial_interval_ms: default_initial_interval_ms(),
            backoff_coefficient: default_backoff_coefficient(),
            maximum_interval_ms: default_maximum_interval_ms(),
            non_retryable_errors: default_non_retryable_errors(),
        }
    }
}

impl RetryConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        check_non_zero(
            "workflow.retry.maximum_attempts",
            u64::from(self.maximum_attempts),
        )?;
        if self.maximum_attempts > MAX_RETRY_ATTEMPTS {
            return Err(ConfigError::validation(
                "workflow.retry.maximum_attempts",
                format!("must be at most {MAX_RETRY_ATTEMPTS}"),
            ));
        }
        check_range(
            "workflow.retry.backoff_coefficient",
            self.backoff_coefficient,
            1.0,
            100.0,
        )?;
        if self.maximum_interval_ms < self.initial_interval_ms {
            return Err(ConfigError::validation(
                "workflow.retry.maximum_interval_ms",
                "must not be lower than initial_interval_ms",
            ));
        }
        for (idx, name) in self.non_retryable_errors.iter().enumerate() {
            if !KNOWN_ERROR_TYPES.contains(&name.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: format!("workflow.retry.non_retryable_errors[{idx}]"),
                    value: name.clone(),
                    expected: KNOWN_ERROR_TYPES.join(", "),
                });
            }
        }
        Ok(())
    }

    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn maximum_interval(&self) -> Duration {
        Duration::from_millis(self.maximum_interval_ms)
    }
}
