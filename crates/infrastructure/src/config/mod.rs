//! Auditor configuration: structs, parsing, environment overrides and
//! validation.
//!
//! The config module is split across several sub-modules:
//! - `common`: shared helpers and `ConfigError`
//! - `audit`, `workflow`, `stores`, `notification`, `metrics`: one per
//!   top-level section

mod audit;
mod common;
mod metrics;
mod notification;
mod stores;
mod workflow;

pub use audit::AuditConfig;
pub use common::ConfigError;
pub use metrics::MetricsConfig;
pub use notification::{NotificationConfig, NotificationKind};
pub use stores::{StoreBackend, StoresConfig};
pub use workflow::{RetryConfig, StageTimeouts, WorkflowConfig};

use std::path::Path;

use domain::workflow::entity::AuditRunConfig;
use serde::{Deserialize, Serialize};

use crate::constants::{
    ENV_MAX_DELETION_PERCENTAGE, ENV_PERFORM_CLEANUP, ENV_SCHEDULE_INTERVAL_HOURS,
    ENV_SIMILARITY_THRESHOLD,
};
use common::{parse_bool, warn_if_world_readable};

// ── Top-level config ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditorConfig {
    #[serde(default)]
    pub agent: AgentInfo,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,

    #[serde(default)]
    pub stores: StoresConfig,

    #[serde(default)]
    pub notification: NotificationConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl AuditorConfig {
    /// Load config from a YAML file, then apply `MEMORY_AUDIT_*`
    /// environment overrides.
    ///
    /// On Unix, logs a warning if the config file is world-readable,
    /// since the webhook URL may embed a token.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        warn_if_world_readable(path, "config file");
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for runs without a file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse config from a YAML string. An empty document yields the
    /// defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml_ng::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_env_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`, then re-validate.
    ///
    /// Only the four run-level options are recognized; everything else
    /// comes from the file.
    pub fn apply_env_overrides_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup(ENV_PERFORM_CLEANUP) {
            self.audit.perform_cleanup = parse_bool(ENV_PERFORM_CLEANUP, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_DELETION_PERCENTAGE) {
            self.audit.max_deletion_percentage = parse_number(ENV_MAX_DELETION_PERCENTAGE, &value)?;
        }
        if let Some(value) = lookup(ENV_SIMILARITY_THRESHOLD) {
            self.audit.similarity_threshold = parse_number(ENV_SIMILARITY_THRESHOLD, &value)?;
        }
        if let Some(value) = lookup(ENV_SCHEDULE_INTERVAL_HOURS) {
            self.audit.schedule_interval_hours = parse_number(ENV_SCHEDULE_INTERVAL_HOURS, &value)?;
        }
        self.validate()
    }

    /// Return a copy of the config with sensitive values masked.
    #[must_use]
    pub fn sanitized(&self) -> Self {
        let mut sanitized = self.clone();
        if sanitized.notification.webhook_url.is_some() {
            sanitized.notification.webhook_url = Some("***".to_string());
        }
        sanitized
    }

    /// Validate the config after deserialization.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.audit.validate()?;
        self.workflow.validate()?;
        self.stores.validate()?;
        self.notification.validate()?;
        if let Some(path) = &self.metrics.textfile_path
            && path.is_empty()
        {
            return Err(ConfigError::validation(
                "metrics.textfile_path",
                "must not be empty when set",
            ));
        }
        Ok(())
    }

    /// Run configuration for manual and scheduled runs.
    pub fn run_config(&self) -> AuditRunConfig {
        self.audit.run_config()
    }

    /// `true` when the stores live in the checkpoint journal's file.
    pub fn stores_share_checkpoint_file(&self) -> bool {
        self.stores.backend == StoreBackend::Redb
            && Path::new(&self.stores.path) == Path::new(&self.workflow.checkpoint_path)
    }
}

fn parse_number<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::validation(field, format!("'{value}' is not a valid number")))
}

// ── Agent section ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentInfo {
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

impl Default for AgentInfo {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}
fn default_log_format() -> LogFormat {
    LogFormat::Json
}

// ── Log level ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Error => tracing::Level::ERROR,
            Self::Warn => tracing::Level::WARN,
            Self::Info => tracing::Level::INFO,
            Self::Debug => tracing::Level::DEBUG,
            Self::Trace => tracing::Level::TRACE,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(format!(
                "invalid log level '{s}': expected error|warn|info|debug|trace"
            )),
        }
    }
}

// ── Log format ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "pretty" => Ok(Self::Text),
            _ => Err(format!("invalid log format '{s}': expected json|text")),
        }
    }
}
