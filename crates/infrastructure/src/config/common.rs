//! Shared parsing helpers and error types used across all config modules.

use std::path::Path;

use tracing::warn;

// ── Security limits ────────────────────────────────────────────────

/// Maximum document collections scanned per run.
pub(super) const MAX_COLLECTIONS: usize = 64;
/// Upper bound on the vectors loaded by the duplicate detector.
pub(super) const MAX_DUPLICATE_SCAN_LIMIT: usize = 100_000;
/// Maximum concurrent activity tasks.
pub(super) const MAX_CONCURRENT_ACTIVITIES: usize = 256;
/// Maximum attempts for a single activity.
pub(super) const MAX_RETRY_ATTEMPTS: u32 = 100;

// ── Config errors ──────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(String),

    #[error("validation error: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("invalid value '{value}' for field '{field}': expected one of {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },
}

impl From<serde_yaml_ng::Error> for ConfigError {
    fn from(e: serde_yaml_ng::Error) -> Self {
        Self::Yaml(e.to_string())
    }
}

impl ConfigError {
    pub(super) fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Log a warning if a file is world-readable (Unix only).
///
/// The config may carry a webhook URL with an embedded token.
#[cfg(unix)]
pub(super) fn warn_if_world_readable(path: &Path, label: &str) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(metadata) = std::fs::metadata(path) {
        let mode = metadata.permissions().mode();
        if mode & 0o004 != 0 {
            warn!(
                path = %path.display(),
                mode = format!("{mode:04o}"),
                "{label} is world-readable, consider chmod 640 or stricter",
            );
        }
    }
}

#[cfg(not(unix))]
pub(super) fn warn_if_world_readable(_path: &Path, _label: &str) {}

/// Enforce a maximum count on a config collection.
pub(super) fn check_limit(field: &str, count: usize, max: usize) -> Result<(), ConfigError> {
    if count > max {
        return Err(ConfigError::validation(
            field,
            format!("count {count} exceeds maximum {max}"),
        ));
    }
    Ok(())
}

/// Reject zero for fields where zero would stall the auditor.
pub(super) fn check_non_zero(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::validation(field, "must be greater than 0"));
    }
    Ok(())
}

/// Reject NaN, infinities and values outside `[min, max]`.
pub(super) fn check_range(field: &str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < min || value > max {
        return Err(ConfigError::validation(
            field,
            format!("{value} must be within {min}..={max}"),
        ));
    }
    Ok(())
}

/// Parse a boolean the way operators write them in env files.
pub(super) fn parse_bool(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            expected: "true, false".to_string(),
        }),
    }
}
