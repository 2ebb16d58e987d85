//! Audit run configuration: detector tuning, safety cap and namespaces.

use domain::workflow::entity::AuditRunConfig;
use serde::{Deserialize, Serialize};

use super::common::{
    ConfigError, MAX_COLLECTIONS, MAX_DUPLICATE_SCAN_LIMIT, check_limit, check_non_zero,
    check_range,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Delete detected inconsistencies. Off by default: runs only report.
    #[serde(default)]
    pub perform_cleanup: bool,

    /// Safety cap per kind, as a percentage of the backend's inventory.
    #[serde(default = "default_max_deletion_percentage")]
    pub max_deletion_percentage: f64,

    /// Cosine similarity above which two vectors count as duplicates.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Records younger than this are never flagged.
    #[serde(default = "default_min_age_secs")]
    pub min_age_secs: u64,

    /// Idle time after which a conversation session counts as expired.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    #[serde(default = "default_schedule_interval_hours")]
    pub schedule_interval_hours: u64,

    /// Document collections inventoried and checked for vector links.
    #[serde(default = "default_collections")]
    pub collections: Vec<String>,

    /// Collections where every document must have an embedding.
    #[serde(default)]
    pub embedded_collections: Vec<String>,

    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    #[serde(default = "default_session_namespace")]
    pub session_namespace: String,

    /// Most recent vectors loaded by the duplicate detector.
    #[serde(default = "default_duplicate_scan_limit")]
    pub duplicate_scan_limit: usize,
}

fn default_max_deletion_percentage() -> f64 {
    5.0
}
fn default_similarity_threshold() -> f64 {
    0.98
}
fn default_min_age_secs() -> u64 {
    600
}
fn default_session_ttl_secs() -> u64 {
    30 * 24 * 60 * 60
}
fn default_schedule_interval_hours() -> u64 {
    24
}
fn default_collections() -> Vec<String> {
    vec!["memories".to_string()]
}
fn default_cache_prefix() -> String {
    "ai:".to_string()
}
fn default_session_namespace() -> String {
    "conversation:".to_string()
}
fn default_duplicate_scan_limit() -> usize {
    1_000
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            perform_cleanup: false,
            max_deletion_percentage: default_max_deletion_percentage(),
            similarity_threshold: default_similarity_threshold(),
            min_age_secs: default_min_age_secs(),
            session_ttl_secs: default_session_ttl_secs(),
            schedule_interval_hours: default_schedule_interval_hours(),
            collections: default_collections(),
            embedded_collections: Vec::new(),
            cache_prefix: default_cache_prefix(),
            session_namespace: default_session_namespace(),
            duplicate_scan_limit: default_duplicate_scan_limit(),
        }
    }
}

impl AuditConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "audit.max_deletion_percentage",
            self.max_deletion_percentage,
            0.0,
            100.0,
        )?;
        check_range(
            "audit.similarity_threshold",
            self.similarity_threshold,
            0.0,
            1.0,
        )?;
        check_non_zero("audit.session_ttl_secs", self.session_ttl_secs)?;
        check_non_zero(
            "audit.schedule_interval_hours",
            self.schedule_interval_hours,
        )?;

        if self.collections.is_empty() {
            return Err(ConfigError::validation(
                "audit.collections",
                "at least one collection is required",
            ));
        }
        check_limit("audit.collections", self.collections.len(), MAX_COLLECTIONS)?;
        for (idx, name) in self.collections.iter().enumerate() {
            validate_collection_name(&format!("audit.collections[{idx}]"), name)?;
        }
        for (idx, name) in self.embedded_collections.iter().enumerate() {
            let field = format!("audit.embedded_collections[{idx}]");
            validate_collection_name(&field, name)?;
            if !self.collections.contains(name) {
                return Err(ConfigError::validation(
                    &field,
                    format!("'{name}' is not listed in audit.collections"),
                ));
            }
        }

        if self.cache_prefix.is_empty() {
            return Err(ConfigError::validation(
                "audit.cache_prefix",
                "must not be empty",
            ));
        }
        if self.session_namespace.is_empty() || self.session_namespace.contains('*') {
            return Err(ConfigError::validation(
                "audit.session_namespace",
                "must be non-empty and free of '*'",
            ));
        }

        check_non_zero(
            "audit.duplicate_scan_limit",
            self.duplicate_scan_limit as u64,
        )?;
        check_limit(
            "audit.duplicate_scan_limit",
            self.duplicate_scan_limit,
            MAX_DUPLICATE_SCAN_LIMIT,
        )?;
        Ok(())
    }

    /// The per-run snapshot handed to the workflow.
    pub fn run_config(&self) -> AuditRunConfig {
        AuditRunConfig {
            perform_cleanup: self.perform_cleanup,
            max_deletion_percentage: self.max_deletion_percentage,
            similarity_threshold: self.similarity_threshold,
            min_age_secs: self.min_age_secs,
            session_ttl_secs: self.session_ttl_secs,
        }
    }
}

fn validate_collection_name(field: &str, name: &str) -> Result<(), ConfigError> {
    if name.is_empty() || name.contains('/') {
        return Err(ConfigError::validation(
            field,
            format!("invalid collection name '{name}'"),
        ));
    }
    Ok(())
}
