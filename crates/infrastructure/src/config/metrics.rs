use serde::{Deserialize, Serialize};

/// Prometheus exposition written after each run for a node-exporter
/// textfile collector. Disabled when `textfile_path` is unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    #[serde(default)]
    pub textfile_path: Option<String>,
}
