use std::path::{Path, PathBuf};

use ports::secondary::metrics_port::{AuditOutcomeMetrics, WorkflowMetrics};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

// ── Label types ─────────────────────────────────────────────────────

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StatusLabels {
    pub status: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct AttemptLabels {
    pub activity: String,
    pub result: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct KindLabels {
    pub kind: String,
}

// ── Auditor metrics registry ────────────────────────────────────────

/// Prometheus metrics registry for the auditor.
///
/// All metric families use interior mutability (atomics), so recording
/// metrics only requires `&self`. The registry itself is NOT Clone,
/// wrap in `Arc` for multi-task sharing.
///
/// With a textfile path set, every finished run rewrites the file.
pub struct AuditorMetrics {
    registry: Registry,
    textfile: Option<PathBuf>,
    pub runs_total: Family<StatusLabels, Counter>,
    pub activity_attempts_total: Family<AttemptLabels, Counter>,
    pub inconsistencies: Family<KindLabels, Gauge>,
    pub cleanup_deleted_total: Family<KindLabels, Counter>,
    pub health_status: Gauge,
}

impl AuditorMetrics {
    /// Create a new metrics registry with all metrics registered under
    /// the `audit` prefix.
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("audit");

        let runs_total = Family::<StatusLabels, Counter>::default();
        registry.register(
            "runs",
            "Finished audit runs by terminal status",
            runs_total.clone(),
        );

        let activity_attempts_total = Family::<AttemptLabels, Counter>::default();
        registry.register(
            "activity_attempts",
            "Activity attempts by activity and result",
            activity_attempts_total.clone(),
        );

        let inconsistencies = Family::<KindLabels, Gauge>::default();
        registry.register(
            "inconsistencies",
            "Inconsistencies found by the latest run",
            inconsistencies.clone(),
        );

        let cleanup_deleted_total = Family::<KindLabels, Counter>::default();
        registry.register(
            "cleanup_deleted",
            "Records removed by cleanup executors",
            cleanup_deleted_total.clone(),
        );

        let health_status = Gauge::default();
        registry.register(
            "health_status",
            "Health of the latest run (0=healthy, 1=degraded, 2=critical)",
            health_status.clone(),
        );

        Self {
            registry,
            textfile: None,
            runs_total,
            activity_attempts_total,
            inconsistencies,
            cleanup_deleted_total,
            health_status,
        }
    }

    #[must_use]
    pub fn with_textfile(mut self, path: impl Into<PathBuf>) -> Self {
        self.textfile = Some(path.into());
        self
    }

    /// Encode all registered metrics to `OpenMetrics` text format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        prometheus_client::encoding::text::encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }

    /// Write the exposition for a textfile collector.
    ///
    /// Goes through a sibling temp file and a rename so the collector
    /// never reads a half-written file.
    pub fn write_textfile(&self, path: &Path) -> std::io::Result<()> {
        let body = self.encode().map_err(std::io::Error::other)?;
        let tmp = path.with_extension("prom.tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, path)
    }
}

impl Default for AuditorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

// ── Sub-trait implementations ──────────────────────────────────────

impl WorkflowMetrics for AuditorMetrics {
    fn record_run(&self, status: &str) {
        self.runs_total
            .get_or_create(&StatusLabels {
                status: status.to_string(),
            })
            .inc();
        if let Some(path) = &self.textfile
            && let Err(e) = self.write_textfile(path)
        {
            tracing::warn!(path = %path.display(), error = %e, "failed to write metrics textfile");
        }
    }

    fn record_activity_attempt(&self, activity: &str, result: &str) {
        self.activity_attempts_total
            .get_or_create(&AttemptLabels {
                activity: activity.to_string(),
                result: result.to_string(),
            })
            .inc();
    }
}

impl AuditOutcomeMetrics for AuditorMetrics {
    fn set_inconsistencies(&self, kind: &str, count: u64) {
        self.inconsistencies
            .get_or_create(&KindLabels {
                kind: kind.to_string(),
            })
            .set(count.try_into().unwrap_or(i64::MAX));
    }

    fn record_cleanup_deleted(&self, kind: &str, count: u64) {
        self.cleanup_deleted_total
            .get_or_create(&KindLabels {
                kind: kind.to_string(),
            })
            .inc_by(count);
    }

    fn set_health_status(&self, status: u8) {
        self.health_status.set(i64::from(status));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ports::secondary::metrics_port::MetricsPort;

    use super::*;

    #[test]
    fn new_creates_valid_registry() {
        let metrics = AuditorMetrics::new();
        let encoded = metrics.encode().unwrap();
        // Should contain EOF marker (OpenMetrics format)
        assert!(encoded.contains("# EOF"));
        assert!(encoded.contains("audit_health_status"));
    }

    #[test]
    fn run_counter_appears_with_status_label() {
        let metrics = AuditorMetrics::new();
        metrics.record_run("completed");
        metrics.record_run("completed");
        metrics.record_run("failed");
        let encoded = metrics.encode().unwrap();
        assert!(encoded.contains(r#"audit_runs_total{status="completed"} 2"#));
        assert!(encoded.contains(r#"audit_runs_total{status="failed"} 1"#));
    }

    #[test]
    fn activity_attempts_are_labelled() {
        let metrics = AuditorMetrics::new();
        metrics.record_activity_attempt("inventory/vector", "timeout");
        let encoded = metrics.encode().unwrap();
        assert!(encoded.contains(
            r#"audit_activity_attempts_total{activity="inventory/vector",result="timeout"} 1"#
        ));
    }

    #[test]
    fn inconsistency_gauge_is_overwritten() {
        let metrics = AuditorMetrics::new();
        metrics.set_inconsistencies("orphaned_vector", 15);
        metrics.set_inconsistencies("orphaned_vector", 3);
        let encoded = metrics.encode().unwrap();
        assert!(encoded.contains(r#"audit_inconsistencies{kind="orphaned_vector"} 3"#));
    }

    #[test]
    fn cleanup_counter_accumulates() {
        let metrics = AuditorMetrics::new();
        metrics.record_cleanup_deleted("expired_session", 4);
        metrics.record_cleanup_deleted("expired_session", 6);
        let encoded = metrics.encode().unwrap();
        assert!(encoded.contains(r#"audit_cleanup_deleted_total{kind="expired_session"} 10"#));
    }

    #[test]
    fn health_status_gauge() {
        let metrics = AuditorMetrics::new();
        metrics.set_health_status(2);
        assert_eq!(metrics.health_status.get(), 2);
    }

    #[test]
    fn usable_as_metrics_port() {
        let port: Arc<dyn MetricsPort> = Arc::new(AuditorMetrics::new());
        port.record_run("completed");
        port.set_health_status(1);
    }

    #[test]
    fn write_textfile_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory_audit.prom");
        let metrics = AuditorMetrics::new();
        metrics.set_health_status(1);
        metrics.write_textfile(&path).unwrap();
        metrics.set_health_status(0);
        metrics.write_textfile(&path).unwrap();

        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.contains("audit_health_status 0"));
        assert!(!dir.path().join("memory_audit.prom.tmp").exists());
    }

    #[test]
    fn finished_run_flushes_configured_textfile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory_audit.prom");
        let metrics = AuditorMetrics::new().with_textfile(&path);
        metrics.set_inconsistencies("orphaned_vector", 15);
        assert!(!path.exists());

        metrics.record_run("completed");
        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.contains(r#"audit_inconsistencies{kind="orphaned_vector"} 15"#));
        assert!(body.contains(r#"audit_runs_total{status="completed"} 1"#));
    }

    #[test]
    fn unwritable_textfile_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let metrics = AuditorMetrics::new().with_textfile(dir.path().join("missing/dir/x.prom"));
        metrics.record_run("failed");
        assert_eq!(
            metrics
                .runs_total
                .get_or_create(&StatusLabels {
                    status: "failed".to_string()
                })
                .get(),
            1
        );
    }
}
