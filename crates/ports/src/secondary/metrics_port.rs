// Sub-traits for recording audit metrics.
//
// All methods take `&self`; the Prometheus implementation uses atomics.
// Default implementations are no-ops so test doubles only override what
// they assert on.

// ── Workflow execution metrics ─────────────────────────────────────

pub trait WorkflowMetrics: Send + Sync {
    /// Record a finished run (`completed` or `failed`).
    fn record_run(&self, _status: &str) {}

    /// Record one activity attempt and its result (`success`, `failure`,
    /// `timeout`).
    fn record_activity_attempt(&self, _activity: &str, _result: &str) {}
}

// ── Audit outcome metrics ──────────────────────────────────────────

pub trait AuditOutcomeMetrics: Send + Sync {
    /// Set the number of inconsistencies found by the latest run.
    fn set_inconsistencies(&self, _kind: &str, _count: u64) {}

    /// Add records removed by a cleanup executor.
    fn record_cleanup_deleted(&self, _kind: &str, _count: u64) {}

    /// Set the latest health status. 0=healthy, 1=degraded, 2=critical.
    fn set_health_status(&self, _status: u8) {}
}

/// Unified metrics port composing the sub-traits.
///
/// Services accept `Arc<dyn MetricsPort>`.
pub trait MetricsPort: WorkflowMetrics + AuditOutcomeMetrics {}

impl<T> MetricsPort for T where T: WorkflowMetrics + AuditOutcomeMetrics {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_port_is_object_safe() {
        fn _check(port: &dyn MetricsPort) {
            port.record_run("completed");
            port.record_activity_attempt("inventory/document", "success");
            port.set_inconsistencies("orphaned_vector", 3);
            port.record_cleanup_deleted("expired_session", 2);
            port.set_health_status(1);
        }
    }

    #[test]
    fn default_methods_are_noops() {
        struct Empty;
        impl WorkflowMetrics for Empty {}
        impl AuditOutcomeMetrics for Empty {}
        let port: &dyn MetricsPort = &Empty;
        port.record_run("failed");
        port.set_health_status(2);
    }
}
