use std::sync::Mutex;

use crate::secondary::metrics_port::{AuditOutcomeMetrics, WorkflowMetrics};

/// No-op implementation of all metrics sub-traits for use in tests.
pub struct NoopMetrics;

impl WorkflowMetrics for NoopMetrics {}
impl AuditOutcomeMetrics for NoopMetrics {}

/// Metrics double that remembers what was recorded.
#[derive(Default)]
pub struct RecordingMetrics {
    pub runs: Mutex<Vec<String>>,
    pub attempts: Mutex<Vec<(String, String)>>,
    pub health: Mutex<Option<u8>>,
}

impl WorkflowMetrics for RecordingMetrics {
    fn record_run(&self, status: &str) {
        if let Ok(mut runs) = self.runs.lock() {
            runs.push(status.to_string());
        }
    }

    fn record_activity_attempt(&self, activity: &str, result: &str) {
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.push((activity.to_string(), result.to_string()));
        }
    }
}

impl AuditOutcomeMetrics for RecordingMetrics {
    fn set_health_status(&self, status: u8) {
        if let Ok(mut health) = self.health.lock() {
            *health = Some(status);
        }
    }
}
