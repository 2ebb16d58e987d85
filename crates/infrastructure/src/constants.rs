use std::time::Duration;

// ── Paths ──────────────────────────────────────────────────────────

pub const DEFAULT_CONFIG_PATH: &str = "/etc/memory-auditor/config.yaml";

// ── Environment overrides ──────────────────────────────────────────

pub const ENV_PERFORM_CLEANUP: &str = "MEMORY_AUDIT_PERFORM_CLEANUP";
pub const ENV_MAX_DELETION_PERCENTAGE: &str = "MEMORY_AUDIT_MAX_DELETION_PERCENTAGE";
pub const ENV_SIMILARITY_THRESHOLD: &str = "MEMORY_AUDIT_SIMILARITY_THRESHOLD";
pub const ENV_SCHEDULE_INTERVAL_HOURS: &str = "MEMORY_AUDIT_SCHEDULE_INTERVAL_HOURS";

// ── Timeouts ───────────────────────────────────────────────────────

/// How long in-flight runs get to reach a checkpoint after a signal.
pub const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// ── Listing ────────────────────────────────────────────────────────

pub const DEFAULT_RUNS_LIMIT: usize = 20;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_names_share_prefix() {
        for name in [
            ENV_PERFORM_CLEANUP,
            ENV_MAX_DELETION_PERCENTAGE,
            ENV_SIMILARITY_THRESHOLD,
            ENV_SCHEDULE_INTERVAL_HOURS,
        ] {
            assert!(name.starts_with("MEMORY_AUDIT_"), "{name}");
        }
    }

    #[test]
    fn shutdown_timeout_is_reasonable() {
        assert!(GRACEFUL_SHUTDOWN_TIMEOUT.as_secs() >= 1);
        assert!(GRACEFUL_SHUTDOWN_TIMEOUT.as_secs() <= 30);
    }
}
