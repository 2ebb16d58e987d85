use serde::{Deserialize, Serialize};

/// One of the three backends the auditor reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Document,
    Cache,
    Vector,
}

impl Backend {
    /// All backends in inventory order.
    pub const ALL: [Self; 3] = [Self::Document, Self::Cache, Self::Vector];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Cache => "cache",
            Self::Vector => "vector",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single delete against a store.
///
/// Deleting an id that is already gone is not an error: cleanup must be
/// idempotent across retries and re-runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

pub const NANOS_PER_SEC: u64 = 1_000_000_000;
pub const NANOS_PER_MILLI: u64 = 1_000_000;

/// Returns current wall-clock time as nanoseconds since UNIX epoch.
#[allow(clippy::cast_possible_truncation)]
pub fn current_timestamp_ns() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Whole seconds elapsed between `since_ns` and `now_ns`, saturating at zero
/// when the clock went backwards.
pub fn age_secs(since_ns: u64, now_ns: u64) -> u64 {
    now_ns.saturating_sub(since_ns) / NANOS_PER_SEC
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_display() {
        assert_eq!(Backend::Document.to_string(), "document");
        assert_eq!(Backend::Cache.to_string(), "cache");
        assert_eq!(Backend::Vector.to_string(), "vector");
    }

    #[test]
    fn backend_serializes_snake_case() {
        let json = serde_json::to_string(&Backend::Vector).unwrap();
        assert_eq!(json, "\"vector\"");
    }

    #[test]
    fn age_saturates_on_clock_skew() {
        assert_eq!(age_secs(5 * NANOS_PER_SEC, 2 * NANOS_PER_SEC), 0);
        assert_eq!(age_secs(NANOS_PER_SEC, 11 * NANOS_PER_SEC), 10);
    }

    #[test]
    fn current_timestamp_is_nonzero() {
        assert!(current_timestamp_ns() > 0);
    }
}
