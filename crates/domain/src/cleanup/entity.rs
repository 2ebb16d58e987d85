use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::common::entity::DeleteOutcome;
use crate::common::error::StoreError;
use crate::detection::entity::InconsistencyKind;

/// Outcome of one cleanup executor for one kind.
///
/// Invariant: `succeeded_count + failed_ids.len() <= attempted_count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupResult {
    pub kind: InconsistencyKind,
    pub attempted_count: u64,
    pub succeeded_count: u64,
    pub failed_ids: BTreeSet<String>,
    /// Why the executor did not run, or gave up.
    pub skipped_reason: Option<String>,
}

impl CleanupResult {
    /// Nothing was attempted.
    pub fn skipped(kind: InconsistencyKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            attempted_count: 0,
            succeeded_count: 0,
            failed_ids: BTreeSet::new(),
            skipped_reason: Some(reason.into()),
        }
    }

    /// The executor exhausted its retries; every targeted id counts as
    /// failed.
    pub fn exhausted(kind: InconsistencyKind, ids: &[String], reason: impl Into<String>) -> Self {
        Self {
            kind,
            attempted_count: ids.len() as u64,
            succeeded_count: 0,
            failed_ids: ids.iter().cloned().collect(),
            skipped_reason: Some(reason.into()),
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.succeeded_count + self.failed_ids.len() as u64 <= self.attempted_count
    }
}

/// Accumulates per-id delete outcomes inside an executor.
#[derive(Debug)]
pub struct CleanupTally {
    kind: InconsistencyKind,
    attempted: u64,
    succeeded: u64,
    failed_ids: BTreeSet<String>,
    unavailable: u64,
    last_unavailable: Option<String>,
}

impl CleanupTally {
    pub fn new(kind: InconsistencyKind) -> Self {
        Self {
            kind,
            attempted: 0,
            succeeded: 0,
            failed_ids: BTreeSet::new(),
            unavailable: 0,
            last_unavailable: None,
        }
    }

    /// Record one delete. Already-absent records count as deleted.
    pub fn record(&mut self, id: &str, outcome: Result<DeleteOutcome, StoreError>) {
        self.attempted += 1;
        match outcome {
            Ok(_) | Err(StoreError::NotFound(_)) => self.succeeded += 1,
            Err(StoreError::Unavailable(msg)) => {
                self.unavailable += 1;
                self.last_unavailable = Some(msg);
                self.failed_ids.insert(id.to_string());
            }
            Err(StoreError::Invalid(_)) => {
                self.failed_ids.insert(id.to_string());
            }
        }
    }

    /// Finish the tally. Fails with the last transient error when every
    /// attempted delete hit an unavailable backend, so the caller can retry
    /// the executor as a whole.
    pub fn finish(self) -> Result<CleanupResult, StoreError> {
        if self.attempted > 0 && self.unavailable == self.attempted {
            return Err(StoreError::Unavailable(
                self.last_unavailable
                    .unwrap_or_else(|| "backend unreachable".to_string()),
            ));
        }
        Ok(CleanupResult {
            kind: self.kind,
            attempted_count: self.attempted,
            succeeded_count: self.succeeded,
            failed_ids: self.failed_ids,
            skipped_reason: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KIND: InconsistencyKind = InconsistencyKind::OrphanedVector;

    #[test]
    fn not_found_counts_as_success() {
        let mut tally = CleanupTally::new(KIND);
        for i in 0..8 {
            tally.record(&format!("v{i}"), Ok(DeleteOutcome::Deleted));
        }
        tally.record("v8", Err(StoreError::NotFound("v8".into())));
        tally.record("v9", Ok(DeleteOutcome::NotFound));
        let result = tally.finish().unwrap();
        assert_eq!(result.attempted_count, 10);
        assert_eq!(result.succeeded_count, 10);
        assert!(result.failed_ids.is_empty());
        assert!(result.is_consistent());
    }

    #[test]
    fn partial_failures_are_data() {
        let mut tally = CleanupTally::new(KIND);
        tally.record("a", Ok(DeleteOutcome::Deleted));
        tally.record("b", Err(StoreError::Unavailable("timeout".into())));
        tally.record("c", Err(StoreError::Invalid("bad".into())));
        let result = tally.finish().unwrap();
        assert_eq!(result.succeeded_count, 1);
        let expected: BTreeSet<String> = ["b", "c"].iter().map(|s| (*s).to_string()).collect();
        assert_eq!(result.failed_ids, expected);
        assert!(result.is_consistent());
    }

    #[test]
    fn all_unavailable_is_an_error() {
        let mut tally = CleanupTally::new(KIND);
        tally.record("a", Err(StoreError::Unavailable("refused".into())));
        tally.record("b", Err(StoreError::Unavailable("refused again".into())));
        let err = tally.finish().unwrap_err();
        assert_eq!(err, StoreError::Unavailable("refused again".into()));
    }

    #[test]
    fn empty_tally_is_ok() {
        let result = CleanupTally::new(KIND).finish().unwrap();
        assert_eq!(result.attempted_count, 0);
    }

    #[test]
    fn exhausted_marks_every_id_failed() {
        let ids = vec!["a".to_string(), "b".to_string()];
        let result = CleanupResult::exhausted(KIND, &ids, "retries exhausted");
        assert_eq!(result.attempted_count, 2);
        assert_eq!(result.failed_ids.len(), 2);
        assert!(result.is_consistent());
        assert_eq!(result.skipped_reason.as_deref(), Some("retries exhausted"));
    }

    #[test]
    fn skipped_attempts_nothing() {
        let result = CleanupResult::skipped(KIND, "cap");
        assert_eq!(result.attempted_count, 0);
        assert!(result.is_consistent());
    }
}
