use domain::cleanup::entity::{CleanupResult, CleanupTally};
use domain::common::entity::DeleteOutcome;
use domain::common::error::StoreError;
use domain::detection::entity::InconsistencyKind;
use domain::workflow::error::ActivityError;
use ports::secondary::store_accessor::StoreAccessor;

use super::AuditActivities;

/// Companion keys of a session, below the cache prefix.
pub const CHAT_KEY_PREFIX: &str = "chat:";
pub const MESSAGE_IDS_KEY_PREFIX: &str = "message_ids:";
pub const MESSAGE_KEY_PREFIX: &str = "message:";

impl AuditActivities {
    /// Dispatch to the executor registered for `kind`.
    pub async fn cleanup(
        &self,
        kind: InconsistencyKind,
        ids: &[String],
    ) -> Result<CleanupResult, ActivityError> {
        match kind {
            InconsistencyKind::OrphanedVector => self.cleanup_orphaned_vectors(ids).await,
            InconsistencyKind::ExpiredSession => self.cleanup_expired_conversations(ids).await,
            other => Err(ActivityError::Validation(format!(
                "no cleanup executor for {other}"
            ))),
        }
    }

    pub async fn cleanup_orphaned_vectors(
        &self,
        ids: &[String],
    ) -> Result<CleanupResult, ActivityError> {
        let mut tally = CleanupTally::new(InconsistencyKind::OrphanedVector);
        for id in ids {
            let outcome = self.vectors.delete(id).await;
            if let Err(e) = &outcome {
                tracing::warn!(vector_id = %id, error = %e, "vector delete failed");
            }
            tally.record(id, outcome);
        }
        let result = tally.finish()?;
        tracing::info!(
            attempted = result.attempted_count,
            succeeded = result.succeeded_count,
            failed = result.failed_ids.len(),
            "orphaned vector cleanup done"
        );
        Ok(result)
    }

    /// Remove expired sessions together with their chat history, message
    /// list and message bodies.
    pub async fn cleanup_expired_conversations(
        &self,
        ids: &[String],
    ) -> Result<CleanupResult, ActivityError> {
        let mut tally = CleanupTally::new(InconsistencyKind::ExpiredSession);
        for id in ids {
            let outcome = self.delete_session(id).await;
            if let Err(e) = &outcome {
                tracing::warn!(session_id = %id, error = %e, "session delete failed");
            }
            tally.record(id, outcome);
        }
        let result = tally.finish()?;
        tracing::info!(
            attempted = result.attempted_count,
            succeeded = result.succeeded_count,
            failed = result.failed_ids.len(),
            "expired session cleanup done"
        );
        Ok(result)
    }

    /// Outcome of the session key itself. A companion key that is already
    /// gone does not fail the session.
    async fn delete_session(&self, session_id: &str) -> Result<DeleteOutcome, StoreError> {
        let prefix = &self.settings.cache_prefix;
        let session_key = self.settings.session_key(session_id);

        let mut companions = vec![
            format!("{prefix}{CHAT_KEY_PREFIX}{session_id}"),
            format!("{prefix}{MESSAGE_IDS_KEY_PREFIX}{session_id}"),
        ];
        companions.extend(
            self.cache
                .scan(&format!("{prefix}{MESSAGE_KEY_PREFIX}{session_id}:*"))
                .await?,
        );
        for key in &companions {
            match self.cache.delete(key).await {
                Ok(_) | Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        self.cache.delete(&session_key).await
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::{DAY_NS, Fixture};
    use domain::common::error::StoreError;
    use domain::detection::entity::InconsistencyKind;
    use domain::workflow::error::ActivityError;

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn not_found_counts_as_success() {
        let fixture = Fixture::new();
        fixture.seed_orphan_vectors(3);
        fixture.vectors.plan.not_found_on_delete(["orphan-1"]);

        let result = fixture
            .activities()
            .cleanup_orphaned_vectors(&ids(&["orphan-0", "orphan-1", "orphan-2"]))
            .await
            .unwrap();

        assert_eq!(result.attempted_count, 3);
        assert_eq!(result.succeeded_count, 3);
        assert!(result.failed_ids.is_empty());
        assert!(result.is_consistent());
    }

    #[tokio::test]
    async fn individual_failures_are_listed() {
        let fixture = Fixture::new();
        fixture.seed_orphan_vectors(3);
        fixture
            .vectors
            .plan
            .fail_delete_of(["orphan-2"], StoreError::Invalid("bad id".into()));

        let result = fixture
            .activities()
            .cleanup_orphaned_vectors(&ids(&["orphan-0", "orphan-1", "orphan-2"]))
            .await
            .unwrap();

        assert_eq!(result.succeeded_count, 2);
        assert_eq!(result.failed_ids.iter().collect::<Vec<_>>(), vec!["orphan-2"]);
        assert!(!fixture.vectors.inner.contains("orphan-0"));
    }

    #[tokio::test]
    async fn unreachable_backend_is_an_error() {
        let fixture = Fixture::new();
        fixture.seed_orphan_vectors(2);
        fixture.vectors.plan.fail_all_deletes(true);

        let err = fixture
            .activities()
            .cleanup_orphaned_vectors(&ids(&["orphan-0", "orphan-1"]))
            .await
            .unwrap_err();

        assert_eq!(err.error_type(), "unavailable");
    }

    #[tokio::test]
    async fn conversation_cleanup_removes_companion_keys() {
        let fixture = Fixture::new();
        fixture.seed_session("c1", 40 * DAY_NS);
        for key in ["ai:chat:c1", "ai:message_ids:c1", "ai:message:c1:1", "ai:message:c1:2", "ai:chat:c2"] {
            fixture.seed_cache_key(key);
        }

        let result = fixture
            .activities()
            .cleanup_expired_conversations(&ids(&["c1"]))
            .await
            .unwrap();

        assert_eq!(result.succeeded_count, 1);
        for key in ["ai:conversation:c1", "ai:chat:c1", "ai:message_ids:c1", "ai:message:c1:1", "ai:message:c1:2"] {
            assert!(!fixture.cache.inner.contains(key), "{key} survived");
        }
        assert!(fixture.cache.inner.contains("ai:chat:c2"));
    }

    #[tokio::test]
    async fn conversation_already_gone_is_success() {
        let fixture = Fixture::new();

        let result = fixture
            .activities()
            .cleanup_expired_conversations(&ids(&["vanished"]))
            .await
            .unwrap();

        assert_eq!(result.succeeded_count, 1);
    }

    #[tokio::test]
    async fn kinds_without_executor_are_rejected() {
        let fixture = Fixture::new();
        let err = fixture
            .activities()
            .cleanup(InconsistencyKind::MissingEmbedding, &ids(&["memories/m1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ActivityError::Validation(_)));
    }
}
