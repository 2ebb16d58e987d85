use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use domain::common::entity::current_timestamp_ns;
use domain::workflow::error::ActivityError;
use ports::secondary::checkpoint_store::CheckpointStore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::retry::ActivityOptions;
use crate::worker::ActivityWorker;

/// Execution context of one durable workflow instance.
///
/// Every activity result is journaled under `(workflow_id, step_key)`
/// before the workflow moves on. Re-running the same workflow id replays
/// journaled results instead of executing the activity again, so a run
/// interrupted at any point resumes after its last completed step.
#[derive(Clone)]
pub struct WorkflowContext {
    workflow_id: String,
    checkpoints: Arc<dyn CheckpointStore>,
    worker: ActivityWorker,
    cancel: CancellationToken,
}

impl WorkflowContext {
    pub fn new(
        workflow_id: impl Into<String>,
        checkpoints: Arc<dyn CheckpointStore>,
        worker: ActivityWorker,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            checkpoints,
            worker,
            cancel,
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Execute an activity exactly once per step key.
    ///
    /// A result that cannot be journaled is still returned: the activity's
    /// effects already happened. The step then executes again on replay,
    /// which every activity tolerates.
    pub async fn execute_activity<T, F, Fut>(
        &self,
        step_key: &str,
        options: &ActivityOptions,
        f: F,
    ) -> Result<T, ActivityError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ActivityError>> + Send + 'static,
    {
        if let Some(value) = self.replay(step_key)? {
            return Ok(value);
        }
        if self.cancel.is_cancelled() {
            return Err(ActivityError::Cancelled);
        }

        let value = tokio::select! {
            () = self.cancel.cancelled() => return Err(ActivityError::Cancelled),
            result = self.worker.execute(step_key, options, f) => result?,
        };

        let journaled = serde_json::to_vec(&value)
            .map_err(|e| e.to_string())
            .and_then(|payload| {
                self.checkpoints
                    .save_step(&self.workflow_id, step_key, &payload)
                    .map_err(|e| e.to_string())
            });
        if let Err(error) = journaled {
            tracing::error!(
                workflow_id = %self.workflow_id,
                step = step_key,
                error = %error,
                "step completed but not journaled, it executes again on replay"
            );
        }
        Ok(value)
    }

    /// Durable timer. The wake-up deadline is journaled on first call, so
    /// a restarted workflow only sleeps for what is left of it.
    pub async fn sleep(&self, step_key: &str, duration: Duration) -> Result<(), ActivityError> {
        let now = current_timestamp_ns();
        let wake_at = if let Some(at) = self.replay::<u64>(step_key)? {
            at
        } else {
            let at = now.saturating_add(u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX));
            let payload = serde_json::to_vec(&at)
                .map_err(|e| ActivityError::Internal(format!("encode timer {step_key}: {e}")))?;
            self.checkpoints
                .save_step(&self.workflow_id, step_key, &payload)?;
            at
        };

        let remaining = Duration::from_nanos(wake_at.saturating_sub(now));
        if remaining.is_zero() {
            return Ok(());
        }
        tracing::debug!(
            workflow_id = %self.workflow_id,
            step = step_key,
            remaining_secs = remaining.as_secs(),
            "workflow sleeping"
        );

        tokio::select! {
            () = self.cancel.cancelled() => Err(ActivityError::Cancelled),
            () = tokio::time::sleep(remaining) => Ok(()),
        }
    }

    fn replay<T: DeserializeOwned>(&self, step_key: &str) -> Result<Option<T>, ActivityError> {
        let Some(payload) = self.checkpoints.load_step(&self.workflow_id, step_key)? else {
            return Ok(None);
        };
        match serde_json::from_slice(&payload) {
            Ok(value) => {
                tracing::debug!(workflow_id = %self.workflow_id, step = step_key, "replaying journaled step");
                Ok(Some(value))
            }
            Err(e) => {
                tracing::warn!(
                    workflow_id = %self.workflow_id,
                    step = step_key,
                    error = %e,
                    "undecodable journal entry, executing step again"
                );
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::test_support::FlakyCheckpoints;
    use adapters::memory::checkpoint_store::InMemoryCheckpointStore;
    use ports::test_utils::NoopMetrics;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn context(store: &Arc<InMemoryCheckpointStore>, cancel: CancellationToken) -> WorkflowContext {
        WorkflowContext::new(
            "memory-audit-1",
            Arc::clone(store) as Arc<dyn CheckpointStore>,
            ActivityWorker::new(2, Arc::new(NoopMetrics)),
            cancel,
        )
    }

    fn options() -> ActivityOptions {
        ActivityOptions::new(
            Duration::from_secs(5),
            RetryPolicy {
                maximum_attempts: 1,
                ..RetryPolicy::default()
            },
        )
    }

    #[tokio::test]
    async fn completed_step_is_replayed_not_executed() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let ctx = context(&store, CancellationToken::new());
            let calls = Arc::clone(&calls);
            let value: Vec<String> = ctx
                .execute_activity("inventory/vector", &options(), move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok(vec!["v1".to_string(), "v2".to_string()]) }
                })
                .await
                .unwrap();
            assert_eq!(value, vec!["v1", "v2"]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.step_count("memory-audit-1"), 1);
    }

    #[tokio::test]
    async fn failed_step_is_not_journaled() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let ctx = context(&store, CancellationToken::new());

        let result: Result<u64, _> = ctx
            .execute_activity("inventory/cache", &options(), || async {
                Err(ActivityError::Unavailable("down".to_string()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(store.step_count("memory-audit-1"), 0);
    }

    #[tokio::test]
    async fn journal_failure_keeps_completed_result() {
        let store = Arc::new(FlakyCheckpoints::default());
        store.fail_save_step.store(true, Ordering::SeqCst);
        let ctx = WorkflowContext::new(
            "memory-audit-1",
            Arc::clone(&store) as Arc<dyn CheckpointStore>,
            ActivityWorker::new(2, Arc::new(NoopMetrics)),
            CancellationToken::new(),
        );
        let calls = Arc::new(AtomicU32::new(0));

        for expected_calls in 1..=2 {
            let activity_calls = Arc::clone(&calls);
            let deleted: u64 = ctx
                .execute_activity("cleanup/orphaned_vector", &options(), move || {
                    activity_calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok(7) }
                })
                .await
                .unwrap();
            assert_eq!(deleted, 7);
            assert_eq!(calls.load(Ordering::SeqCst), expected_calls);
        }
        assert_eq!(store.inner.step_count("memory-audit-1"), 0);
    }

    #[tokio::test]
    async fn undecodable_entry_is_executed_again() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        store
            .save_step("memory-audit-1", "inventory/document", b"not json")
            .unwrap();
        let ctx = context(&store, CancellationToken::new());

        let value: u64 = ctx
            .execute_activity("inventory/document", &options(), || async { Ok(42) })
            .await
            .unwrap();

        assert_eq!(value, 42);
        let payload = store.load_step("memory-audit-1", "inventory/document").unwrap();
        assert_eq!(payload.as_deref(), Some(b"42".as_slice()));
    }

    #[tokio::test]
    async fn cancelled_context_does_not_execute() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = context(&store, cancel);
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let result: Result<u64, _> = ctx
            .execute_activity("detect/orphaned_vector", &options(), move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                async { Ok(1) }
            })
            .await;

        assert_eq!(result.unwrap_err(), ActivityError::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_resumes_with_remaining_time() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let wake_at = current_timestamp_ns() + 5 * 1_000_000_000;
        store
            .save_step("memory-audit-1", "sleep/3", &serde_json::to_vec(&wake_at).unwrap())
            .unwrap();
        let ctx = context(&store, CancellationToken::new());

        let start = tokio::time::Instant::now();
        ctx.sleep("sleep/3", Duration::from_secs(3600)).await.unwrap();
        let elapsed = start.elapsed();

        assert!(elapsed <= Duration::from_secs(5), "slept {elapsed:?}");
        assert!(elapsed >= Duration::from_secs(4), "slept {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_sleep_journals_deadline() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let ctx = context(&store, CancellationToken::new());

        let start = tokio::time::Instant::now();
        ctx.sleep("sleep/0", Duration::from_secs(60)).await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(59));
        assert!(store.load_step("memory-audit-1", "sleep/0").unwrap().is_some());
    }

    #[tokio::test]
    async fn sleep_past_deadline_returns_immediately() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let wake_at = current_timestamp_ns().saturating_sub(1_000_000_000);
        store
            .save_step("memory-audit-1", "sleep/0", &serde_json::to_vec(&wake_at).unwrap())
            .unwrap();
        let ctx = context(&store, CancellationToken::new());

        tokio::time::timeout(Duration::from_secs(1), ctx.sleep("sleep/0", Duration::from_secs(3600)))
            .await
            .expect("sleep should not block")
            .unwrap();
    }

    #[tokio::test]
    async fn cancellation_interrupts_sleep() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let cancel = CancellationToken::new();
        let ctx = context(&store, cancel.clone());

        let sleeper = tokio::spawn(async move { ctx.sleep("sleep/0", Duration::from_secs(3600)).await });
        cancel.cancel();

        assert_eq!(sleeper.await.unwrap().unwrap_err(), ActivityError::Cancelled);
    }
}
