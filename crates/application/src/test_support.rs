//! Fixtures for workflow tests: in-memory stores behind fault-injecting
//! wrappers.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use adapters::memory::cache_store::InMemoryCacheStore;
use adapters::memory::checkpoint_store::InMemoryCheckpointStore;
use adapters::memory::document_store::InMemoryDocumentStore;
use adapters::memory::vector_index::InMemoryVectorIndex;
use domain::common::entity::{Backend, DeleteOutcome, NANOS_PER_SEC, current_timestamp_ns};
use domain::common::error::StoreError;
use domain::inventory::entity::{DocumentFilter, DocumentRecord, Inventories, VectorRecord};
use domain::report::error::NotifyError;
use domain::workflow::entity::{AuditRunConfig, RunRecord, SchedulerCursor};
use domain::workflow::error::CheckpointError;
use ports::secondary::cache_store::CacheStore;
use ports::secondary::checkpoint_store::CheckpointStore;
use ports::secondary::document_store::DocumentStore;
use ports::secondary::metrics_port::MetricsPort;
use ports::secondary::notification_sink::NotificationSink;
use ports::secondary::store_accessor::{StoreAccessor, StoreFuture};
use ports::secondary::vector_index::VectorIndex;
use ports::test_utils::RecordingMetrics;
use tokio_util::sync::CancellationToken;

use crate::activities::{
    ActivitySettings, AuditActivities, CHAT_KEY_PREFIX, MESSAGE_IDS_KEY_PREFIX, MESSAGE_KEY_PREFIX,
};
use crate::audit_service_impl::AuditAppService;
use crate::audit_workflow::{AuditWorkflow, StageOptions};
use crate::durable::WorkflowContext;
use crate::retry::{ActivityOptions, RetryPolicy};
use crate::runner::AuditRunner;
use crate::worker::ActivityWorker;

pub const DAY_NS: u64 = 24 * 60 * 60 * NANOS_PER_SEC;

/// Faults injected into a wrapped store.
#[derive(Default)]
pub struct FaultPlan {
    inventory_down: AtomicBool,
    inventory_stalled: AtomicBool,
    inventory_calls: AtomicU32,
    writes_down: AtomicBool,
    deletes_down: AtomicBool,
    delete_calls: AtomicU32,
    vanish_before_delete: Mutex<BTreeSet<String>>,
    delete_errors: Mutex<BTreeMap<String, StoreError>>,
}

impl FaultPlan {
    /// `count` and `list_ids` fail with `Unavailable`.
    pub fn fail_inventory(&self, down: bool) {
        self.inventory_down.store(down, Ordering::SeqCst);
    }

    /// `count` and `list_ids` never complete.
    pub fn stall_inventory(&self, stalled: bool) {
        self.inventory_stalled.store(stalled, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, down: bool) {
        self.writes_down.store(down, Ordering::SeqCst);
    }

    pub fn fail_all_deletes(&self, down: bool) {
        self.deletes_down.store(down, Ordering::SeqCst);
    }

    /// The ids disappear just before their delete, as if removed
    /// concurrently.
    pub fn not_found_on_delete<'a>(&self, ids: impl IntoIterator<Item = &'a str>) {
        let mut vanish = self.vanish_before_delete.lock().unwrap();
        vanish.extend(ids.into_iter().map(ToString::to_string));
    }

    pub fn fail_delete_of<'a>(&self, ids: impl IntoIterator<Item = &'a str>, error: StoreError) {
        let mut errors = self.delete_errors.lock().unwrap();
        for id in ids {
            errors.insert(id.to_string(), error.clone());
        }
    }

    pub fn inventory_calls(&self) -> u32 {
        self.inventory_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> u32 {
        self.delete_calls.load(Ordering::SeqCst)
    }

    async fn inventory(&self) -> Result<(), StoreError> {
        self.inventory_calls.fetch_add(1, Ordering::SeqCst);
        if self.inventory_stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.inventory_down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected outage".to_string()));
        }
        Ok(())
    }

    fn write(&self) -> Result<(), StoreError> {
        if self.writes_down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected write outage".to_string()));
        }
        Ok(())
    }

    /// `Err` to fail the delete, `Ok(true)` to remove the id first.
    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.deletes_down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected delete outage".to_string()));
        }
        if let Some(error) = self.delete_errors.lock().unwrap().get(id) {
            return Err(error.clone());
        }
        Ok(self.vanish_before_delete.lock().unwrap().contains(id))
    }
}

/// Store wrapper applying a `FaultPlan`.
pub struct Faulty<S> {
    pub inner: Arc<S>,
    pub plan: FaultPlan,
}

impl<S> Faulty<S> {
    fn new(inner: S) -> Self {
        Self {
            inner: Arc::new(inner),
            plan: FaultPlan::default(),
        }
    }
}

impl<S: StoreAccessor> StoreAccessor for Faulty<S> {
    fn backend(&self) -> Backend {
        self.inner.backend()
    }

    fn count<'a>(&'a self, scope: &'a str) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            self.plan.inventory().await?;
            self.inner.count(scope).await
        })
    }

    fn list_ids<'a>(&'a self, scope: &'a str) -> StoreFuture<'a, BTreeSet<String>> {
        Box::pin(async move {
            self.plan.inventory().await?;
            self.inner.list_ids(scope).await
        })
    }

    fn delete<'a>(&'a self, id: &'a str) -> StoreFuture<'a, DeleteOutcome> {
        Box::pin(async move {
            if self.plan.delete(id)? {
                self.inner.delete(id).await?;
            }
            self.inner.delete(id).await
        })
    }
}

impl<S: DocumentStore> DocumentStore for Faulty<S> {
    fn list_ids_filtered<'a>(
        &'a self,
        collection: &'a str,
        filter: DocumentFilter,
    ) -> StoreFuture<'a, BTreeSet<String>> {
        self.inner.list_ids_filtered(collection, filter)
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<DocumentRecord>> {
        self.inner.get(key)
    }

    fn put<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        value: &'a serde_json::Value,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.plan.write()?;
            self.inner.put(collection, id, value).await
        })
    }
}

impl<S: CacheStore> CacheStore for Faulty<S> {
    fn scan<'a>(&'a self, pattern: &'a str) -> StoreFuture<'a, Vec<String>> {
        self.inner.scan(pattern)
    }

    fn get_ttl<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<i64>> {
        self.inner.get_ttl(key)
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<serde_json::Value>> {
        self.inner.get(key)
    }
}

impl<S: VectorIndex> VectorIndex for Faulty<S> {
    fn get_metadata<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<VectorRecord>> {
        self.inner.get_metadata(id)
    }
}

/// Sink that remembers delivered summaries.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<String>>,
    down: AtomicBool,
}

impl RecordingSink {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

impl NotificationSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn send<'a>(
        &'a self,
        summary: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), NotifyError>> + Send + 'a>>
    {
        Box::pin(async move {
            if self.down.load(Ordering::SeqCst) {
                return Err(NotifyError::Unreachable("injected".to_string()));
            }
            self.sent.lock().unwrap().push(summary.to_string());
            Ok(())
        })
    }
}

/// Short timeouts and backoff so retries finish quickly.
pub fn fast_options() -> StageOptions {
    let options = ActivityOptions::new(
        Duration::from_secs(5),
        RetryPolicy {
            maximum_attempts: 2,
            initial_interval: Duration::from_millis(10),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_millis(50),
            ..RetryPolicy::default()
        },
    );
    StageOptions {
        inventory: options.clone(),
        detection: options.clone(),
        cleanup: options.clone(),
        report: options.clone(),
        notify: options,
    }
}

/// Journal whose writes can be made to fail.
#[derive(Default)]
pub struct FlakyCheckpoints {
    pub inner: InMemoryCheckpointStore,
    pub fail_prune: AtomicBool,
    pub fail_clear: AtomicBool,
    pub fail_save_step: AtomicBool,
    pub cursor_failures_left: AtomicU32,
    pub prune_calls: AtomicU32,
}

fn busy() -> CheckpointError {
    CheckpointError::Storage("disk busy".into())
}

impl CheckpointStore for FlakyCheckpoints {
    fn save_run(&self, record: &RunRecord) -> Result<(), CheckpointError> {
        self.inner.save_run(record)
    }

    fn load_run(&self, run_id: &str) -> Result<Option<RunRecord>, CheckpointError> {
        self.inner.load_run(run_id)
    }

    fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>, CheckpointError> {
        self.inner.list_runs(limit)
    }

    fn incomplete_runs(&self) -> Result<Vec<RunRecord>, CheckpointError> {
        self.inner.incomplete_runs()
    }

    fn load_step(&self, run_id: &str, step_key: &str) -> Result<Option<Vec<u8>>, CheckpointError> {
        self.inner.load_step(run_id, step_key)
    }

    fn save_step(&self, run_id: &str, step_key: &str, payload: &[u8]) -> Result<(), CheckpointError> {
        if self.fail_save_step.load(Ordering::SeqCst) {
            return Err(busy());
        }
        self.inner.save_step(run_id, step_key, payload)
    }

    fn clear_steps(&self, run_id: &str) -> Result<usize, CheckpointError> {
        if self.fail_clear.load(Ordering::SeqCst) {
            return Err(busy());
        }
        self.inner.clear_steps(run_id)
    }

    fn prune_runs(&self, keep: usize) -> Result<usize, CheckpointError> {
        self.prune_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_prune.load(Ordering::SeqCst) {
            return Err(busy());
        }
        self.inner.prune_runs(keep)
    }

    fn load_cursor(&self, scheduler_id: &str) -> Result<Option<SchedulerCursor>, CheckpointError> {
        self.inner.load_cursor(scheduler_id)
    }

    fn save_cursor(&self, cursor: &SchedulerCursor) -> Result<(), CheckpointError> {
        let failing = self
            .cursor_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(busy());
        }
        self.inner.save_cursor(cursor)
    }
}

pub struct Fixture {
    pub documents: Arc<Faulty<InMemoryDocumentStore>>,
    pub cache: Arc<Faulty<InMemoryCacheStore>>,
    pub vectors: Arc<Faulty<InMemoryVectorIndex>>,
    pub sink: Arc<RecordingSink>,
    pub checkpoints: Arc<InMemoryCheckpointStore>,
    pub metrics: Arc<RecordingMetrics>,
    pub settings: ActivitySettings,
    pub options: StageOptions,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_settings(ActivitySettings::default())
    }

    pub fn with_settings(settings: ActivitySettings) -> Self {
        Self {
            documents: Arc::new(Faulty::new(InMemoryDocumentStore::new())),
            cache: Arc::new(Faulty::new(InMemoryCacheStore::new())),
            vectors: Arc::new(Faulty::new(InMemoryVectorIndex::new())),
            sink: Arc::new(RecordingSink::default()),
            checkpoints: Arc::new(InMemoryCheckpointStore::new()),
            metrics: Arc::new(RecordingMetrics::default()),
            settings,
            options: fast_options(),
        }
    }

    /// A creation time well past the default minimum age.
    pub fn old_timestamp(&self) -> u64 {
        current_timestamp_ns() - DAY_NS
    }

    pub fn seed_document(&self, collection: &str, id: &str, body: serde_json::Value) {
        self.documents.inner.insert(collection, id, body).unwrap();
    }

    pub fn seed_vector(&self, id: &str, source_id: Option<&str>, embedding: Option<Vec<f32>>) {
        self.vectors
            .inner
            .upsert(VectorRecord {
                id: id.to_string(),
                source_id: source_id.map(ToString::to_string),
                created_at_ns: Some(self.old_timestamp()),
                embedding,
            })
            .unwrap();
    }

    /// `memories/mem-<i>` documents, each with its vector `vec-<i>`.
    pub fn seed_linked_memories(&self, count: usize) {
        let created = self.old_timestamp();
        for i in 0..count {
            let id = format!("mem-{i}");
            self.seed_document(
                "memories",
                &id,
                serde_json::json!({"requires_embedding": true, "created_at_ns": created}),
            );
            self.seed_vector(&format!("vec-{i}"), Some(&format!("memories/{id}")), None);
        }
    }

    /// Vectors `orphan-<i>` whose parent document does not exist.
    pub fn seed_orphan_vectors(&self, count: usize) {
        for i in 0..count {
            self.seed_vector(&format!("orphan-{i}"), Some(&format!("memories/gone-{i}")), None);
        }
    }

    /// Session metadata idle for `idle_ns`.
    pub fn seed_session(&self, session_id: &str, idle_ns: u64) {
        let last_activity = current_timestamp_ns() - idle_ns;
        self.cache
            .inner
            .set(
                &self.settings.session_key(session_id),
                serde_json::json!({"updated_at_ns": last_activity}),
                None,
            )
            .unwrap();
    }

    /// A session with its chat, message list and `messages` message keys.
    pub fn seed_conversation(&self, session_id: &str, idle_ns: u64, messages: usize) {
        let prefix = &self.settings.cache_prefix;
        self.seed_session(session_id, idle_ns);
        self.seed_cache_key(&format!("{prefix}{CHAT_KEY_PREFIX}{session_id}"));
        self.seed_cache_key(&format!("{prefix}{MESSAGE_IDS_KEY_PREFIX}{session_id}"));
        for i in 0..messages {
            self.seed_cache_key(&format!("{prefix}{MESSAGE_KEY_PREFIX}{session_id}:{i}"));
        }
    }

    pub fn seed_cache_key(&self, key: &str) {
        self.cache
            .inner
            .set(key, serde_json::json!({}), None)
            .unwrap();
    }

    pub async fn delete_vector(&self, id: &str) {
        self.vectors.inner.delete(id).await.unwrap();
    }

    pub fn activities(&self) -> Arc<AuditActivities> {
        Arc::new(AuditActivities::new(
            Arc::clone(&self.documents) as Arc<dyn DocumentStore>,
            Arc::clone(&self.cache) as Arc<dyn CacheStore>,
            Arc::clone(&self.vectors) as Arc<dyn VectorIndex>,
            Arc::clone(&self.sink) as Arc<dyn NotificationSink>,
            self.settings.clone(),
        ))
    }

    pub async fn inventories(&self) -> Inventories {
        let activities = self.activities();
        Inventories {
            document: activities.count_document_records().await.unwrap(),
            cache: activities.count_cache_keys().await.unwrap(),
            vector: activities.count_vector_embeddings().await.unwrap(),
        }
    }

    pub fn metrics_port(&self) -> Arc<dyn MetricsPort> {
        Arc::clone(&self.metrics) as Arc<dyn MetricsPort>
    }

    pub fn checkpoint_port(&self) -> Arc<dyn CheckpointStore> {
        Arc::clone(&self.checkpoints) as Arc<dyn CheckpointStore>
    }

    pub fn worker(&self) -> ActivityWorker {
        ActivityWorker::new(4, self.metrics_port())
    }

    pub fn workflow(&self) -> AuditWorkflow {
        AuditWorkflow::new(
            self.activities(),
            self.checkpoint_port(),
            self.metrics_port(),
            self.options.clone(),
        )
    }

    pub fn context(&self, run_id: &str, cancel: CancellationToken) -> WorkflowContext {
        WorkflowContext::new(run_id, self.checkpoint_port(), self.worker(), cancel)
    }

    pub fn runner(&self) -> Arc<AuditRunner> {
        Arc::new(AuditRunner::new(
            self.workflow(),
            self.checkpoint_port(),
            self.worker(),
            CancellationToken::new(),
        ))
    }

    pub fn service(&self) -> AuditAppService {
        self.service_with(self.runner())
    }

    pub fn service_with(&self, runner: Arc<AuditRunner>) -> AuditAppService {
        AuditAppService::new(runner, AuditRunConfig::default())
    }
}
