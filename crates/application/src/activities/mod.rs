//! Activities of the audit workflow.
//!
//! Every activity is a single retryable unit over the store ports. They
//! hold no mutable state: everything a run needs flows in through
//! arguments and out through return values, so the workflow can journal
//! each result.

mod cleanup;
mod detection;
mod inventory;
mod report;

use std::sync::Arc;

use domain::report::engine::REPORT_COLLECTION;
use ports::secondary::cache_store::CacheStore;
use ports::secondary::document_store::DocumentStore;
use ports::secondary::notification_sink::NotificationSink;
use ports::secondary::vector_index::VectorIndex;

pub use cleanup::{CHAT_KEY_PREFIX, MESSAGE_IDS_KEY_PREFIX, MESSAGE_KEY_PREFIX};

/// Store layout the activities audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivitySettings {
    /// Document collections counted by the inventory.
    pub document_collections: Vec<String>,
    /// Collections whose every document must have an embedding, whatever
    /// its `requires_embedding` flag says.
    pub embedded_collections: Vec<String>,
    /// Prefix of every key the auditor reads from the cache.
    pub cache_prefix: String,
    /// Namespace of session metadata keys below `cache_prefix`.
    pub session_namespace: String,
    pub report_collection: String,
    /// Upper bound on vectors compared by the duplicate scan.
    pub duplicate_scan_limit: usize,
}

impl Default for ActivitySettings {
    fn default() -> Self {
        Self {
            document_collections: vec!["memories".to_string()],
            embedded_collections: vec![],
            cache_prefix: "ai:".to_string(),
            session_namespace: "conversation:".to_string(),
            report_collection: REPORT_COLLECTION.to_string(),
            duplicate_scan_limit: 1000,
        }
    }
}

impl ActivitySettings {
    /// Pattern of every key owned by the auditor in the cache.
    pub fn cache_pattern(&self) -> String {
        format!("{}*", self.cache_prefix)
    }

    /// Pattern of the session metadata keys.
    pub fn session_pattern(&self) -> String {
        format!("{}{}*", self.cache_prefix, self.session_namespace)
    }

    pub fn session_key(&self, session_id: &str) -> String {
        format!("{}{}{session_id}", self.cache_prefix, self.session_namespace)
    }
}

/// Activity implementations bound to concrete store adapters.
pub struct AuditActivities {
    documents: Arc<dyn DocumentStore>,
    cache: Arc<dyn CacheStore>,
    vectors: Arc<dyn VectorIndex>,
    notifier: Arc<dyn NotificationSink>,
    settings: ActivitySettings,
}

impl AuditActivities {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        cache: Arc<dyn CacheStore>,
        vectors: Arc<dyn VectorIndex>,
        notifier: Arc<dyn NotificationSink>,
        settings: ActivitySettings,
    ) -> Self {
        Self {
            documents,
            cache,
            vectors,
            notifier,
            settings,
        }
    }

    pub fn settings(&self) -> &ActivitySettings {
        &self.settings
    }
}
