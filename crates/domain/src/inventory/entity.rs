use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::common::entity::Backend;
use crate::detection::entity::InconsistencyKind;

/// Cache key types counted by the inventory, each matched by its own
/// prefix below the cache prefix.
pub const CACHE_CONVERSATIONS: &str = "conversations";
pub const CACHE_MESSAGES: &str = "messages";
pub const CACHE_MESSAGE_IDS: &str = "message_ids";
pub const CACHE_CHATS: &str = "chats";
pub const CACHE_CACHES: &str = "caches";

/// Point-in-time snapshot of one backend, taken at the start of a run.
///
/// `ids` may be empty for backends inventoried count-only (the cache).
/// `scope` records what was counted: the document collections, the cache
/// key pattern, or nothing for the vector index. Detectors only judge
/// references that fall inside a snapshot's scope.
///
/// `breakdown` holds counts per collection (documents) or per key type
/// (cache).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreInventory {
    pub backend: Backend,
    pub total_count: u64,
    pub ids: BTreeSet<String>,
    pub scope: Vec<String>,
    #[serde(default)]
    pub breakdown: BTreeMap<String, u64>,
    pub collected_at_ns: u64,
}

impl StoreInventory {
    pub fn new(
        backend: Backend,
        total_count: u64,
        ids: BTreeSet<String>,
        scope: Vec<String>,
        collected_at_ns: u64,
    ) -> Self {
        Self {
            backend,
            total_count,
            ids,
            scope,
            breakdown: BTreeMap::new(),
            collected_at_ns,
        }
    }

    #[must_use]
    pub fn with_breakdown(mut self, breakdown: BTreeMap<String, u64>) -> Self {
        self.breakdown = breakdown;
        self
    }

    pub fn breakdown_count(&self, part: &str) -> Option<u64> {
        self.breakdown.get(part).copied()
    }

    /// Snapshot that carries only a count.
    pub fn count_only(
        backend: Backend,
        total_count: u64,
        scope: Vec<String>,
        collected_at_ns: u64,
    ) -> Self {
        Self::new(backend, total_count, BTreeSet::new(), scope, collected_at_ns)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Whether a document key (`<collection>/<id>`) belongs to a collection
    /// this snapshot covered.
    pub fn covers_document_key(&self, key: &str) -> bool {
        split_document_key(key).is_some_and(|(collection, _)| {
            self.scope.iter().any(|c| c == collection)
        })
    }
}

/// The three joined snapshots handed to detection and reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventories {
    pub document: StoreInventory,
    pub cache: StoreInventory,
    pub vector: StoreInventory,
}

impl Inventories {
    pub fn get(&self, backend: Backend) -> &StoreInventory {
        match backend {
            Backend::Document => &self.document,
            Backend::Cache => &self.cache,
            Backend::Vector => &self.vector,
        }
    }

    pub fn total_for(&self, backend: Backend) -> u64 {
        self.get(backend).total_count
    }

    /// Number of records a kind's findings are drawn from. Expired
    /// sessions are measured against the session keys only, not against
    /// their chat and message companions.
    pub fn population_of(&self, kind: InconsistencyKind) -> u64 {
        match kind {
            InconsistencyKind::ExpiredSession => self
                .cache
                .breakdown_count(CACHE_CONVERSATIONS)
                .unwrap_or(self.cache.total_count),
            other => self.total_for(other.backend()),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoreInventory> {
        [&self.document, &self.cache, &self.vector].into_iter()
    }
}

/// Filter applied when listing document ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFilter {
    All,
    RequiresEmbedding,
}

/// A document as seen by the auditor. `key` is `<collection>/<id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub key: String,
    pub collection: String,
    pub requires_embedding: bool,
    pub created_at_ns: Option<u64>,
    #[serde(default)]
    pub body: serde_json::Value,
}

/// Vector metadata as returned by the index.
///
/// `source_id` is the document key the vector was embedded from; vectors
/// without one cannot be judged orphaned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub source_id: Option<String>,
    pub created_at_ns: Option<u64>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

/// Session metadata gathered from the cache by the expiry scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub key: String,
    pub last_activity_ns: Option<u64>,
    /// Remaining key TTL in seconds as reported by the cache, if any.
    pub ttl_remaining_secs: Option<i64>,
}

/// Join a collection and a document id into a store key.
pub fn document_key(collection: &str, id: &str) -> String {
    format!("{collection}/{id}")
}

/// Split a `<collection>/<id>` key. Returns `None` for keys without a
/// collection or id part.
pub fn split_document_key(key: &str) -> Option<(&str, &str)> {
    let (collection, id) = key.split_once('/')?;
    if collection.is_empty() || id.is_empty() {
        return None;
    }
    Some((collection, id))
}
