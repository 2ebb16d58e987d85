use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;
use std::time::Duration;

use domain::common::entity::{Backend, DeleteOutcome, current_timestamp_ns};
use domain::common::error::StoreError;
use ports::secondary::cache_store::CacheStore;
use ports::secondary::store_accessor::{StoreAccessor, StoreFuture};

use super::poisoned;
use crate::record::{key_matches, remaining_ttl_secs};

#[derive(Debug, Clone)]
struct Entry {
    value: serde_json::Value,
    expires_at_ns: Option<u64>,
}

impl Entry {
    fn is_live(&self, now_ns: u64) -> bool {
        self.expires_at_ns.is_none_or(|at| at > now_ns)
    }
}

/// Cache with per-key expiry. Expired keys read as absent, like a cache
/// that evicts lazily.
#[derive(Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, optionally expiring after `ttl`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn set(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at_ns = ttl.map(|d| current_timestamp_ns().saturating_add(d.as_nanos() as u64));
        self.entries
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), Entry { value, expires_at_ns });
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        let now = current_timestamp_ns();
        self.entries
            .read()
            .map(|e| e.get(key).is_some_and(|entry| entry.is_live(now)))
            .unwrap_or(false)
    }

    fn live_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let now = current_timestamp_ns();
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries
            .iter()
            .filter(|(k, e)| key_matches(pattern, k) && e.is_live(now))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

impl StoreAccessor for InMemoryCacheStore {
    fn backend(&self) -> Backend {
        Backend::Cache
    }

    fn count<'a>(&'a self, scope: &'a str) -> StoreFuture<'a, u64> {
        Box::pin(async move { Ok(self.live_keys(scope)?.len() as u64) })
    }

    fn list_ids<'a>(&'a self, scope: &'a str) -> StoreFuture<'a, BTreeSet<String>> {
        Box::pin(async move { Ok(self.live_keys(scope)?.into_iter().collect()) })
    }

    fn delete<'a>(&'a self, id: &'a str) -> StoreFuture<'a, DeleteOutcome> {
        Box::pin(async move {
            let now = current_timestamp_ns();
            let removed = self.entries.write().map_err(poisoned)?.remove(id);
            Ok(match removed {
                Some(entry) if entry.is_live(now) => DeleteOutcome::Deleted,
                _ => DeleteOutcome::NotFound,
            })
        })
    }
}

impl CacheStore for InMemoryCacheStore {
    fn scan<'a>(&'a self, pattern: &'a str) -> StoreFuture<'a, Vec<String>> {
        Box::pin(async move { self.live_keys(pattern) })
    }

    fn get_ttl<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<i64>> {
        Box::pin(async move {
            let now = current_timestamp_ns();
            let entries = self.entries.read().map_err(poisoned)?;
            Ok(entries
                .get(key)
                .filter(|e| e.is_live(now))
                .and_then(|e| e.expires_at_ns)
                .map(|at| remaining_ttl_secs(at, now)))
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<serde_json::Value>> {
        Box::pin(async move {
            let now = current_timestamp_ns();
            let entries = self.entries.read().map_err(poisoned)?;
            Ok(entries
                .get(key)
                .filter(|e| e.is_live(now))
                .map(|e| e.value.clone()))
        })
    }
}
