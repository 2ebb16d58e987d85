use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use domain::common::entity::{Backend, DeleteOutcome, current_timestamp_ns};
use domain::common::error::StoreError;
use ports::secondary::cache_store::CacheStore;
use ports::secondary::store_accessor::{StoreAccessor, StoreFuture};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use super::redb_database::{ensure_table, open_database, unavailable};
use crate::record::{key_matches, remaining_ttl_secs};

/// redb table: key = cache key, value = JSON-serialized [`CacheEntry`].
const CACHE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("cache_entries");

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    value: serde_json::Value,
    expires_at_ns: Option<u64>,
}

impl CacheEntry {
    fn is_live(&self, now_ns: u64) -> bool {
        self.expires_at_ns.is_none_or(|at| at > now_ns)
    }
}

/// Cache persisted in redb with per-key expiry. Expired entries read as
/// absent and are dropped on delete.
pub struct RedbCacheStore {
    db: Arc<Database>,
}

impl RedbCacheStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::new(open_database(path)?)
    }

    pub fn new(db: Arc<Database>) -> Result<Self, StoreError> {
        ensure_table(&db, CACHE_TABLE)?;
        Ok(Self { db })
    }

    /// Set `key`, optionally expiring after `ttl`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn set(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> Result<(), StoreError> {
        let entry = CacheEntry {
            value,
            expires_at_ns: ttl.map(|d| current_timestamp_ns().saturating_add(d.as_nanos() as u64)),
        };
        let bytes = serde_json::to_vec(&entry)
            .map_err(|e| StoreError::Invalid(format!("serialize cache entry '{key}': {e}")))?;
        let txn = self.db.begin_write().map_err(unavailable("redb write txn"))?;
        {
            let mut table = txn
                .open_table(CACHE_TABLE)
                .map_err(unavailable("redb write table"))?;
            table
                .insert(key, bytes.as_slice())
                .map_err(unavailable("redb insert"))?;
        }
        txn.commit().map_err(unavailable("redb write commit"))
    }

    fn entry(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        let now = current_timestamp_ns();
        let txn = self.db.begin_read().map_err(unavailable("redb read txn"))?;
        let table = txn
            .open_table(CACHE_TABLE)
            .map_err(unavailable("redb read table"))?;
        let Some(guard) = table.get(key).map_err(unavailable("redb get"))? else {
            return Ok(None);
        };
        let entry: CacheEntry = serde_json::from_slice(guard.value())
            .map_err(|e| StoreError::Invalid(format!("cache entry '{key}': {e}")))?;
        Ok(entry.is_live(now).then_some(entry))
    }

    fn live_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let now = current_timestamp_ns();
        let txn = self.db.begin_read().map_err(unavailable("redb read txn"))?;
        let table = txn
            .open_table(CACHE_TABLE)
            .map_err(unavailable("redb read table"))?;
        let mut keys = Vec::new();
        for item in table.iter().map_err(unavailable("redb iter"))? {
            let (key, value) = item.map_err(unavailable("redb iter entry"))?;
            let key = key.value();
            if !key_matches(pattern, key) {
                continue;
            }
            // Undecodable entries are counted; they still occupy the cache.
            let live = serde_json::from_slice::<CacheEntry>(value.value())
                .map_or(true, |entry| entry.is_live(now));
            if live {
                keys.push(key.to_string());
            }
        }
        Ok(keys)
    }

    fn remove(&self, key: &str) -> Result<DeleteOutcome, StoreError> {
        let now = current_timestamp_ns();
        let txn = self.db.begin_write().map_err(unavailable("redb delete txn"))?;
        let was_live = {
            let mut table = txn
                .open_table(CACHE_TABLE)
                .map_err(unavailable("redb delete table"))?;
            let removed = table.remove(key).map_err(unavailable("redb remove"))?;
            removed.is_some_and(|guard| {
                serde_json::from_slice::<CacheEntry>(guard.value())
                    .map_or(true, |entry| entry.is_live(now))
            })
        };
        txn.commit().map_err(unavailable("redb delete commit"))?;
        Ok(if was_live {
            DeleteOutcome::Deleted
        } else {
            DeleteOutcome::NotFound
        })
    }
}

impl StoreAccessor for RedbCacheStore {
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
        Box::pin(async move { self.remove(id) })
    }
}

impl CacheStore for RedbCacheStore {
    fn scan<'a>(&'a self, pattern: &'a str) -> StoreFuture<'a, Vec<String>> {
        Box::pin(async move { self.live_keys(pattern) })
    }

    fn get_ttl<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<i64>> {
        Box::pin(async move {
            let now = current_timestamp_ns();
            Ok(self
                .entry(key)?
                .and_then(|e| e.expires_at_ns)
                .map(|at| remaining_ttl_secs(at, now)))
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<serde_json::Value>> {
        Box::pin(async move { Ok(self.entry(key)?.map(|e| e.value)) })
    }
}
