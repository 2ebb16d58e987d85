use std::collections::{BTreeMap, BTreeSet};

use domain::common::entity::{Backend, current_timestamp_ns};
use domain::inventory::entity::{
    CACHE_CACHES, CACHE_CHATS, CACHE_CONVERSATIONS, CACHE_MESSAGE_IDS, CACHE_MESSAGES,
    StoreInventory,
};
use domain::workflow::error::ActivityError;
use ports::secondary::store_accessor::StoreAccessor;

use super::AuditActivities;
use super::cleanup::{CHAT_KEY_PREFIX, MESSAGE_IDS_KEY_PREFIX, MESSAGE_KEY_PREFIX};

/// Response cache entries, below the cache prefix.
pub const RESPONSE_CACHE_KEY_PREFIX: &str = "cache:";

impl AuditActivities {
    /// Count and list the documents of every configured collection.
    pub async fn count_document_records(&self) -> Result<StoreInventory, ActivityError> {
        let mut total = 0u64;
        let mut ids = BTreeSet::new();
        let mut breakdown = BTreeMap::new();
        for collection in &self.settings.document_collections {
            let count = self.documents.count(collection).await?;
            total += count;
            breakdown.insert(collection.clone(), count);
            ids.extend(self.documents.list_ids(collection).await?);
        }
        tracing::debug!(total, collections = self.settings.document_collections.len(), "document inventory collected");
        Ok(StoreInventory::new(
            Backend::Document,
            total,
            ids,
            self.settings.document_collections.clone(),
            current_timestamp_ns(),
        )
        .with_breakdown(breakdown))
    }

    /// Count the auditor's cache keys, in total and per key type.
    /// Count-only: cache ids are not needed by any detector.
    pub async fn count_cache_keys(&self) -> Result<StoreInventory, ActivityError> {
        let pattern = self.settings.cache_pattern();
        let total = self.cache.count(&pattern).await?;

        let prefix = &self.settings.cache_prefix;
        let key_types = [
            (CACHE_CONVERSATIONS, self.settings.session_pattern()),
            (CACHE_MESSAGES, format!("{prefix}{MESSAGE_KEY_PREFIX}*")),
            (CACHE_MESSAGE_IDS, format!("{prefix}{MESSAGE_IDS_KEY_PREFIX}*")),
            (CACHE_CHATS, format!("{prefix}{CHAT_KEY_PREFIX}*")),
            (CACHE_CACHES, format!("{prefix}{RESPONSE_CACHE_KEY_PREFIX}*")),
        ];
        let mut breakdown = BTreeMap::new();
        for (key_type, type_pattern) in key_types {
            breakdown.insert(key_type.to_string(), self.cache.count(&type_pattern).await?);
        }

        tracing::debug!(total, pattern = %pattern, breakdown = ?breakdown, "cache inventory collected");
        Ok(StoreInventory::count_only(
            Backend::Cache,
            total,
            vec![pattern],
            current_timestamp_ns(),
        )
        .with_breakdown(breakdown))
    }

    pub async fn count_vector_embeddings(&self) -> Result<StoreInventory, ActivityError> {
        let total = self.vectors.count("").await?;
        let ids = self.vectors.list_ids("").await?;
        tracing::debug!(total, "vector inventory collected");
        Ok(StoreInventory::new(
            Backend::Vector,
            total,
            ids,
            vec![],
            current_timestamp_ns(),
        ))
    }
}
