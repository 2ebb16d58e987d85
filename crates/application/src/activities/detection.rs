use domain::common::entity::current_timestamp_ns;
use domain::common::error::StoreError;
use domain::detection::engine;
use domain::detection::entity::Inconsistency;
use domain::inventory::entity::{
    DocumentFilter, DocumentRecord, Inventories, SessionRecord, VectorRecord,
};
use domain::workflow::entity::AuditRunConfig;
use domain::workflow::error::ActivityError;

use super::AuditActivities;

/// Session metadata fields holding the last activity, newest name first.
const LAST_ACTIVITY_FIELDS: [&str; 2] = ["updated_at_ns", "last_activity_ns"];

impl AuditActivities {
    pub async fn detect_orphaned_vectors(
        &self,
        inventories: &Inventories,
        config: &AuditRunConfig,
    ) -> Result<Vec<Inconsistency>, ActivityError> {
        let vectors = self.load_vectors(inventories.vector.ids.iter()).await?;
        let found = engine::detect_orphaned_vectors(inventories, &vectors, config, current_timestamp_ns());
        tracing::debug!(scanned = vectors.len(), found = found.len(), "orphaned vector scan done");
        Ok(found)
    }

    pub async fn detect_missing_embeddings(
        &self,
        inventories: &Inventories,
        config: &AuditRunConfig,
    ) -> Result<Vec<Inconsistency>, ActivityError> {
        let mut documents = Vec::new();
        for collection in &self.settings.document_collections {
            let embedded = self.settings.embedded_collections.contains(collection);
            let filter = if embedded {
                DocumentFilter::All
            } else {
                DocumentFilter::RequiresEmbedding
            };
            for key in self.documents.list_ids_filtered(collection, filter).await? {
                if !inventories.document.contains(&key) {
                    continue;
                }
                if let Some(mut record) = self.load_document(&key).await? {
                    record.requires_embedding |= embedded;
                    documents.push(record);
                }
            }
        }

        let vectors = self.load_vectors(inventories.vector.ids.iter()).await?;
        let found = engine::detect_missing_embeddings(
            inventories,
            &documents,
            &vectors,
            config,
            current_timestamp_ns(),
        );
        tracing::debug!(scanned = documents.len(), found = found.len(), "missing embedding scan done");
        Ok(found)
    }

    pub async fn detect_expired_sessions(
        &self,
        config: &AuditRunConfig,
    ) -> Result<Vec<Inconsistency>, ActivityError> {
        let key_prefix = self.settings.session_key("");
        let mut sessions = Vec::new();
        for key in self.cache.scan(&self.settings.session_pattern()).await? {
            let Some(session_id) = key.strip_prefix(&key_prefix) else {
                continue;
            };
            // Keys that expire between scan and read are gone, not expired.
            let Some(metadata) = self.cache.get(&key).await? else {
                continue;
            };
            let last_activity_ns = LAST_ACTIVITY_FIELDS
                .iter()
                .find_map(|field| metadata.get(*field).and_then(serde_json::Value::as_u64));
            let ttl_remaining_secs = self.cache.get_ttl(&key).await?;
            sessions.push(SessionRecord {
                session_id: session_id.to_string(),
                key: key.clone(),
                last_activity_ns,
                ttl_remaining_secs,
            });
        }
        let found = engine::detect_expired_sessions(&sessions, config, current_timestamp_ns());
        tracing::debug!(scanned = sessions.len(), found = found.len(), "expired session scan done");
        Ok(found)
    }

    /// Report-only scan for near-identical embeddings, bounded by
    /// `duplicate_scan_limit`.
    pub async fn detect_duplicate_vectors(
        &self,
        inventories: &Inventories,
        config: &AuditRunConfig,
    ) -> Result<Vec<Inconsistency>, ActivityError> {
        let limit = self.settings.duplicate_scan_limit;
        if inventories.vector.ids.len() > limit {
            tracing::info!(
                total = inventories.vector.ids.len(),
                limit,
                "duplicate scan truncated to scan limit"
            );
        }
        let vectors = self
            .load_vectors(inventories.vector.ids.iter().take(limit))
            .await?;
        Ok(engine::detect_duplicate_vectors(&vectors, config))
    }

    /// Vectors deleted since the inventory are skipped.
    async fn load_vectors<'a>(
        &self,
        ids: impl Iterator<Item = &'a String>,
    ) -> Result<Vec<VectorRecord>, ActivityError> {
        let mut records = Vec::new();
        for id in ids {
            match self.vectors.get_metadata(id).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) | Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(records)
    }

    async fn load_document(&self, key: &str) -> Result<Option<DocumentRecord>, ActivityError> {
        match self.documents.get(key).await {
            Ok(record) => Ok(record),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
