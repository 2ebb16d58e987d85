use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use domain::common::entity::{Backend, DeleteOutcome};
use domain::common::error::StoreError;
use domain::inventory::entity::{DocumentFilter, DocumentRecord};
use ports::secondary::document_store::DocumentStore;
use ports::secondary::store_accessor::{StoreAccessor, StoreFuture};

use super::poisoned;
use crate::record::{checked_key, document_from_body, matches_filter};

/// Document store kept in a `BTreeMap` keyed by `<collection>/<id>`.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<BTreeMap<String, DocumentRecord>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a document without going through the async port.
    pub fn insert(&self, collection: &str, id: &str, body: serde_json::Value) -> Result<(), StoreError> {
        let key = checked_key(collection, id)?;
        let record = document_from_body(&key, body)?;
        self.documents.write().map_err(poisoned)?.insert(key, record);
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.documents
            .read()
            .map(|docs| docs.contains_key(key))
            .unwrap_or(false)
    }

    fn collection_keys(&self, collection: &str, filter: DocumentFilter) -> Result<BTreeSet<String>, StoreError> {
        let prefix = format!("{collection}/");
        let docs = self.documents.read().map_err(poisoned)?;
        Ok(docs
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter(|(_, r)| matches_filter(r, filter))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

impl StoreAccessor for InMemoryDocumentStore {
    fn backend(&self) -> Backend {
        Backend::Document
    }

    fn count<'a>(&'a self, scope: &'a str) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            Ok(self.collection_keys(scope, DocumentFilter::All)?.len() as u64)
        })
    }

    fn list_ids<'a>(&'a self, scope: &'a str) -> StoreFuture<'a, BTreeSet<String>> {
        Box::pin(async move { self.collection_keys(scope, DocumentFilter::All) })
    }

    fn delete<'a>(&'a self, id: &'a str) -> StoreFuture<'a, DeleteOutcome> {
        Box::pin(async move {
            let removed = self.documents.write().map_err(poisoned)?.remove(id);
            Ok(match removed {
                Some(_) => DeleteOutcome::Deleted,
                None => DeleteOutcome::NotFound,
            })
        })
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn list_ids_filtered<'a>(
        &'a self,
        collection: &'a str,
        filter: DocumentFilter,
    ) -> StoreFuture<'a, BTreeSet<String>> {
        Box::pin(async move { self.collection_keys(collection, filter) })
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<DocumentRecord>> {
        Box::pin(async move { Ok(self.documents.read().map_err(poisoned)?.get(key).cloned()) })
    }

    fn put<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        value: &'a serde_json::Value,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move { self.insert(collection, id, value.clone()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded() -> InMemoryDocumentStore {
        let store = InMemoryDocumentStore::new();
        store.insert("memories", "m1", json!({"requires_embedding": true})).unwrap();
        store.insert("memories", "m2", json!({})).unwrap();
        store.insert("memoriesx", "m3", json!({})).unwrap();
        store
    }

    #[tokio::test]
    async fn count_is_scoped_to_collection() {
        let store = seeded();
        assert_eq!(store.count("memories").await.unwrap(), 2);
        assert_eq!(store.count("memoriesx").await.unwrap(), 1);
        assert_eq!(store.count("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn filtered_listing() {
        let store = seeded();
        let ids = store
            .list_ids_filtered("memories", DocumentFilter::RequiresEmbedding)
            .await
            .unwrap();
        assert_eq!(ids, BTreeSet::from(["memories/m1".to_string()]));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = seeded();
        assert_eq!(store.delete("memories/m1").await.unwrap(), DeleteOutcome::Deleted);
        assert_eq!(store.delete("memories/m1").await.unwrap(), DeleteOutcome::NotFound);
        assert!(!store.contains("memories/m1"));
    }

    #[tokio::test]
    async fn put_then_get() {
        let store = InMemoryDocumentStore::new();
        let body = json!({"created_at_ns": 7, "n": 1});
        store.put("audit_reports", "audit-1", &body).await.unwrap();
        let record = store.get("audit_reports/audit-1").await.unwrap().unwrap();
        assert_eq!(record.body["n"], 1);
        assert_eq!(record.created_at_ns, Some(7));
    }

    #[tokio::test]
    async fn put_rejects_bad_address() {
        let store = InMemoryDocumentStore::new();
        let err = store.put("", "x", &json!({})).await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }
}
