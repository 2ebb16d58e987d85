use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use domain::common::entity::{Backend, DeleteOutcome};
use domain::common::error::StoreError;
use domain::inventory::entity::{DocumentFilter, DocumentRecord};
use ports::secondary::document_store::DocumentStore;
use ports::secondary::store_accessor::{StoreAccessor, StoreFuture};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use super::redb_database::{ensure_table, open_database, unavailable};
use crate::record::{checked_key, document_from_body, matches_filter};

/// redb table: key = `<collection>/<id>`, value = JSON document body.
const DOCUMENTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("documents");

/// Document store persisted in a redb file.
pub struct RedbDocumentStore {
    db: Arc<Database>,
}

impl RedbDocumentStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::new(open_database(path)?)
    }

    pub fn new(db: Arc<Database>) -> Result<Self, StoreError> {
        ensure_table(&db, DOCUMENTS_TABLE)?;
        Ok(Self { db })
    }

    fn scan_collection(&self, collection: &str, filter: DocumentFilter) -> Result<BTreeSet<String>, StoreError> {
        let prefix = format!("{collection}/");
        let txn = self.db.begin_read().map_err(unavailable("redb read txn"))?;
        let table = txn
            .open_table(DOCUMENTS_TABLE)
            .map_err(unavailable("redb read table"))?;
        let mut keys = BTreeSet::new();
        for entry in table
            .range(prefix.as_str()..)
            .map_err(unavailable("redb range"))?
        {
            let (key, value) = entry.map_err(unavailable("redb range entry"))?;
            let key = key.value();
            if !key.starts_with(&prefix) {
                break;
            }
            if filter == DocumentFilter::All {
                keys.insert(key.to_string());
                continue;
            }
            let body: serde_json::Value = serde_json::from_slice(value.value())
                .map_err(|e| StoreError::Invalid(format!("document '{key}': {e}")))?;
            if matches_filter(&document_from_body(key, body)?, filter) {
                keys.insert(key.to_string());
            }
        }
        Ok(keys)
    }

    fn read(&self, key: &str) -> Result<Option<DocumentRecord>, StoreError> {
        let txn = self.db.begin_read().map_err(unavailable("redb read txn"))?;
        let table = txn
            .open_table(DOCUMENTS_TABLE)
            .map_err(unavailable("redb read table"))?;
        let Some(guard) = table.get(key).map_err(unavailable("redb get"))? else {
            return Ok(None);
        };
        let body: serde_json::Value = serde_json::from_slice(guard.value())
            .map_err(|e| StoreError::Invalid(format!("document '{key}': {e}")))?;
        document_from_body(key, body).map(Some)
    }

    fn write(&self, key: &str, body: &serde_json::Value) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| StoreError::Invalid(format!("serialize document '{key}': {e}")))?;
        let txn = self.db.begin_write().map_err(unavailable("redb write txn"))?;
        {
            let mut table = txn
                .open_table(DOCUMENTS_TABLE)
                .map_err(unavailable("redb write table"))?;
            table
                .insert(key, bytes.as_slice())
                .map_err(unavailable("redb insert"))?;
        }
        txn.commit().map_err(unavailable("redb write commit"))
    }

    fn remove(&self, key: &str) -> Result<DeleteOutcome, StoreError> {
        let txn = self.db.begin_write().map_err(unavailable("redb delete txn"))?;
        let existed = {
            let mut table = txn
                .open_table(DOCUMENTS_TABLE)
                .map_err(unavailable("redb delete table"))?;
            table.remove(key).map_err(unavailable("redb remove"))?.is_some()
        };
        txn.commit().map_err(unavailable("redb delete commit"))?;
        Ok(if existed {
            DeleteOutcome::Deleted
        } else {
            DeleteOutcome::NotFound
        })
    }
}

impl StoreAccessor for RedbDocumentStore {
    fn backend(&self) -> Backend {
        Backend::Document
    }

    fn count<'a>(&'a self, scope: &'a str) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            Ok(self.scan_collection(scope, DocumentFilter::All)?.len() as u64)
        })
    }

    fn list_ids<'a>(&'a self, scope: &'a str) -> StoreFuture<'a, BTreeSet<String>> {
        Box::pin(async move { self.scan_collection(scope, DocumentFilter::All) })
    }

    fn delete<'a>(&'a self, id: &'a str) -> StoreFuture<'a, DeleteOutcome> {
        Box::pin(async move { self.remove(id) })
    }
}

impl DocumentStore for RedbDocumentStore {
    fn list_ids_filtered<'a>(
        &'a self,
        collection: &'a str,
        filter: DocumentFilter,
    ) -> StoreFuture<'a, BTreeSet<String>> {
        Box::pin(async move { self.scan_collection(collection, filter) })
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<DocumentRecord>> {
        Box::pin(async move { self.read(key) })
    }

    fn put<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        value: &'a serde_json::Value,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let key = checked_key(collection, id)?;
            self.write(&key, value)
        })
    }
}
