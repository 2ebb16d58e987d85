use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use domain::common::entity::{Backend, DeleteOutcome};
use domain::common::error::StoreError;
use domain::inventory::entity::VectorRecord;
use ports::secondary::store_accessor::{StoreAccessor, StoreFuture};
use ports::secondary::vector_index::VectorIndex;
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};

use super::redb_database::{ensure_table, open_database, unavailable};

/// redb table: key = vector id, value = JSON-serialized `VectorRecord`.
const VECTORS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("vectors");

/// Vector index persisted in redb. Suitable for local deployments and
/// tests; no similarity search is offered.
pub struct RedbVectorIndex {
    db: Arc<Database>,
}

impl RedbVectorIndex {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::new(open_database(path)?)
    }

    pub fn new(db: Arc<Database>) -> Result<Self, StoreError> {
        ensure_table(&db, VECTORS_TABLE)?;
        Ok(Self { db })
    }

    pub fn upsert(&self, record: &VectorRecord) -> Result<(), StoreError> {
        if record.id.is_empty() {
            return Err(StoreError::Invalid("empty vector id".to_string()));
        }
        let bytes = serde_json::to_vec(record)
            .map_err(|e| StoreError::Invalid(format!("serialize vector '{}': {e}", record.id)))?;
        let txn = self.db.begin_write().map_err(unavailable("redb write txn"))?;
        {
            let mut table = txn
                .open_table(VECTORS_TABLE)
                .map_err(unavailable("redb write table"))?;
            table
                .insert(record.id.as_str(), bytes.as_slice())
                .map_err(unavailable("redb insert"))?;
        }
        txn.commit().map_err(unavailable("redb write commit"))
    }

    fn len(&self) -> Result<u64, StoreError> {
        let txn = self.db.begin_read().map_err(unavailable("redb read txn"))?;
        let table = txn
            .open_table(VECTORS_TABLE)
            .map_err(unavailable("redb read table"))?;
        table.len().map_err(unavailable("redb len"))
    }

    fn ids(&self) -> Result<BTreeSet<String>, StoreError> {
        let txn = self.db.begin_read().map_err(unavailable("redb read txn"))?;
        let table = txn
            .open_table(VECTORS_TABLE)
            .map_err(unavailable("redb read table"))?;
        let mut ids = BTreeSet::new();
        for item in table.iter().map_err(unavailable("redb iter"))? {
            let (key, _) = item.map_err(unavailable("redb iter entry"))?;
            ids.insert(key.value().to_string());
        }
        Ok(ids)
    }

    fn read(&self, id: &str) -> Result<Option<VectorRecord>, StoreError> {
        let txn = self.db.begin_read().map_err(unavailable("redb read txn"))?;
        let table = txn
            .open_table(VECTORS_TABLE)
            .map_err(unavailable("redb read table"))?;
        let Some(guard) = table.get(id).map_err(unavailable("redb get"))? else {
            return Ok(None);
        };
        serde_json::from_slice(guard.value())
            .map(Some)
            .map_err(|e| StoreError::Invalid(format!("vector '{id}': {e}")))
    }

    fn remove(&self, id: &str) -> Result<DeleteOutcome, StoreError> {
        let txn = self.db.begin_write().map_err(unavailable("redb delete txn"))?;
        let existed = {
            let mut table = txn
                .open_table(VECTORS_TABLE)
                .map_err(unavailable("redb delete table"))?;
            table.remove(id).map_err(unavailable("redb remove"))?.is_some()
        };
        txn.commit().map_err(unavailable("redb delete commit"))?;
        Ok(if existed {
            DeleteOutcome::Deleted
        } else {
            DeleteOutcome::NotFound
        })
    }
}

impl StoreAccessor for RedbVectorIndex {
    fn backend(&self) -> Backend {
        Backend::Vector
    }

    fn count<'a>(&'a self, _scope: &'a str) -> StoreFuture<'a, u64> {
        Box::pin(async move { self.len() })
    }

    fn list_ids<'a>(&'a self, _scope: &'a str) -> StoreFuture<'a, BTreeSet<String>> {
        Box::pin(async move { self.ids() })
    }

    fn delete<'a>(&'a self, id: &'a str) -> StoreFuture<'a, DeleteOutcome> {
        Box::pin(async move { self.remove(id) })
    }
}

impl VectorIndex for RedbVectorIndex {
    fn get_metadata<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<VectorRecord>> {
        Box::pin(async move { self.read(id) })
    }
}
