use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use domain::common::entity::{Backend, DeleteOutcome};
use domain::common::error::StoreError;
use domain::inventory::entity::VectorRecord;
use ports::secondary::store_accessor::{StoreAccessor, StoreFuture};
use ports::secondary::vector_index::VectorIndex;

use super::poisoned;

/// Vector index kept in memory. The scope argument is ignored.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    vectors: RwLock<BTreeMap<String, VectorRecord>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, record: VectorRecord) -> Result<(), StoreError> {
        if record.id.is_empty() {
            return Err(StoreError::Invalid("empty vector id".to_string()));
        }
        self.vectors
            .write()
            .map_err(poisoned)?
            .insert(record.id.clone(), record);
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.vectors
            .read()
            .map(|v| v.contains_key(id))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.vectors.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StoreAccessor for InMemoryVectorIndex {
    fn backend(&self) -> Backend {
        Backend::Vector
    }

    fn count<'a>(&'a self, _scope: &'a str) -> StoreFuture<'a, u64> {
        Box::pin(async move { Ok(self.vectors.read().map_err(poisoned)?.len() as u64) })
    }

    fn list_ids<'a>(&'a self, _scope: &'a str) -> StoreFuture<'a, BTreeSet<String>> {
        Box::pin(async move { Ok(self.vectors.read().map_err(poisoned)?.keys().cloned().collect()) })
    }

    fn delete<'a>(&'a self, id: &'a str) -> StoreFuture<'a, DeleteOutcome> {
        Box::pin(async move {
            let removed = self.vectors.write().map_err(poisoned)?.remove(id);
            Ok(match removed {
                Some(_) => DeleteOutcome::Deleted,
                None => DeleteOutcome::NotFound,
            })
        })
    }
}

impl VectorIndex for InMemoryVectorIndex {
    fn get_metadata<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<VectorRecord>> {
        Box::pin(async move { Ok(self.vectors.read().map_err(poisoned)?.get(id).cloned()) })
    }
}
