use domain::inventory::entity::VectorRecord;

use crate::secondary::store_accessor::{StoreAccessor, StoreFuture};

/// Vector index holding embeddings derived from documents.
pub trait VectorIndex: StoreAccessor {
    /// Metadata of one vector, including its embedding when the index
    /// returns it.
    fn get_metadata<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<VectorRecord>>;
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use domain::common::entity::{Backend, DeleteOutcome};

    struct DummyIndex;

    impl StoreAccessor for DummyIndex {
        fn backend(&self) -> Backend {
            Backend::Vector
        }
        fn count<'a>(&'a self, _scope: &'a str) -> StoreFuture<'a, u64> {
            Box::pin(async { Ok(1) })
        }
        fn list_ids<'a>(&'a self, _scope: &'a str) -> StoreFuture<'a, BTreeSet<String>> {
            Box::pin(async { Ok(BTreeSet::from(["v1".to_string()])) })
        }
        fn delete<'a>(&'a self, _id: &'a str) -> StoreFuture<'a, DeleteOutcome> {
            Box::pin(async { Ok(DeleteOutcome::Deleted) })
        }
    }

    impl VectorIndex for DummyIndex {
        fn get_metadata<'a>(&'a self, _id: &'a str) -> StoreFuture<'a, Option<VectorRecord>> {
            Box::pin(async { Ok(None) })
        }
    }

    #[tokio::test]
    async fn vector_index_is_dyn_compatible() {
        let index: Box<dyn VectorIndex> = Box::new(DummyIndex);
        assert_eq!(index.count("").await.unwrap(), 1);
        assert!(index.get_metadata("v1").await.unwrap().is_none());
    }
}
