use std::collections::BTreeSet;

use domain::inventory::entity::{DocumentFilter, DocumentRecord};

use crate::secondary::store_accessor::{StoreAccessor, StoreFuture};

/// Document store holding the system of record.
///
/// Records are addressed by `<collection>/<id>` keys; `count` and
/// `list_ids` take a collection name as scope.
pub trait DocumentStore: StoreAccessor {
    /// Keys of the documents in `collection` matching `filter`.
    fn list_ids_filtered<'a>(
        &'a self,
        collection: &'a str,
        filter: DocumentFilter,
    ) -> StoreFuture<'a, BTreeSet<String>>;

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<DocumentRecord>>;

    /// Create or replace `<collection>/<id>` with `value`.
    fn put<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        value: &'a serde_json::Value,
    ) -> StoreFuture<'a, ()>;
}
