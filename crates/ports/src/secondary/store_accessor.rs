use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;

use domain::common::entity::{Backend, DeleteOutcome};
use domain::common::error::StoreError;

/// Boxed future returned by every store accessor method.
///
/// Uses `Pin<Box<dyn Future>>` (instead of RPITIT) so the accessor traits
/// stay dyn-compatible and can be injected as `Arc<dyn DocumentStore>` etc.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Operations shared by every backend the auditor inspects.
///
/// `scope` is backend specific: a collection name for the document store,
/// a key pattern (`prefix*`) for the cache, ignored by the vector index.
pub trait StoreAccessor: Send + Sync {
    fn backend(&self) -> Backend;

    /// Number of records within `scope`.
    fn count<'a>(&'a self, scope: &'a str) -> StoreFuture<'a, u64>;

    /// Ids of the records within `scope`.
    fn list_ids<'a>(&'a self, scope: &'a str) -> StoreFuture<'a, BTreeSet<String>>;

    /// Delete one record. Deleting an absent id succeeds with
    /// [`DeleteOutcome::NotFound`].
    fn delete<'a>(&'a self, id: &'a str) -> StoreFuture<'a, DeleteOutcome>;
}
