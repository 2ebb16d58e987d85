use crate::secondary::store_accessor::{StoreAccessor, StoreFuture};

/// Key-value cache holding live sessions.
///
/// Patterns support a single trailing `*` wildcard.
pub trait CacheStore: StoreAccessor {
    /// Keys matching `pattern`, in ascending order.
    fn scan<'a>(&'a self, pattern: &'a str) -> StoreFuture<'a, Vec<String>>;

    /// Remaining TTL of `key` in seconds. `None` when the key has no
    /// expiry or does not exist.
    fn get_ttl<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<i64>>;

    /// JSON value stored at `key` (session metadata).
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<serde_json::Value>>;
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use domain::common::entity::{Backend, DeleteOutcome};

    struct DummyCache;

    impl StoreAccessor for DummyCache {
        fn backend(&self) -> Backend {
            Backend::Cache
        }
        fn count<'a>(&'a self, _scope: &'a str) -> StoreFuture<'a, u64> {
            Box::pin(async { Ok(0) })
        }
        fn list_ids<'a>(&'a self, _scope: &'a str) -> StoreFuture<'a, BTreeSet<String>> {
            Box::pin(async { Ok(BTreeSet::new()) })
        }
        fn delete<'a>(&'a self, _id: &'a str) -> StoreFuture<'a, DeleteOutcome> {
            Box::pin(async { Ok(DeleteOutcome::Deleted) })
        }
    }

    impl CacheStore for DummyCache {
        fn scan<'a>(&'a self, _pattern: &'a str) -> StoreFuture<'a, Vec<String>> {
            Box::pin(async { Ok(vec![]) })
        }
        fn get_ttl<'a>(&'a self, _key: &'a str) -> StoreFuture<'a, Option<i64>> {
            Box::pin(async { Ok(None) })
        }
        fn get<'a>(&'a self, _key: &'a str) -> StoreFuture<'a, Option<serde_json::Value>> {
            Box::pin(async { Ok(None) })
        }
    }

    #[test]
    fn cache_store_is_dyn_compatible() {
        let cache: Box<dyn CacheStore> = Box::new(DummyCache);
        assert_eq!(cache.backend(), Backend::Cache);
    }
}
