//! In-memory adapters. Selected with `stores.backend: memory` for local
//! runs and used as fixtures by workflow tests.

pub mod cache_store;
pub mod checkpoint_store;
pub mod document_store;
pub mod vector_index;

use domain::common::error::StoreError;

fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Unavailable(format!("lock poisoned: {e}"))
}
