//! Helpers shared by the in-memory and redb store adapters.

use domain::common::entity::NANOS_PER_SEC;
use domain::common::error::StoreError;
use domain::inventory::entity::{DocumentFilter, DocumentRecord, split_document_key};

/// Body field marking a document that must have an embedding.
pub(crate) const REQUIRES_EMBEDDING_FIELD: &str = "requires_embedding";
/// Body field holding the document creation time.
pub(crate) const CREATED_AT_FIELD: &str = "created_at_ns";

/// Match a key against a pattern with an optional trailing `*`.
pub(crate) fn key_matches(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

/// Build the auditor's view of a stored document body.
pub(crate) fn document_from_body(key: &str, body: serde_json::Value) -> Result<DocumentRecord, StoreError> {
    let (collection, _) = split_document_key(key)
        .ok_or_else(|| StoreError::Invalid(format!("malformed document key '{key}'")))?;
    Ok(DocumentRecord {
        key: key.to_string(),
        collection: collection.to_string(),
        requires_embedding: body
            .get(REQUIRES_EMBEDDING_FIELD)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false),
        created_at_ns: body.get(CREATED_AT_FIELD).and_then(serde_json::Value::as_u64),
        body,
    })
}

pub(crate) fn matches_filter(record: &DocumentRecord, filter: DocumentFilter) -> bool {
    match filter {
        DocumentFilter::All => true,
        DocumentFilter::RequiresEmbedding => record.requires_embedding,
    }
}

/// Validate a `(collection, id)` pair before writing.
pub(crate) fn checked_key(collection: &str, id: &str) -> Result<String, StoreError> {
    if collection.is_empty() || collection.contains('/') || id.is_empty() {
        return Err(StoreError::Invalid(format!(
            "invalid document address '{collection}/{id}'"
        )));
    }
    Ok(domain::inventory::entity::document_key(collection, id))
}

/// Remaining whole seconds until `expires_at_ns`, rounded up.
#[allow(clippy::cast_possible_wrap)]
pub(crate) fn remaining_ttl_secs(expires_at_ns: u64, now_ns: u64) -> i64 {
    (expires_at_ns.saturating_sub(now_ns).div_ceil(NANOS_PER_SEC)) as i64
}
