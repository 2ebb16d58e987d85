//! Pure detectors. Each takes the joined inventories plus whatever the
//! backend scan returned and yields findings in report order.

use std::collections::{BTreeMap, BTreeSet};

use crate::common::entity::{NANOS_PER_SEC, age_secs};
use crate::detection::entity::{Inconsistency, InconsistencyKind, normalize};
use crate::inventory::entity::{
    DocumentRecord, Inventories, SessionRecord, VectorRecord, split_document_key,
};
use crate::workflow::entity::AuditRunConfig;

fn old_enough(created_at_ns: u64, now_ns: u64, min_age_secs: u64) -> bool {
    now_ns.saturating_sub(created_at_ns) > min_age_secs.saturating_mul(NANOS_PER_SEC)
}

/// Vectors in the inventory whose parent document is missing from the
/// document inventory.
///
/// A vector is only judged when its parent lies in a collection the
/// document inventory covered and its creation time is known and older
/// than `min_age_secs`.
pub fn detect_orphaned_vectors(
    inventories: &Inventories,
    vectors: &[VectorRecord],
    config: &AuditRunConfig,
    now_ns: u64,
) -> Vec<Inconsistency> {
    let documents = &inventories.document;
    let mut found: Vec<Inconsistency> = vectors
        .iter()
        .filter(|v| inventories.vector.contains(&v.id))
        .filter_map(|v| {
            let parent = v.source_id.as_deref()?;
            if !documents.covers_document_key(parent) || documents.contains(parent) {
                return None;
            }
            let created = v.created_at_ns?;
            if !old_enough(created, now_ns, config.min_age_secs) {
                return None;
            }
            Some(
                Inconsistency::new(InconsistencyKind::OrphanedVector, &v.id)
                    .with_detail("parent_id", parent)
                    .with_detail("age_secs", age_secs(created, now_ns)),
            )
        })
        .collect();
    normalize(&mut found);
    found
}

/// Documents that need an embedding but have no vector referencing them.
///
/// A vector references a document either through its `source_id` or by
/// carrying the document's bare id.
pub fn detect_missing_embeddings(
    inventories: &Inventories,
    documents: &[DocumentRecord],
    vectors: &[VectorRecord],
    config: &AuditRunConfig,
    now_ns: u64,
) -> Vec<Inconsistency> {
    let referenced: BTreeSet<&str> = vectors
        .iter()
        .flat_map(|v| [Some(v.id.as_str()), v.source_id.as_deref()])
        .flatten()
        .collect();

    let mut found: Vec<Inconsistency> = documents
        .iter()
        .filter(|d| d.requires_embedding && inventories.document.contains(&d.key))
        .filter(|d| {
            let bare_id = split_document_key(&d.key).map_or(d.key.as_str(), |(_, id)| id);
            !referenced.contains(d.key.as_str()) && !referenced.contains(bare_id)
        })
        .filter_map(|d| {
            let created = d.created_at_ns?;
            if !old_enough(created, now_ns, config.min_age_secs) {
                return None;
            }
            Some(
                Inconsistency::new(InconsistencyKind::MissingEmbedding, &d.key)
                    .with_detail("collection", d.collection.as_str())
                    .with_detail("age_secs", age_secs(created, now_ns)),
            )
        })
        .collect();
    normalize(&mut found);
    found
}

/// Sessions whose last activity is older than the retention TTL but which
/// are still present in the cache.
pub fn detect_expired_sessions(
    sessions: &[SessionRecord],
    config: &AuditRunConfig,
    now_ns: u64,
) -> Vec<Inconsistency> {
    let ttl_ns = config.session_ttl_secs.saturating_mul(NANOS_PER_SEC);
    let mut found: Vec<Inconsistency> = sessions
        .iter()
        .filter_map(|s| {
            let last = s.last_activity_ns?;
            if now_ns.saturating_sub(last) <= ttl_ns {
                return None;
            }
            let mut finding = Inconsistency::new(InconsistencyKind::ExpiredSession, &s.session_id)
                .with_detail("key", s.key.as_str())
                .with_detail("age_secs", age_secs(last, now_ns));
            if let Some(ttl) = s.ttl_remaining_secs {
                finding = finding.with_detail("ttl_remaining_secs", ttl);
            }
            Some(finding)
        })
        .collect();
    normalize(&mut found);
    found
}

/// Vectors whose embedding is at least `similarity_threshold` similar to an
/// older vector. The older vector is kept; the newer one is reported.
///
/// Quadratic in the number of vectors; callers bound the input.
pub fn detect_duplicate_vectors(
    vectors: &[VectorRecord],
    config: &AuditRunConfig,
) -> Vec<Inconsistency> {
    let mut candidates: Vec<(&VectorRecord, &[f32])> = vectors
        .iter()
        .filter_map(|v| {
            let embedding = v.embedding.as_deref()?;
            (!embedding.is_empty()).then_some((v, embedding))
        })
        .collect();
    // Oldest first; unknown creation times sort last.
    candidates.sort_by(|(a, _), (b, _)| {
        a.created_at_ns
            .unwrap_or(u64::MAX)
            .cmp(&b.created_at_ns.unwrap_or(u64::MAX))
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut flagged: BTreeMap<&str, Inconsistency> = BTreeMap::new();
    for (i, (keeper, keeper_embedding)) in candidates.iter().enumerate() {
        if flagged.contains_key(keeper.id.as_str()) {
            continue;
        }
        for (other, other_embedding) in &candidates[i + 1..] {
            if flagged.contains_key(other.id.as_str()) {
                continue;
            }
            let similarity = cosine_similarity(keeper_embedding, other_embedding);
            if similarity >= config.similarity_threshold {
                flagged.insert(
                    other.id.as_str(),
                    Inconsistency::new(InconsistencyKind::DuplicateVector, &other.id)
                        .with_detail("duplicate_of", keeper.id.as_str())
                        .with_detail("similarity", similarity),
                );
            }
        }
    }
    flagged.into_values().collect()
}

/// Cosine similarity of two embeddings. Zero for mismatched dimensions or a
/// zero-length vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0_f64, 0.0_f64, 0.0_f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
