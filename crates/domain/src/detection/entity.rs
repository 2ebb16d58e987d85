use serde::{Deserialize, Serialize};

use crate::common::entity::Backend;

/// Category of cross-store inconsistency.
///
/// Declaration order is the report's grouping order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InconsistencyKind {
    /// Vector whose parent document no longer exists.
    OrphanedVector,
    /// Document that should be embedded but has no vector.
    MissingEmbedding,
    /// Session still present in the cache past its retention TTL.
    ExpiredSession,
    /// Near-identical embedding of an older vector. Report only.
    DuplicateVector,
}

impl InconsistencyKind {
    pub const ALL: [Self; 4] = [
        Self::OrphanedVector,
        Self::MissingEmbedding,
        Self::ExpiredSession,
        Self::DuplicateVector,
    ];

    /// Kinds that have a cleanup executor, in dispatch order.
    pub const CLEANABLE: [Self; 2] = [Self::OrphanedVector, Self::ExpiredSession];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OrphanedVector => "orphaned_vector",
            Self::MissingEmbedding => "missing_embedding",
            Self::ExpiredSession => "expired_session",
            Self::DuplicateVector => "duplicate_vector",
        }
    }

    /// The backend whose inventory total this kind is measured against.
    pub fn backend(self) -> Backend {
        match self {
            Self::OrphanedVector | Self::DuplicateVector => Backend::Vector,
            Self::MissingEmbedding => Backend::Document,
            Self::ExpiredSession => Backend::Cache,
        }
    }

    pub fn has_executor(self) -> bool {
        Self::CLEANABLE.contains(&self)
    }
}

impl std::fmt::Display for InconsistencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single finding produced by one detector in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inconsistency {
    pub kind: InconsistencyKind,
    pub subject_id: String,
    #[serde(default)]
    pub detail: serde_json::Map<String, serde_json::Value>,
}

impl Inconsistency {
    pub fn new(kind: InconsistencyKind, subject_id: impl Into<String>) -> Self {
        Self {
            kind,
            subject_id: subject_id.into(),
            detail: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.detail.insert(key.to_string(), value.into());
        self
    }
}

/// Order findings by kind, then subject id, and drop repeated subjects
/// within a kind.
pub fn normalize(findings: &mut Vec<Inconsistency>) {
    findings.sort_by(|a, b| {
        a.kind
            .cmp(&b.kind)
            .then_with(|| a.subject_id.cmp(&b.subject_id))
    });
    findings.dedup_by(|a, b| a.kind == b.kind && a.subject_id == b.subject_id);
}

/// Subject ids of one kind, in report order.
pub fn subjects_of(findings: &[Inconsistency], kind: InconsistencyKind) -> Vec<String> {
    findings
        .iter()
        .filter(|f| f.kind == kind)
        .map(|f| f.subject_id.clone())
        .collect()
}
