use thiserror::Error;

use crate::common::entity::Backend;
use crate::common::error::StoreError;
use crate::detection::entity::InconsistencyKind;
use crate::report::error::NotifyError;
use crate::workflow::entity::AuditStage;

/// Failure of a single activity attempt, or of an activity after its retry
/// policy gave up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActivityError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("activity timed out after {0} ms")]
    Timeout(u64),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("activity cancelled")]
    Cancelled,
}

impl ActivityError {
    /// Stable name matched against a retry policy's non-retryable list.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "unavailable",
            Self::Timeout(_) => "timeout",
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Internal(_) => "internal",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<StoreError> for ActivityError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => Self::Unavailable(msg),
            StoreError::NotFound(msg) => Self::NotFound(msg),
            StoreError::Invalid(msg) => Self::Validation(msg),
        }
    }
}

impl From<NotifyError> for ActivityError {
    fn from(err: NotifyError) -> Self {
        match err {
            NotifyError::Rejected(msg) => Self::Validation(msg),
            NotifyError::Unreachable(msg) => Self::Unavailable(msg),
        }
    }
}

impl From<CheckpointError> for ActivityError {
    fn from(err: CheckpointError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Run-level failure of the audit workflow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("inventory unavailable for backend {backend}: {source}")]
    InventoryUnavailable {
        backend: Backend,
        source: ActivityError,
    },

    #[error("detection failed for {kind}: {source}")]
    DetectionFailed {
        kind: InconsistencyKind,
        source: ActivityError,
    },

    #[error("report failed: {0}")]
    ReportFailed(ActivityError),

    #[error("checkpoint store error: {0}")]
    Checkpoint(String),

    #[error("invalid stage transition from {from} to {to}")]
    InvalidTransition { from: AuditStage, to: AuditStage },

    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("run already finished: {0}")]
    AlreadyFinished(String),

    #[error("workflow cancelled")]
    Cancelled,
}

impl From<CheckpointError> for WorkflowError {
    fn from(err: CheckpointError) -> Self {
        Self::Checkpoint(err.to_string())
    }
}

/// Failure of the durable checkpoint store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckpointError {
    #[error("checkpoint storage error: {0}")]
    Storage(String),

    #[error("corrupt checkpoint entry {key}: {reason}")]
    Corrupt { key: String, reason: String },
}
