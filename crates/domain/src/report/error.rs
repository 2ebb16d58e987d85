use thiserror::Error;

/// Failure to deliver a report summary to a notification sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    /// The sink could not be reached. Retryable.
    #[error("notification sink unreachable: {0}")]
    Unreachable(String),

    /// The sink refused the message.
    #[error("notification rejected: {0}")]
    Rejected(String),
}
