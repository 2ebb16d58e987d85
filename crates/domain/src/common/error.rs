use thiserror::Error;

/// Failure reported by a store accessor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Transient: connection refused, timeout, throttling. Retryable.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The addressed record does not exist.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Permanent: malformed id or record. Never retried.
    #[error("invalid record: {0}")]
    Invalid(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_transient() {
        assert!(StoreError::Unavailable("refused".into()).is_transient());
        assert!(!StoreError::NotFound("v1".into()).is_transient());
        assert!(!StoreError::Invalid("bad id".into()).is_transient());
    }

    #[test]
    fn display_includes_detail() {
        let err = StoreError::Unavailable("connection refused".into());
        assert_eq!(err.to_string(), "store unavailable: connection refused");
    }
}
