//! Error types for SealDB operations.

use thiserror::Error;

use crate::vector::VectorId;

/// Result type alias using SealDB's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during SealDB operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Vector dimension mismatch between index and input.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Attempted to insert a vector whose identifier is already indexed.
    #[error("duplicate vector id: {0}")]
    DuplicateId(VectorId),

    /// Attempted to register a topic that is already present.
    #[error("topic already exists: {0}")]
    AlreadyExists(String),

    /// Sealing or opening a payload failed (bad hex, short blob, failed
    /// authentication, bad key material).
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Query against an empty structure or a missing identifier.
    #[error("not found: {0}")]
    NotFound(String),

    /// Degenerate input such as a zero-magnitude or non-finite vector.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// One or more vectors of a batch insert failed. The rest were inserted.
    #[error("batch insert failed for {} of {total} vectors", failures.len())]
    Batch {
        total: usize,
        failures: Vec<(VectorId, Error)>,
    },

    /// A blocking task spawned by the async wrapper panicked or was cancelled.
    #[error("background task failed: {0}")]
    TaskFailed(String),
}

impl Error {
    /// Returns true for errors raised by the cipher codec.
    pub fn is_crypto(&self) -> bool {
        matches!(self, Error::Crypto(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::DimensionMismatch {
            expected: 384,
            got: 512,
        };
        assert_eq!(err.to_string(), "dimension mismatch: expected 384, got 512");
    }

    #[test]
    fn test_batch_error_display() {
        let err = Error::Batch {
            total: 10,
            failures: vec![
                ("a".to_string(), Error::DuplicateId("a".to_string())),
                (
                    "b".to_string(),
                    Error::DimensionMismatch {
                        expected: 3,
                        got: 2,
                    },
                ),
            ],
        };
        assert_eq!(err.to_string(), "batch insert failed for 2 of 10 vectors");
    }

    #[test]
    fn test_is_crypto() {
        assert!(Error::Crypto("tag mismatch".into()).is_crypto());
        assert!(!Error::NotFound("x".into()).is_crypto());
    }
}
