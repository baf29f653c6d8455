//! Error types for document store operations

use thiserror::Error;

/// Error type shared by every [`DocumentStore`](crate::DocumentStore) operation.
///
/// The `Display` output is meant to be shown to a user as-is, so variants carry a
/// short human-readable detail rather than a backend-specific code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Transport failure or backend unreachable
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Security rules rejected the operation
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Requested document does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation requires server-side setup that is missing (e.g. a composite index)
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// Transaction gave up after repeated contention
    #[error("aborted: {0}")]
    Aborted(String),

    /// Caller passed something the store cannot accept
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Document data could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Anything else
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
