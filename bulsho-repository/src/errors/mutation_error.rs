use std::time::Duration;

use thiserror::Error;

use crate::errors::RelationStoreError;

/// Discriminated result of every `MutationClient` operation.
pub type MutationResult<T> = Result<T, MutationError>;

/// Errors returned across the `MutationClient` boundary.
///
/// Payloads are plain strings so the error can be cloned into notifications,
/// logs and test assertions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    /// The request was rejected before reaching the store.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// A user tried to follow themselves.
    #[error("Self relation is not allowed for {0}")]
    SelfRelation(String),

    /// The store reported a failure.
    #[error("Store error: {0}")]
    StoreError(String),

    /// The store did not answer within the configured timeout.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Batch size exceeds configured maximum.
    #[error("Batch size {provided} exceeds maximum {max}")]
    BatchSizeExceeded { provided: usize, max: usize },

    /// The remote call panicked.
    #[error("Unexpected failure: {0}")]
    Unexpected(String),
}

impl MutationError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreError(msg.into())
    }

    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::Unexpected(msg.into())
    }

    pub fn batch_size_exceeded(provided: usize, max: usize) -> Self {
        Self::BatchSizeExceeded { provided, max }
    }
}

impl From<RelationStoreError> for MutationError {
    fn from(err: RelationStoreError) -> Self {
        Self::StoreError(err.to_string())
    }
}
