//! Error types for the sync layer.

use bulsho_repository::{MutationError, RelationStoreError};
use bulsho_shared::types::{RelationKind, TargetId};
use thiserror::Error;

/// Errors returned by the reconciler, the loader and the orchestrator.
///
/// A failed remote write is not one of these: the reconciler rolls it back and
/// reports it as [`ToggleOutcome::Reverted`](crate::ToggleOutcome::Reverted).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// No user is signed in.
    #[error("No user is signed in")]
    NotAuthenticated,

    /// The action would relate a user to themselves.
    #[error("Self {0} is not allowed")]
    SelfRelation(RelationKind),

    /// The requested value is not valid for the relation kind.
    #[error("Invalid value {value} for {kind}")]
    InvalidValue { kind: RelationKind, value: i32 },

    /// A request for the same entity is still in flight.
    #[error("A {kind} request for {target_id} is already in flight")]
    Busy { kind: RelationKind, target_id: TargetId },

    /// A read through the mutation client failed.
    #[error("Remote error: {0}")]
    Remote(#[from] MutationError),

    /// The change feed failed.
    #[error("Change feed error: {0}")]
    Feed(String),
}

impl SyncError {
    pub fn feed(msg: impl Into<String>) -> Self {
        Self::Feed(msg.into())
    }
}

impl From<RelationStoreError> for SyncError {
    fn from(err: RelationStoreError) -> Self {
        Self::Feed(err.to_string())
    }
}
