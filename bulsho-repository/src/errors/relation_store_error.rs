use bulsho_shared::types::{RelationKey, RowValidationError};
use thiserror::Error;

/// Represents errors that can occur within a relation or answer store.
///
/// This enum consolidates database failures, uniqueness races on insert and
/// rows that fail validation on the way out of the store.
#[derive(Debug, Error)]
pub enum RelationStoreError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Relation already exists: {0}")]
    DuplicateRelation(String),

    #[error("Invalid row: {0}")]
    InvalidRow(#[from] RowValidationError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Listener error: {0}")]
    ListenerError(String),
}

impl RelationStoreError {
    pub fn duplicate(key: &RelationKey) -> Self {
        Self::DuplicateRelation(format!(
            "kind={}, owner_id={}, target_id={}",
            key.kind, key.owner_id, key.target_id
        ))
    }

    /// Maps an insert failure, turning unique-constraint violations into `DuplicateRelation`.
    pub fn from_insert(err: sqlx::Error, key: &RelationKey) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::duplicate(key),
            _ => Self::DatabaseError(err),
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateRelation(_))
    }
}
