//! Error types for the service binary.

use bulsho_repository::RelationStoreError;
use bulsho_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during service initialization or execution.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Database connection error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Store or migration error.
    #[error("Store error: {0}")]
    Store(#[from] RelationStoreError),

    /// Error from the sync layer.
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
