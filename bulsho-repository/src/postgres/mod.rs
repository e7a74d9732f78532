//! PostgreSQL implementations of the relation, answer and change-feed interfaces.

mod answer_store;
mod change_listener;
mod relation_store;

pub use answer_store::PostgresAnswerStore;
pub use change_listener::{PgChangeListener, CHANGE_CHANNEL};
pub use relation_store::PostgresRelationStore;

use crate::errors::RelationStoreError;

/// Apply the embedded schema migrations.
pub async fn run_migrations(pool: &sqlx::PgPool) -> Result<(), RelationStoreError> {
    sqlx::migrate!("src/postgres/migrations").run(pool).await?;
    Ok(())
}
