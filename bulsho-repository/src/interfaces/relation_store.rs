//! Relation store trait definition.

use async_trait::async_trait;
use bulsho_shared::types::{RelationKey, RelationKind, TargetId, UserId};

use crate::errors::RelationStoreError;

/// Row-level access to the user-owned relation tables (`votes`, `follows`,
/// `saved_posts`).
///
/// Implementations are injected into `MutationClient`. The store enforces a
/// single row per `RelationKey`; higher-level upsert and race handling live in
/// the client, so implementations stay plain CRUD.
#[async_trait]
pub trait RelationStore: Send + Sync {
    /// Fetch the stored value for `key`, or `None` when no row exists.
    async fn find_value(&self, key: &RelationKey) -> Result<Option<i32>, RelationStoreError>;

    /// Insert a new row.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The row was created
    /// * `Err(RelationStoreError::DuplicateRelation)` - A row for `key` already exists
    /// * `Err(RelationStoreError)` - Any other failure
    async fn insert_relation(&self, key: &RelationKey, value: i32)
        -> Result<(), RelationStoreError>;

    /// Change the value of an existing row. Returns `false` when no row matched.
    async fn update_relation(&self, key: &RelationKey, value: i32)
        -> Result<bool, RelationStoreError>;

    /// Delete the row for `key`. Returns `false` when no row existed.
    async fn delete_relation(&self, key: &RelationKey) -> Result<bool, RelationStoreError>;

    /// Sum of stored values per target. Targets without rows may be omitted.
    ///
    /// For binary kinds every row holds `1`, so the sum is the row count.
    async fn sum_values(
        &self,
        kind: RelationKind,
        target_ids: &[TargetId],
    ) -> Result<Vec<(TargetId, i64)>, RelationStoreError>;

    /// The owner's stored value per target. Targets without rows may be omitted.
    async fn owner_values(
        &self,
        owner_id: UserId,
        kind: RelationKind,
        target_ids: &[TargetId],
    ) -> Result<Vec<(TargetId, i32)>, RelationStoreError>;
}
