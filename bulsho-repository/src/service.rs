//! Mutation client implementation.
//!
//! This module provides the service every caller uses to persist a single
//! user-owned relation and to batch-read relation state. It hides the store
//! behind upsert and idempotent-delete semantics, so the backend can be
//! swapped without touching the reconciliation logic.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bulsho_shared::types::{RelationKey, RelationKind, RemoteOperation, TargetId, UserId};
use futures::FutureExt;
use tracing::{debug, instrument, warn};

use crate::config::MutationClientConfig;
use crate::errors::{MutationError, MutationResult, RelationStoreError};
use crate::interfaces::RelationStore;

/// How a successful `cast_relation` reached its final state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// A new row was inserted.
    Created,
    /// An existing row took the new value.
    Updated,
    /// The insert lost a race against a concurrent insert; the winning row was
    /// updated to the requested value instead, or re-inserted if it was
    /// deleted in between.
    RaceResolved,
}

/// The main service for persisting relations.
///
/// Every operation returns a [`MutationResult`]. Store failures, timeouts and
/// panics inside the store are converted into [`MutationError`] values and
/// never escape as panics.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use bulsho_repository::{InMemoryRelationStore, MutationClient};
/// use bulsho_shared::types::{RelationKind, VotableType};
/// use uuid::Uuid;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = MutationClient::new(Arc::new(InMemoryRelationStore::new()));
/// let (user, question) = (Uuid::new_v4(), Uuid::new_v4());
///
/// client
///     .cast_relation(RelationKind::Vote(VotableType::Question), user, question, 1)
///     .await?;
/// let totals = client
///     .get_aggregate(RelationKind::Vote(VotableType::Question), &[question])
///     .await?;
/// assert_eq!(totals[&question], 1);
/// # Ok(())
/// # }
/// ```
pub struct MutationClient {
    store: Arc<dyn RelationStore>,
    config: MutationClientConfig,
}

impl MutationClient {
    /// Create a new MutationClient with default configuration.
    pub fn new(store: Arc<dyn RelationStore>) -> Self {
        Self {
            store,
            config: MutationClientConfig::default(),
        }
    }

    /// Create a new MutationClient with custom configuration.
    pub fn with_config(store: Arc<dyn RelationStore>, config: MutationClientConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &MutationClientConfig {
        &self.config
    }

    /// Check a value before it is written for `key`.
    fn validate_cast(key: &RelationKey, value: i32) -> MutationResult<()> {
        if key.is_self_follow() {
            return Err(MutationError::SelfRelation(key.kind.to_string()));
        }
        if value == 0 {
            return Err(MutationError::validation(
                "value must be non-zero; use remove_relation to clear a relation",
            ));
        }
        if key.kind.is_binary() && value != 1 {
            return Err(MutationError::validation(format!(
                "{} relations only accept the value 1, got {}",
                key.kind, value
            )));
        }
        Ok(())
    }

    /// Check if batch size exceeds the configured limit.
    fn validate_batch_size(&self, size: usize) -> MutationResult<()> {
        if let Some(max) = self.config.max_batch_size {
            if size > max {
                return Err(MutationError::batch_size_exceeded(size, max));
            }
        }
        Ok(())
    }

    /// Remove duplicate ids, keeping first occurrences in order.
    fn dedupe(target_ids: &[TargetId]) -> Vec<TargetId> {
        let mut seen = HashSet::with_capacity(target_ids.len());
        target_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// Run a store future under the request timeout, converting every failure
    /// mode into a `MutationError`.
    async fn guarded<T, F>(&self, operation: &'static str, fut: F) -> MutationResult<T>
    where
        F: Future<Output = Result<T, RelationStoreError>> + Send,
    {
        let timeout = self.config.request_timeout;
        let result = match tokio::time::timeout(timeout, AssertUnwindSafe(fut).catch_unwind()).await
        {
            Err(_) => Err(MutationError::Timeout(timeout)),
            Ok(Err(panic)) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "store panicked".to_string());
                Err(MutationError::unexpected(detail))
            }
            Ok(Ok(result)) => result.map_err(MutationError::from),
        };

        if let Err(e) = &result {
            warn!(operation, error = %e, "Store operation failed");
        }
        result
    }

    /// Write `value` for `(owner_id, target_id, kind)`, updating an existing row or
    /// inserting a new one.
    ///
    /// A uniqueness violation on insert means another request created the row
    /// first (e.g. a double click). It is resolved by updating that row to
    /// `value` and reported as success. If that row was removed in the
    /// meantime the insert is tried once more.
    ///
    /// # Returns
    ///
    /// * `Ok(WriteOutcome)` - The row now holds `value`
    /// * `Err(MutationError::ValidationError)` - Zero value, or a binary kind with a value other than 1
    /// * `Err(MutationError::SelfRelation)` - A user tried to follow themselves
    /// * `Err(MutationError)` - Store failure or timeout
    #[instrument(skip(self), fields(kind = %kind))]
    pub async fn cast_relation(
        &self,
        kind: RelationKind,
        owner_id: UserId,
        target_id: TargetId,
        value: i32,
    ) -> MutationResult<WriteOutcome> {
        let key = RelationKey::new(kind, owner_id, target_id);
        Self::validate_cast(&key, value)?;

        let store = &self.store;
        self.guarded("cast_relation", async {
            if store.update_relation(&key, value).await? {
                return Ok(WriteOutcome::Updated);
            }
            match store.insert_relation(&key, value).await {
                Ok(()) => Ok(WriteOutcome::Created),
                Err(e) if e.is_duplicate() => {
                    debug!("Insert raced with a concurrent request, updating the winning row");
                    if !store.update_relation(&key, value).await? {
                        // The winning row was deleted in between; a second
                        // duplicate here is returned as an error.
                        debug!("Winning row is gone, inserting again");
                        store.insert_relation(&key, value).await?;
                    }
                    Ok(WriteOutcome::RaceResolved)
                }
                Err(e) => Err(e),
            }
        })
        .await
    }

    /// Delete the relation row if present.
    ///
    /// Deleting an absent row is not an error.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - A row was deleted
    /// * `Ok(false)` - There was nothing to delete
    /// * `Err(MutationError)` - Store failure or timeout
    #[instrument(skip(self), fields(kind = %kind))]
    pub async fn remove_relation(
        &self,
        owner_id: UserId,
        target_id: TargetId,
        kind: RelationKind,
    ) -> MutationResult<bool> {
        let key = RelationKey::new(kind, owner_id, target_id);
        let store = &self.store;
        self.guarded("remove_relation", async { store.delete_relation(&key).await })
            .await
    }

    /// Batch-fetch the summed value per target.
    ///
    /// Every requested id is present in the result; targets without rows map
    /// to `0`. Empty input returns an empty map without touching the store.
    ///
    /// # Returns
    ///
    /// * `Ok(HashMap)` - Total per target
    /// * `Err(MutationError::BatchSizeExceeded)` - Too many distinct ids
    /// * `Err(MutationError)` - Store failure or timeout
    #[instrument(skip(self, target_ids), fields(kind = %kind, targets = target_ids.len()))]
    pub async fn get_aggregate(
        &self,
        kind: RelationKind,
        target_ids: &[TargetId],
    ) -> MutationResult<HashMap<TargetId, i64>> {
        if target_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let target_ids = Self::dedupe(target_ids);
        self.validate_batch_size(target_ids.len())?;

        let store = &self.store;
        let ids = &target_ids;
        let totals = self
            .guarded("get_aggregate", async { store.sum_values(kind, ids).await })
            .await?;

        let mut result: HashMap<TargetId, i64> = target_ids.iter().map(|id| (*id, 0)).collect();
        result.extend(totals);
        Ok(result)
    }

    /// Batch-fetch the owner's own value per target, with the same contract as
    /// [`get_aggregate`](Self::get_aggregate).
    #[instrument(skip(self, target_ids), fields(kind = %kind, targets = target_ids.len()))]
    pub async fn get_owner_relations(
        &self,
        owner_id: UserId,
        kind: RelationKind,
        target_ids: &[TargetId],
    ) -> MutationResult<HashMap<TargetId, i32>> {
        if target_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let target_ids = Self::dedupe(target_ids);
        self.validate_batch_size(target_ids.len())?;

        let store = &self.store;
        let ids = &target_ids;
        let values = self
            .guarded("get_owner_relations", async {
                store.owner_values(owner_id, kind, ids).await
            })
            .await?;

        let mut result: HashMap<TargetId, i32> = target_ids.iter().map(|id| (*id, 0)).collect();
        result.extend(values);
        Ok(result)
    }

    /// Execute a resolved remote operation for `key`.
    ///
    /// `Create` and `Update` both go through the upsert path so a stale local
    /// view of row existence cannot fail the write.
    pub async fn apply(
        &self,
        key: &RelationKey,
        operation: RemoteOperation,
        value: i32,
    ) -> MutationResult<()> {
        match operation {
            RemoteOperation::Create | RemoteOperation::Update => self
                .cast_relation(key.kind, key.owner_id, key.target_id, value)
                .await
                .map(|_| ()),
            RemoteOperation::Delete => self
                .remove_relation(key.owner_id, key.target_id, key.kind)
                .await
                .map(|_| ()),
        }
    }
}
