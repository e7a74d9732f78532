//! Batch hydration of the relation cache.
//!
//! Fetches aggregates and the current user's own values for the targets on
//! screen and feeds them through the same reducer as realtime events.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bulsho_repository::{MutationClient, MutationResult};
use bulsho_shared::types::{ChangeEvent, RelationKey, RelationKind, TargetId, UserId};
use tracing::{debug, instrument};

use crate::errors::SyncError;
use crate::session::Session;
use crate::state::SharedRelations;

/// Batch reads of relation state.
#[async_trait]
pub trait RelationSource: Send + Sync {
    /// Most ids a single batch read accepts, `None` when unbounded.
    fn max_batch_size(&self) -> Option<usize> {
        None
    }

    async fn aggregates(
        &self,
        kind: RelationKind,
        target_ids: &[TargetId],
    ) -> MutationResult<HashMap<TargetId, i64>>;

    async fn owner_relations(
        &self,
        owner_id: UserId,
        kind: RelationKind,
        target_ids: &[TargetId],
    ) -> MutationResult<HashMap<TargetId, i32>>;
}

#[async_trait]
impl RelationSource for MutationClient {
    fn max_batch_size(&self) -> Option<usize> {
        self.config().max_batch_size
    }

    async fn aggregates(
        &self,
        kind: RelationKind,
        target_ids: &[TargetId],
    ) -> MutationResult<HashMap<TargetId, i64>> {
        self.get_aggregate(kind, target_ids).await
    }

    async fn owner_relations(
        &self,
        owner_id: UserId,
        kind: RelationKind,
        target_ids: &[TargetId],
    ) -> MutationResult<HashMap<TargetId, i32>> {
        self.get_owner_relations(owner_id, kind, target_ids).await
    }
}

pub struct RelationLoader {
    source: Arc<dyn RelationSource>,
    session: Session,
    relations: SharedRelations,
}

impl RelationLoader {
    pub fn new(source: Arc<dyn RelationSource>, session: Session, relations: SharedRelations) -> Self {
        Self {
            source,
            session,
            relations,
        }
    }

    /// Load aggregates for `target_ids`, plus the signed-in user's own values.
    ///
    /// Ids are fetched in chunks no larger than the source's batch limit.
    /// Nothing is applied unless every chunk succeeds.
    ///
    /// Returns the events that were applied.
    #[instrument(skip(self, target_ids), fields(kind = %kind, targets = target_ids.len()))]
    pub async fn hydrate(
        &self,
        kind: RelationKind,
        target_ids: &[TargetId],
    ) -> Result<Vec<ChangeEvent>, SyncError> {
        if target_ids.is_empty() {
            return Ok(Vec::new());
        }

        let chunk_size = self
            .source
            .max_batch_size()
            .filter(|max| *max > 0)
            .unwrap_or(target_ids.len());
        let current_user = self.session.current_user();

        let mut totals = HashMap::with_capacity(target_ids.len());
        let mut own = HashMap::new();
        for chunk in target_ids.chunks(chunk_size) {
            totals.extend(self.source.aggregates(kind, chunk).await?);
            if let Some(owner_id) = current_user {
                own.extend(self.source.owner_relations(owner_id, kind, chunk).await?);
            }
        }

        let mut events: Vec<ChangeEvent> = totals
            .into_iter()
            .map(|(target_id, total)| ChangeEvent::AggregateRefreshed {
                kind,
                target_id,
                total,
            })
            .collect();

        if let Some(owner_id) = current_user {
            // Own values land as set_value writes; the counts above are authoritative.
            self.relations.with(|cache| {
                for (target_id, value) in &own {
                    cache.set_value(kind, *target_id, *value);
                }
            });
            events.extend(own.into_iter().map(|(target_id, value)| {
                ChangeEvent::RelationChanged {
                    key: RelationKey::new(kind, owner_id, target_id),
                    value,
                    previous_value: value,
                }
            }));
        }

        self.relations.with(|cache| {
            for event in &events {
                cache.apply_event(event, current_user);
            }
        });

        debug!(events = events.len(), "Hydrated relations");
        Ok(events)
    }
}
