//! Per-entity in-flight gate.
//!
//! At most one request per `(kind, target)` is pending at any time. Requests on
//! different entities never block each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use bulsho_shared::types::{RelationKind, TargetId};

use crate::state::EntityKey;

type Pending = Arc<Mutex<HashMap<EntityKey, i32>>>;

#[derive(Debug, Clone, Default)]
pub struct InFlightGate {
    pending: Pending,
}

impl InFlightGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the entity, recording the optimistic value it was moved to.
    ///
    /// Returns `None` when a request for the entity is already pending. The
    /// claim is released when the guard is dropped.
    pub fn try_acquire(
        &self,
        kind: RelationKind,
        target_id: TargetId,
        optimistic_value: i32,
    ) -> Option<InFlightGuard> {
        let entity = (kind, target_id);
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.contains_key(&entity) {
            return None;
        }
        pending.insert(entity, optimistic_value);
        Some(InFlightGuard {
            pending: Arc::clone(&self.pending),
            entity,
        })
    }

    /// The optimistic value of a pending request for the entity.
    pub fn pending_value(&self, kind: RelationKind, target_id: TargetId) -> Option<i32> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(kind, target_id))
            .copied()
    }

    pub fn is_in_flight(&self, kind: RelationKind, target_id: TargetId) -> bool {
        self.pending_value(kind, target_id).is_some()
    }

    /// Number of pending requests.
    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases the entity on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    pending: Pending,
    entity: EntityKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.entity);
    }
}
