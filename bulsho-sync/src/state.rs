//! Local relation cache.
//!
//! Holds the signed-in user's own relation values and the aggregate counts of
//! the targets on screen. Only the reconciler and the change-feed reducer write
//! to it. Value and count writes are stamped with separate versions so a
//! rollback can tell which half was overwritten while a request was pending.
//! Another user's row moving the count is a relative change and leaves the
//! count version alone.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use bulsho_shared::types::{ChangeEvent, RelationKind, TargetId, UserId};

/// A single relation entity as seen by the current user.
pub type EntityKey = (RelationKind, TargetId);

/// Pre-action state of one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitySnapshot {
    pub value: i32,
    pub count: Option<i64>,
}

/// Versions of the last value write and the last absolute count write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Stamps {
    value: u64,
    count: u64,
}

/// What a rollback undid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rollback {
    pub value_restored: bool,
    pub count_restored: bool,
}

#[derive(Debug, Default)]
pub struct RelationCache {
    values: HashMap<EntityKey, i32>,
    counts: HashMap<EntityKey, i64>,
    stamps: HashMap<EntityKey, Stamps>,
    clock: u64,
}

impl RelationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current user's value for the entity, `0` when absent.
    pub fn value(&self, kind: RelationKind, target_id: TargetId) -> i32 {
        self.values.get(&(kind, target_id)).copied().unwrap_or(0)
    }

    /// The aggregate for the entity, if one has been loaded.
    pub fn count(&self, kind: RelationKind, target_id: TargetId) -> Option<i64> {
        self.counts.get(&(kind, target_id)).copied()
    }

    /// Version of the last value or absolute count write, `0` if never written.
    pub fn version(&self, kind: RelationKind, target_id: TargetId) -> u64 {
        let stamps = self.stamps(&(kind, target_id));
        stamps.value.max(stamps.count)
    }

    pub fn snapshot(&self, kind: RelationKind, target_id: TargetId) -> EntitySnapshot {
        EntitySnapshot {
            value: self.value(kind, target_id),
            count: self.count(kind, target_id),
        }
    }

    fn stamps(&self, entity: &EntityKey) -> Stamps {
        self.stamps.get(entity).copied().unwrap_or_default()
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn stamp_value(&mut self, entity: EntityKey) -> u64 {
        let version = self.tick();
        self.stamps.entry(entity).or_default().value = version;
        version
    }

    fn stamp_count(&mut self, entity: EntityKey) -> u64 {
        let version = self.tick();
        self.stamps.entry(entity).or_default().count = version;
        version
    }

    fn write_value(&mut self, entity: EntityKey, value: i32) {
        if value == 0 {
            self.values.remove(&entity);
        } else {
            self.values.insert(entity, value);
        }
    }

    fn write_count(&mut self, entity: EntityKey, count: Option<i64>) {
        match count {
            Some(count) => self.counts.insert(entity, count),
            None => self.counts.remove(&entity),
        };
    }

    /// Write a value and count together. Returns the new version.
    pub fn apply(
        &mut self,
        kind: RelationKind,
        target_id: TargetId,
        value: i32,
        count: Option<i64>,
    ) -> u64 {
        let entity = (kind, target_id);
        self.write_value(entity, value);
        self.write_count(entity, count);
        let version = self.tick();
        self.stamps.insert(
            entity,
            Stamps {
                value: version,
                count: version,
            },
        );
        version
    }

    /// Undo an optimistic write stamped `version` that moved the value from
    /// `snapshot.value` to `optimistic_value`.
    ///
    /// The value goes back to the snapshot unless it was written since. The
    /// count is moved back by the optimistic delta unless an absolute count
    /// was written since, so deltas from other users' rows survive.
    pub fn rollback(
        &mut self,
        kind: RelationKind,
        target_id: TargetId,
        snapshot: &EntitySnapshot,
        optimistic_value: i32,
        version: u64,
    ) -> Rollback {
        let entity = (kind, target_id);
        let stamps = self.stamps(&entity);

        let value_restored = stamps.value == version;
        if value_restored {
            self.write_value(entity, snapshot.value);
            self.stamp_value(entity);
        }

        let count_restored = stamps.count == version;
        if count_restored {
            if snapshot.count.is_none() {
                self.counts.remove(&entity);
            } else if let Some(count) = self.counts.get_mut(&entity) {
                *count -= i64::from(optimistic_value) - i64::from(snapshot.value);
            }
            self.stamp_count(entity);
        }

        Rollback {
            value_restored,
            count_restored,
        }
    }

    /// Authoritative value of the current user, e.g. from a batch fetch.
    pub fn set_value(&mut self, kind: RelationKind, target_id: TargetId, value: i32) {
        let entity = (kind, target_id);
        self.write_value(entity, value);
        self.stamp_value(entity);
    }

    /// Authoritative aggregate, e.g. from a batch fetch.
    pub fn set_count(&mut self, kind: RelationKind, target_id: TargetId, count: i64) {
        let entity = (kind, target_id);
        self.counts.insert(entity, count);
        self.stamp_count(entity);
    }

    /// Forget every own-relation value, e.g. when the signed-in user changes.
    /// Aggregates are kept since they do not depend on the viewer.
    pub fn clear_values(&mut self) {
        let entities: Vec<EntityKey> = self.values.drain().map(|(entity, _)| entity).collect();
        for entity in entities {
            self.stamp_value(entity);
        }
    }

    /// Reduce a change event into the cache. Returns whether anything changed.
    ///
    /// Aggregates move by the value delta of the row. For rows owned by
    /// `current_user` the delta is taken against the cached value, so the echo
    /// of a write the reconciler already applied is not counted twice.
    /// Aggregates that were never loaded stay unloaded.
    ///
    /// An own row stamps both halves even when nothing moved: the value is now
    /// confirmed by the server and the count agrees with it.
    pub fn apply_event(&mut self, event: &ChangeEvent, current_user: Option<UserId>) -> bool {
        match event {
            ChangeEvent::RelationChanged {
                key,
                value,
                previous_value,
            } => {
                let entity = (key.kind, key.target_id);
                let own = current_user == Some(key.owner_id);
                let delta = if own {
                    i64::from(*value) - i64::from(self.value(key.kind, key.target_id))
                } else {
                    i64::from(*value) - i64::from(*previous_value)
                };

                if own {
                    self.write_value(entity, *value);
                    self.stamp_value(entity);
                    if let Some(count) = self.counts.get_mut(&entity) {
                        *count += delta;
                        self.stamp_count(entity);
                    }
                    return delta != 0;
                }
                if delta == 0 {
                    return false;
                }
                match self.counts.get_mut(&entity) {
                    Some(count) => {
                        *count += delta;
                        true
                    }
                    None => false,
                }
            }
            ChangeEvent::AggregateRefreshed {
                kind,
                target_id,
                total,
            } => {
                if self.count(*kind, *target_id) == Some(*total) {
                    return false;
                }
                self.set_count(*kind, *target_id, *total);
                true
            }
            ChangeEvent::AnswerInserted(_)
            | ChangeEvent::AnswerUpdated(_)
            | ChangeEvent::AnswerDeleted { .. } => false,
        }
    }
}

/// The cache shared between the reconciler, the loader and the orchestrator.
///
/// The lock is never held across an await point.
#[derive(Debug, Clone, Default)]
pub struct SharedRelations {
    inner: Arc<Mutex<RelationCache>>,
}

impl SharedRelations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with exclusive access to the cache.
    pub fn with<R>(&self, f: impl FnOnce(&mut RelationCache) -> R) -> R {
        let mut cache = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut cache)
    }

    pub fn value(&self, kind: RelationKind, target_id: TargetId) -> i32 {
        self.with(|cache| cache.value(kind, target_id))
    }

    pub fn count(&self, kind: RelationKind, target_id: TargetId) -> Option<i64> {
        self.with(|cache| cache.count(kind, target_id))
    }

    pub fn snapshot(&self, kind: RelationKind, target_id: TargetId) -> EntitySnapshot {
        self.with(|cache| cache.snapshot(kind, target_id))
    }
}
