use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bulsho_shared::types::{RelationKey, RelationKind, TargetId, UserId};
use tokio::sync::Mutex;

use crate::errors::RelationStoreError;
use crate::interfaces::RelationStore;

/// Relation store kept in process memory.
#[derive(Default)]
pub struct InMemoryRelationStore {
    rows: Mutex<HashMap<RelationKey, i32>>,
    fail_all: AtomicBool,
    failures_remaining: AtomicUsize,
    insert_race: Mutex<Option<i32>>,
    calls: AtomicUsize,
}

impl InMemoryRelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed rows without going through the trait.
    pub async fn with_rows(rows: impl IntoIterator<Item = (RelationKey, i32)>) -> Self {
        let store = Self::new();
        store.rows.lock().await.extend(rows);
        store
    }

    /// Make every subsequent call fail until switched off.
    pub fn set_failing(&self, failing: bool) {
        self.fail_all.store(failing, Ordering::SeqCst);
    }

    /// Make the next `count` calls fail.
    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// On the next insert, pretend a concurrent request created the row first
    /// with `value`, so the insert hits the uniqueness constraint.
    pub async fn simulate_insert_race(&self, value: i32) {
        *self.insert_race.lock().await = Some(value);
    }

    /// Number of trait calls served, failed ones included.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn value(&self, key: &RelationKey) -> Option<i32> {
        self.rows.lock().await.get(key).copied()
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }

    fn check_available(&self) -> Result<(), RelationStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(RelationStoreError::Unavailable("store is failing".to_string()));
        }
        let consumed = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            return Err(RelationStoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RelationStore for InMemoryRelationStore {
    async fn find_value(&self, key: &RelationKey) -> Result<Option<i32>, RelationStoreError> {
        self.check_available()?;
        Ok(self.rows.lock().await.get(key).copied())
    }

    async fn insert_relation(
        &self,
        key: &RelationKey,
        value: i32,
    ) -> Result<(), RelationStoreError> {
        self.check_available()?;
        let mut rows = self.rows.lock().await;
        if let Some(winner) = self.insert_race.lock().await.take() {
            rows.insert(*key, winner);
        }
        if rows.contains_key(key) {
            return Err(RelationStoreError::duplicate(key));
        }
        rows.insert(*key, value);
        Ok(())
    }

    async fn update_relation(
        &self,
        key: &RelationKey,
        value: i32,
    ) -> Result<bool, RelationStoreError> {
        self.check_available()?;
        match self.rows.lock().await.get_mut(key) {
            Some(stored) => {
                *stored = value;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_relation(&self, key: &RelationKey) -> Result<bool, RelationStoreError> {
        self.check_available()?;
        Ok(self.rows.lock().await.remove(key).is_some())
    }

    async fn sum_values(
        &self,
        kind: RelationKind,
        target_ids: &[TargetId],
    ) -> Result<Vec<(TargetId, i64)>, RelationStoreError> {
        self.check_available()?;
        let wanted: HashSet<&TargetId> = target_ids.iter().collect();
        let mut sums: HashMap<TargetId, i64> = HashMap::new();
        for (key, value) in self.rows.lock().await.iter() {
            if key.kind == kind && wanted.contains(&key.target_id) {
                *sums.entry(key.target_id).or_insert(0) += i64::from(*value);
            }
        }
        Ok(sums.into_iter().collect())
    }

    async fn owner_values(
        &self,
        owner_id: UserId,
        kind: RelationKind,
        target_ids: &[TargetId],
    ) -> Result<Vec<(TargetId, i32)>, RelationStoreError> {
        self.check_available()?;
        let rows = self.rows.lock().await;
        Ok(target_ids
            .iter()
            .filter_map(|target_id| {
                rows.get(&RelationKey::new(kind, owner_id, *target_id))
                    .map(|value| (*target_id, *value))
            })
            .collect())
    }
}
