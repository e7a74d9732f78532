//! Optimistic reconciler.
//!
//! A toggle is applied to the local cache before the remote write is awaited.
//! If the write fails, times out or panics, the optimistic change is undone
//! and a single error notification is raised. Votes,
//! follows and saves all go through the same [`Reconciler::toggle`].

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bulsho_repository::{MutationClient, MutationError, MutationResult};
use bulsho_shared::types::{
    Notification, RelationKey, RelationKind, RemoteOperation, TargetId, UserId, VotableType,
};
use futures::FutureExt;
use tracing::{debug, error, info, instrument};

use crate::errors::SyncError;
use crate::inflight::InFlightGate;
use crate::notifier::Notifier;
use crate::resolver::{next_count, resolve};
use crate::session::Session;
use crate::state::SharedRelations;

/// Default timeout for remote writes.
pub const DEFAULT_RECONCILE_TIMEOUT: Duration = Duration::from_secs(12);

const SIGN_IN_MESSAGE: &str = "Please sign in to continue";
const SELF_FOLLOW_MESSAGE: &str = "You cannot follow yourself";
const FAILURE_MESSAGE: &str = "Something went wrong. Please try again.";

/// The remote write a reconciler issues.
#[async_trait]
pub trait RemoteMutation: Send + Sync {
    async fn execute(
        &self,
        key: &RelationKey,
        operation: RemoteOperation,
        value: i32,
    ) -> MutationResult<()>;
}

#[async_trait]
impl RemoteMutation for MutationClient {
    async fn execute(
        &self,
        key: &RelationKey,
        operation: RemoteOperation,
        value: i32,
    ) -> MutationResult<()> {
        self.apply(key, operation, value).await
    }
}

/// Configuration for the reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Upper bound on a remote write. Expiry counts as failure.
    pub timeout: Duration,
    /// Emit a success notification when a write is confirmed.
    pub announce_success: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_RECONCILE_TIMEOUT,
            announce_success: false,
        }
    }
}

/// How a toggle ended. Both variants leave the entity idle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The remote write succeeded; the optimistic state stands.
    Confirmed { value: i32, count: Option<i64> },
    /// The remote write failed; the entity was rolled back.
    Reverted {
        value: i32,
        count: Option<i64>,
        error: MutationError,
    },
}

impl ToggleOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, ToggleOutcome::Confirmed { .. })
    }

    pub fn value(&self) -> i32 {
        match self {
            ToggleOutcome::Confirmed { value, .. } | ToggleOutcome::Reverted { value, .. } => {
                *value
            }
        }
    }

    pub fn count(&self) -> Option<i64> {
        match self {
            ToggleOutcome::Confirmed { count, .. } | ToggleOutcome::Reverted { count, .. } => {
                *count
            }
        }
    }
}

/// Lifecycle of one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityPhase {
    Idle,
    Pending { optimistic_value: i32 },
}

pub struct Reconciler {
    remote: Arc<dyn RemoteMutation>,
    session: Session,
    notifier: Arc<dyn Notifier>,
    relations: SharedRelations,
    gate: InFlightGate,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(
        remote: Arc<dyn RemoteMutation>,
        session: Session,
        notifier: Arc<dyn Notifier>,
        relations: SharedRelations,
    ) -> Self {
        Self::with_config(
            remote,
            session,
            notifier,
            relations,
            ReconcilerConfig::default(),
        )
    }

    pub fn with_config(
        remote: Arc<dyn RemoteMutation>,
        session: Session,
        notifier: Arc<dyn Notifier>,
        relations: SharedRelations,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            remote,
            session,
            notifier,
            relations,
            gate: InFlightGate::new(),
            config,
        }
    }

    pub fn relations(&self) -> &SharedRelations {
        &self.relations
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The current user's value for the entity, `0` when absent.
    pub fn value(&self, kind: RelationKind, target_id: TargetId) -> i32 {
        self.relations.value(kind, target_id)
    }

    /// The aggregate for the entity, if one has been loaded.
    pub fn count(&self, kind: RelationKind, target_id: TargetId) -> Option<i64> {
        self.relations.count(kind, target_id)
    }

    pub fn phase(&self, kind: RelationKind, target_id: TargetId) -> EntityPhase {
        match self.gate.pending_value(kind, target_id) {
            Some(optimistic_value) => EntityPhase::Pending { optimistic_value },
            None => EntityPhase::Idle,
        }
    }

    /// Toggle a vote. Repeating the current vote removes it.
    pub async fn vote(
        &self,
        votable_type: VotableType,
        votable_id: TargetId,
        value: i32,
    ) -> Result<ToggleOutcome, SyncError> {
        self.toggle(RelationKind::Vote(votable_type), votable_id, value)
            .await
    }

    /// Follow the user, or unfollow if already following.
    pub async fn follow(&self, user_id: UserId) -> Result<ToggleOutcome, SyncError> {
        self.toggle(RelationKind::Follow, user_id, 1).await
    }

    /// Save the post, or unsave if already saved.
    pub async fn save(&self, post_id: TargetId) -> Result<ToggleOutcome, SyncError> {
        self.toggle(RelationKind::Save, post_id, 1).await
    }

    /// Apply `requested_value` optimistically and persist it.
    ///
    /// # Returns
    ///
    /// * `Ok(ToggleOutcome::Confirmed)` - The write succeeded
    /// * `Ok(ToggleOutcome::Reverted)` - The write failed and the entity was rolled back
    /// * `Err(SyncError::NotAuthenticated)` - Nobody is signed in; nothing changed
    /// * `Err(SyncError::SelfRelation)` - The user tried to follow themselves; nothing changed
    /// * `Err(SyncError::InvalidValue)` - Zero, or a binary kind with a value other than 1
    /// * `Err(SyncError::Busy)` - A request for this entity is still pending; nothing changed
    #[instrument(skip(self), fields(kind = %kind))]
    pub async fn toggle(
        &self,
        kind: RelationKind,
        target_id: TargetId,
        requested_value: i32,
    ) -> Result<ToggleOutcome, SyncError> {
        let Some(owner_id) = self.session.current_user() else {
            self.notifier.notify(Notification::info(SIGN_IN_MESSAGE));
            return Err(SyncError::NotAuthenticated);
        };

        let key = RelationKey::new(kind, owner_id, target_id);
        if key.is_self_follow() {
            self.notifier.notify(Notification::info(SELF_FOLLOW_MESSAGE));
            return Err(SyncError::SelfRelation(kind));
        }
        if requested_value == 0 || (kind.is_binary() && requested_value != 1) {
            return Err(SyncError::InvalidValue {
                kind,
                value: requested_value,
            });
        }

        // Snapshot, claim and apply under one lock so no event slips in between.
        let (guard, snapshot, resolution, optimistic_count, version) =
            self.relations.with(|cache| {
                let snapshot = cache.snapshot(kind, target_id);
                let resolution = resolve(snapshot.value, requested_value);
                let guard = self
                    .gate
                    .try_acquire(kind, target_id, resolution.next_value)
                    .ok_or(SyncError::Busy { kind, target_id })?;
                let optimistic_count = snapshot
                    .count
                    .map(|count| next_count(count, snapshot.value, resolution.next_value));
                let version =
                    cache.apply(kind, target_id, resolution.next_value, optimistic_count);
                Ok::<_, SyncError>((guard, snapshot, resolution, optimistic_count, version))
            })?;

        debug!(
            previous_value = snapshot.value,
            next_value = resolution.next_value,
            operation = ?resolution.operation,
            "Applied optimistic state"
        );

        let result = self.execute_remote(&key, resolution.operation, resolution.next_value).await;

        let outcome = match result {
            Ok(()) => {
                info!(value = resolution.next_value, "Relation confirmed");
                if self.config.announce_success {
                    self.notifier.notify(Notification::success(success_message(
                        kind,
                        resolution.operation,
                    )));
                }
                ToggleOutcome::Confirmed {
                    value: resolution.next_value,
                    count: optimistic_count,
                }
            }
            Err(error) => {
                error!(error = %error, "Remote write failed, rolling back");
                let (value, count) = self.relations.with(|cache| {
                    let rollback = cache.rollback(
                        kind,
                        target_id,
                        &snapshot,
                        resolution.next_value,
                        version,
                    );
                    if !rollback.value_restored || !rollback.count_restored {
                        debug!(
                            value_restored = rollback.value_restored,
                            count_restored = rollback.count_restored,
                            "Entity was refreshed while pending, keeping the newer state"
                        );
                    }
                    (cache.value(kind, target_id), cache.count(kind, target_id))
                });
                self.notifier.notify(Notification::error(FAILURE_MESSAGE));
                ToggleOutcome::Reverted {
                    value,
                    count,
                    error,
                }
            }
        };

        drop(guard);
        Ok(outcome)
    }

    /// Run the remote write under the timeout, turning panics into errors.
    async fn execute_remote(
        &self,
        key: &RelationKey,
        operation: RemoteOperation,
        value: i32,
    ) -> MutationResult<()> {
        let call = AssertUnwindSafe(self.remote.execute(key, operation, value)).catch_unwind();
        match tokio::time::timeout(self.config.timeout, call).await {
            Err(_) => Err(MutationError::Timeout(self.config.timeout)),
            Ok(Err(_)) => Err(MutationError::unexpected("remote write panicked")),
            Ok(Ok(result)) => result,
        }
    }
}

fn success_message(kind: RelationKind, operation: RemoteOperation) -> &'static str {
    let removed = operation == RemoteOperation::Delete;
    match (kind, removed) {
        (RelationKind::Vote(_), false) => "Vote recorded",
        (RelationKind::Vote(_), true) => "Vote removed",
        (RelationKind::Follow, false) => "Followed",
        (RelationKind::Follow, true) => "Unfollowed",
        (RelationKind::Save, false) => "Saved",
        (RelationKind::Save, true) => "Removed from saved",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::ChannelNotifier;
    use bulsho_shared::types::{ChangeEvent, NotificationLevel};
    use tokio::sync::{mpsc, oneshot, Mutex};
    use uuid::Uuid;

    const QUESTION_VOTE: RelationKind = RelationKind::Vote(VotableType::Question);

    /// Remote that records calls and fails on demand.
    #[derive(Default)]
    struct MockRemote {
        calls: Mutex<Vec<(RelationKey, RemoteOperation, i32)>>,
        should_fail: bool,
    }

    impl MockRemote {
        fn failing() -> Self {
            Self {
                should_fail: true,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl RemoteMutation for MockRemote {
        async fn execute(
            &self,
            key: &RelationKey,
            operation: RemoteOperation,
            value: i32,
        ) -> MutationResult<()> {
            self.calls.lock().await.push((*key, operation, value));
            if self.should_fail {
                Err(MutationError::store("connection refused"))
            } else {
                Ok(())
            }
        }
    }

    /// Remote that parks every call until the test releases it.
    struct GatedRemote {
        started: mpsc::UnboundedSender<oneshot::Sender<MutationResult<()>>>,
    }

    #[async_trait]
    impl RemoteMutation for GatedRemote {
        async fn execute(
            &self,
            _key: &RelationKey,
            _operation: RemoteOperation,
            _value: i32,
        ) -> MutationResult<()> {
            let (release, wait) = oneshot::channel();
            let _ = self.started.send(release);
            wait.await
                .unwrap_or_else(|_| Err(MutationError::unexpected("released without answer")))
        }
    }

    struct PanickingRemote;

    #[async_trait]
    impl RemoteMutation for PanickingRemote {
        async fn execute(
            &self,
            _key: &RelationKey,
            _operation: RemoteOperation,
            _value: i32,
        ) -> MutationResult<()> {
            panic!("transport exploded");
        }
    }

    struct Harness {
        reconciler: Arc<Reconciler>,
        notifications: mpsc::UnboundedReceiver<Notification>,
        user: UserId,
    }

    fn harness(remote: Arc<dyn RemoteMutation>, config: ReconcilerConfig) -> Harness {
        let user = Uuid::new_v4();
        let (notifier, notifications) = ChannelNotifier::new();
        let reconciler = Reconciler::with_config(
            remote,
            Session::fixed(Some(user)),
            Arc::new(notifier),
            SharedRelations::new(),
            config,
        );
        Harness {
            reconciler: Arc::new(reconciler),
            notifications,
            user,
        }
    }

    fn drain(receiver: &mut mpsc::UnboundedReceiver<Notification>) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(notification) = receiver.try_recv() {
            out.push(notification);
        }
        out
    }

    #[tokio::test]
    async fn test_vote_confirmed_updates_value_and_count() {
        let remote = Arc::new(MockRemote::default());
        let mut h = harness(remote.clone(), ReconcilerConfig::default());
        let question = Uuid::new_v4();
        h.reconciler
            .relations()
            .with(|cache| cache.set_count(QUESTION_VOTE, question, 4));

        let outcome = h
            .reconciler
            .vote(VotableType::Question, question, 1)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ToggleOutcome::Confirmed {
                value: 1,
                count: Some(5)
            }
        );
        assert_eq!(h.reconciler.value(QUESTION_VOTE, question), 1);
        assert_eq!(h.reconciler.count(QUESTION_VOTE, question), Some(5));
        assert_eq!(
            remote.calls.lock().await.as_slice(),
            &[(
                RelationKey::new(QUESTION_VOTE, h.user, question),
                RemoteOperation::Create,
                1
            )]
        );
        assert!(drain(&mut h.notifications).is_empty());
    }

    #[tokio::test]
    async fn test_second_vote_deletes() {
        let remote = Arc::new(MockRemote::default());
        let h = harness(remote.clone(), ReconcilerConfig::default());
        let question = Uuid::new_v4();
        h.reconciler
            .relations()
            .with(|cache| cache.set_count(QUESTION_VOTE, question, 4));

        h.reconciler.vote(VotableType::Question, question, 1).await.unwrap();
        let outcome = h
            .reconciler
            .vote(VotableType::Question, question, 1)
            .await
            .unwrap();

        assert_eq!(outcome.value(), 0);
        assert_eq!(outcome.count(), Some(4));
        assert_eq!(remote.calls.lock().await[1].1, RemoteOperation::Delete);
    }

    #[tokio::test]
    async fn test_failed_follow_rolls_back_and_notifies_once() {
        let remote = Arc::new(MockRemote::failing());
        let mut h = harness(remote, ReconcilerConfig::default());
        let author = Uuid::new_v4();
        h.reconciler
            .relations()
            .with(|cache| cache.set_count(RelationKind::Follow, author, 10));
        let before = h.reconciler.relations().snapshot(RelationKind::Follow, author);

        let outcome = h.reconciler.follow(author).await.unwrap();

        assert!(matches!(
            outcome,
            ToggleOutcome::Reverted {
                value: 0,
                count: Some(10),
                error: MutationError::StoreError(_)
            }
        ));
        assert_eq!(
            h.reconciler.relations().snapshot(RelationKind::Follow, author),
            before
        );
        let notifications = drain(&mut h.notifications);
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].level, NotificationLevel::Error);
        assert_eq!(h.reconciler.phase(RelationKind::Follow, author), EntityPhase::Idle);
    }

    #[tokio::test]
    async fn test_unauthenticated_is_rejected_locally() {
        let remote = Arc::new(MockRemote::default());
        let (notifier, mut notifications) = ChannelNotifier::new();
        let reconciler = Reconciler::new(
            remote.clone(),
            Session::fixed(None),
            Arc::new(notifier),
            SharedRelations::new(),
        );
        let post = Uuid::new_v4();

        let result = reconciler.save(post).await;

        assert_eq!(result, Err(SyncError::NotAuthenticated));
        assert_eq!(reconciler.value(RelationKind::Save, post), 0);
        assert!(remote.calls.lock().await.is_empty());
        assert_eq!(
            drain(&mut notifications),
            vec![Notification::info(SIGN_IN_MESSAGE)]
        );
    }

    #[tokio::test]
    async fn test_self_follow_is_rejected_locally() {
        let remote = Arc::new(MockRemote::default());
        let mut h = harness(remote.clone(), ReconcilerConfig::default());

        let result = h.reconciler.follow(h.user).await;

        assert_eq!(result, Err(SyncError::SelfRelation(RelationKind::Follow)));
        assert!(remote.calls.lock().await.is_empty());
        assert_eq!(drain(&mut h.notifications)[0].level, NotificationLevel::Info);
    }

    #[tokio::test]
    async fn test_invalid_values_are_rejected() {
        let h = harness(Arc::new(MockRemote::default()), ReconcilerConfig::default());
        let target = Uuid::new_v4();

        assert!(matches!(
            h.reconciler.toggle(QUESTION_VOTE, target, 0).await,
            Err(SyncError::InvalidValue { value: 0, .. })
        ));
        assert!(matches!(
            h.reconciler.toggle(RelationKind::Save, target, 3).await,
            Err(SyncError::InvalidValue { value: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_pending_entity_rejects_new_actions() {
        let (started_tx, mut started_rx) = mpsc::unbounded_channel();
        let h = harness(
            Arc::new(GatedRemote { started: started_tx }),
            ReconcilerConfig::default(),
        );
        let post = Uuid::new_v4();
        let other = Uuid::new_v4();

        let first = {
            let reconciler = h.reconciler.clone();
            tokio::spawn(async move { reconciler.save(post).await })
        };
        let release_first = started_rx.recv().await.unwrap();

        assert_eq!(
            h.reconciler.phase(RelationKind::Save, post),
            EntityPhase::Pending { optimistic_value: 1 }
        );
        assert_eq!(
            h.reconciler.save(post).await,
            Err(SyncError::Busy {
                kind: RelationKind::Save,
                target_id: post
            })
        );

        // A different entity is not blocked.
        let second = {
            let reconciler = h.reconciler.clone();
            tokio::spawn(async move { reconciler.save(other).await })
        };
        let release_second = started_rx.recv().await.unwrap();
        release_second.send(Ok(())).unwrap();
        assert!(second.await.unwrap().unwrap().is_confirmed());

        release_first.send(Ok(())).unwrap();
        assert!(first.await.unwrap().unwrap().is_confirmed());
        assert_eq!(h.reconciler.phase(RelationKind::Save, post), EntityPhase::Idle);
        assert_eq!(h.reconciler.value(RelationKind::Save, post), 1);
    }

    #[tokio::test]
    async fn test_refresh_during_pending_is_not_clobbered_by_rollback() {
        let (started_tx, mut started_rx) = mpsc::unbounded_channel();
        let h = harness(
            Arc::new(GatedRemote { started: started_tx }),
            ReconcilerConfig::default(),
        );
        let answer = Uuid::new_v4();
        let kind = RelationKind::Vote(VotableType::Answer);
        h.reconciler
            .relations()
            .with(|cache| cache.set_count(kind, answer, 1));

        let pending = {
            let reconciler = h.reconciler.clone();
            tokio::spawn(async move { reconciler.vote(VotableType::Answer, answer, 1).await })
        };
        let release = started_rx.recv().await.unwrap();
        assert_eq!(h.reconciler.count(kind, answer), Some(2));

        h.reconciler
            .relations()
            .with(|cache| cache.set_count(kind, answer, 7));
        release.send(Err(MutationError::store("boom"))).unwrap();

        let outcome = pending.await.unwrap().unwrap();
        assert!(!outcome.is_confirmed());
        assert_eq!(h.reconciler.count(kind, answer), Some(7));
    }

    #[tokio::test]
    async fn test_rollback_keeps_other_users_votes_that_landed_while_pending() {
        let (started_tx, mut started_rx) = mpsc::unbounded_channel();
        let h = harness(
            Arc::new(GatedRemote { started: started_tx }),
            ReconcilerConfig::default(),
        );
        let answer = Uuid::new_v4();
        let kind = RelationKind::Vote(VotableType::Answer);
        h.reconciler
            .relations()
            .with(|cache| cache.set_count(kind, answer, 4));

        let pending = {
            let reconciler = h.reconciler.clone();
            tokio::spawn(async move { reconciler.vote(VotableType::Answer, answer, 1).await })
        };
        let release = started_rx.recv().await.unwrap();

        let other_vote = ChangeEvent::RelationChanged {
            key: RelationKey::new(kind, Uuid::new_v4(), answer),
            value: 1,
            previous_value: 0,
        };
        h.reconciler
            .relations()
            .with(|cache| cache.apply_event(&other_vote, Some(h.user)));
        assert_eq!(h.reconciler.count(kind, answer), Some(6));
        release.send(Err(MutationError::store("boom"))).unwrap();

        let outcome = pending.await.unwrap().unwrap();
        assert!(matches!(
            outcome,
            ToggleOutcome::Reverted {
                value: 0,
                count: Some(5),
                ..
            }
        ));
        assert_eq!(h.reconciler.value(kind, answer), 0);
        assert_eq!(h.reconciler.count(kind, answer), Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_rolls_back() {
        let (started_tx, mut started_rx) = mpsc::unbounded_channel();
        let mut h = harness(
            Arc::new(GatedRemote { started: started_tx }),
            ReconcilerConfig {
                timeout: Duration::from_secs(3),
                announce_success: false,
            },
        );
        let post = Uuid::new_v4();

        let pending = {
            let reconciler = h.reconciler.clone();
            tokio::spawn(async move { reconciler.save(post).await })
        };
        // Keep the sender alive so the call never resolves on its own.
        let _release = started_rx.recv().await.unwrap();

        let outcome = pending.await.unwrap().unwrap();
        assert_eq!(
            outcome,
            ToggleOutcome::Reverted {
                value: 0,
                count: None,
                error: MutationError::Timeout(Duration::from_secs(3)),
            }
        );
        assert_eq!(h.reconciler.value(RelationKind::Save, post), 0);
        assert_eq!(drain(&mut h.notifications).len(), 1);
    }

    #[tokio::test]
    async fn test_panicking_remote_rolls_back() {
        let h = harness(Arc::new(PanickingRemote), ReconcilerConfig::default());
        let post = Uuid::new_v4();

        let outcome = h.reconciler.save(post).await.unwrap();

        assert!(matches!(
            outcome,
            ToggleOutcome::Reverted {
                error: MutationError::Unexpected(_),
                ..
            }
        ));
        assert_eq!(h.reconciler.value(RelationKind::Save, post), 0);
    }

    #[tokio::test]
    async fn test_success_announcement_is_optional() {
        let mut h = harness(
            Arc::new(MockRemote::default()),
            ReconcilerConfig {
                announce_success: true,
                ..ReconcilerConfig::default()
            },
        );

        h.reconciler.save(Uuid::new_v4()).await.unwrap();

        assert_eq!(
            drain(&mut h.notifications),
            vec![Notification::success("Saved")]
        );
    }
}
