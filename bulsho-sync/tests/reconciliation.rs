//! End-to-end reconciliation against the in-memory relation store.

use std::sync::Arc;

use bulsho_repository::{InMemoryRelationStore, MutationClient, MutationError};
use bulsho_shared::types::{
    Notification, NotificationLevel, RelationKey, RelationKind, RemoteOperation, VotableType,
};
use bulsho_sync::{
    resolve, ChannelNotifier, EntitySnapshot, Reconciler, RelationLoader, Session,
    SharedRelations, ToggleOutcome,
};
use tokio::sync::mpsc;
use uuid::Uuid;

struct Setup {
    store: Arc<InMemoryRelationStore>,
    reconciler: Reconciler,
    loader: RelationLoader,
    notifications: mpsc::UnboundedReceiver<Notification>,
    user: Uuid,
}

fn setup(store: InMemoryRelationStore) -> Setup {
    let user = Uuid::new_v4();
    let store = Arc::new(store);
    let client = Arc::new(MutationClient::new(store.clone()));
    let session = Session::fixed(Some(user));
    let relations = SharedRelations::new();
    let (notifier, notifications) = ChannelNotifier::new();

    Setup {
        store,
        reconciler: Reconciler::new(
            client.clone(),
            session.clone(),
            Arc::new(notifier),
            relations.clone(),
        ),
        loader: RelationLoader::new(client, session, relations),
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
async fn scenario_first_vote_creates_and_increments() {
    let question = Uuid::new_v4();
    let kind = RelationKind::Vote(VotableType::Question);
    let store = InMemoryRelationStore::with_rows(vec![
        (RelationKey::new(kind, Uuid::new_v4(), question), 1),
        (RelationKey::new(kind, Uuid::new_v4(), question), 1),
    ])
    .await;
    let s = setup(store);
    s.loader.hydrate(kind, &[question]).await.unwrap();

    let resolution = resolve(s.reconciler.value(kind, question), 1);
    assert_eq!(resolution.operation, RemoteOperation::Create);

    let outcome = s.reconciler.vote(VotableType::Question, question, 1).await.unwrap();

    assert_eq!(
        outcome,
        ToggleOutcome::Confirmed {
            value: 1,
            count: Some(3)
        }
    );
    assert_eq!(
        s.store
            .value(&RelationKey::new(kind, s.user, question))
            .await,
        Some(1)
    );
}

#[tokio::test]
async fn scenario_repeated_vote_deletes_and_decrements() {
    let answer = Uuid::new_v4();
    let kind = RelationKind::Vote(VotableType::Answer);
    let s = setup(InMemoryRelationStore::new());
    // The first insert loses a race against a concurrent request.
    s.store.simulate_insert_race(1).await;
    s.loader.hydrate(kind, &[answer]).await.unwrap();

    let first = s.reconciler.vote(VotableType::Answer, answer, 1).await.unwrap();
    assert_eq!(first.value(), 1);

    let second = s.reconciler.vote(VotableType::Answer, answer, 1).await.unwrap();

    assert_eq!(
        second,
        ToggleOutcome::Confirmed {
            value: 0,
            count: Some(0)
        }
    );
    assert!(s.store.is_empty().await);
}

#[tokio::test]
async fn scenario_failed_follow_restores_snapshot() {
    let author = Uuid::new_v4();
    let mut s = setup(InMemoryRelationStore::new());
    s.loader.hydrate(RelationKind::Follow, &[author]).await.unwrap();
    let before = s.reconciler.relations().snapshot(RelationKind::Follow, author);
    assert_eq!(
        before,
        EntitySnapshot {
            value: 0,
            count: Some(0)
        }
    );

    s.store.fail_next(1);
    let outcome = s.reconciler.follow(author).await.unwrap();

    assert!(matches!(
        outcome,
        ToggleOutcome::Reverted {
            error: MutationError::StoreError(_),
            ..
        }
    ));
    assert_eq!(
        s.reconciler.relations().snapshot(RelationKind::Follow, author),
        before
    );
    let notifications = drain(&mut s.notifications);
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].level, NotificationLevel::Error);
}

#[tokio::test]
async fn rollback_is_exact_for_every_kind() {
    let kinds = [
        RelationKind::Vote(VotableType::Question),
        RelationKind::Vote(VotableType::Answer),
        RelationKind::Follow,
        RelationKind::Save,
    ];

    for kind in kinds {
        let target = Uuid::new_v4();
        let mut s = setup(InMemoryRelationStore::new());
        // Start from a present relation so both directions get exercised.
        s.reconciler.toggle(kind, target, 1).await.unwrap();
        s.loader.hydrate(kind, &[target]).await.unwrap();

        for _ in 0..2 {
            let before = s.reconciler.relations().snapshot(kind, target);
            s.store.set_failing(true);
            let outcome = s.reconciler.toggle(kind, target, 1).await.unwrap();
            s.store.set_failing(false);

            assert!(!outcome.is_confirmed(), "{kind} should have failed");
            assert_eq!(s.reconciler.relations().snapshot(kind, target), before, "{kind}");
            assert_eq!(drain(&mut s.notifications).len(), 1, "{kind}");

            // Move to the other state and try again from there.
            s.reconciler.toggle(kind, target, 1).await.unwrap();
        }
    }
}

#[tokio::test]
async fn count_is_conserved_across_toggles() {
    let question = Uuid::new_v4();
    let kind = RelationKind::Vote(VotableType::Question);
    let store = InMemoryRelationStore::with_rows(vec![(
        RelationKey::new(kind, Uuid::new_v4(), question),
        5,
    )])
    .await;
    let s = setup(store);
    s.loader.hydrate(kind, &[question]).await.unwrap();
    let start = s.reconciler.count(kind, question).unwrap();

    for requested in [1, -1, -1, 1, 1, 2, 2] {
        let outcome = s.reconciler.toggle(kind, question, requested).await.unwrap();
        assert_eq!(outcome.count(), Some(start + i64::from(outcome.value())));
    }

    // The cache agrees with a fresh read from the store.
    let cached = s.reconciler.count(kind, question);
    s.loader.hydrate(kind, &[question]).await.unwrap();
    assert_eq!(s.reconciler.count(kind, question), cached);
}
