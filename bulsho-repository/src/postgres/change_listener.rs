//! Realtime change feed backed by PostgreSQL `LISTEN/NOTIFY`.
//!
//! The migrations install a trigger on every relation table and on `answers`
//! that publishes each row change as JSON on [`CHANGE_CHANNEL`]. Answer
//! notifications carry key columns only, so inserts and updates are completed
//! by reading the row back.
use async_trait::async_trait;
use bulsho_shared::types::{ChangeEvent, ChangeOp, ChangePayload};
use sqlx::postgres::PgListener;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, instrument, warn};

use crate::errors::RelationStoreError;
use crate::interfaces::{AnswerStore, ChangeSource};
use crate::postgres::PostgresAnswerStore;

/// Notification channel used by the `bulsho_notify_change` trigger.
pub const CHANGE_CHANNEL: &str = "bulsho_changes";

const ANSWERS_TABLE: &str = "answers";

/// Listens for row-change notifications and forwards them as validated events.
pub struct PgChangeListener {
    pool: sqlx::PgPool,
    answers: PostgresAnswerStore,
    channel: String,
}

impl PgChangeListener {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self::with_channel(pool, CHANGE_CHANNEL)
    }

    pub fn with_channel(pool: sqlx::PgPool, channel: impl Into<String>) -> Self {
        Self {
            answers: PostgresAnswerStore::from_pool(pool.clone()),
            pool,
            channel: channel.into(),
        }
    }

    fn parse(payload: &str) -> Option<ChangePayload> {
        match serde_json::from_str::<ChangePayload>(payload) {
            Ok(raw) => Some(raw),
            Err(e) => {
                warn!(error = %e, "Discarding unparseable change notification");
                None
            }
        }
    }

    /// Whether the payload names an answer whose body must be read back.
    fn needs_answer_body(raw: &ChangePayload) -> bool {
        raw.table == ANSWERS_TABLE && raw.op != ChangeOp::Delete
    }

    /// Validate a parsed payload. Invalid rows are logged and skipped.
    fn validate(raw: ChangePayload) -> Option<ChangeEvent> {
        match ChangeEvent::try_from(raw) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(error = %e, "Discarding invalid change notification");
                None
            }
        }
    }

    /// Turn a notification into an event, reading answer rows back by id.
    async fn resolve(&self, payload: &str) -> Option<ChangeEvent> {
        let raw = Self::parse(payload)?;
        if !Self::needs_answer_body(&raw) {
            return Self::validate(raw);
        }

        let id = match raw.answer_id() {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Discarding invalid answer notification");
                return None;
            }
        };
        match self.answers.answer_by_id(id).await {
            Ok(Some(answer)) if raw.op == ChangeOp::Insert => {
                Some(ChangeEvent::AnswerInserted(answer))
            }
            Ok(Some(answer)) => Some(ChangeEvent::AnswerUpdated(answer)),
            Ok(None) => {
                debug!(%id, "Answer removed before it could be read");
                None
            }
            Err(e) => {
                warn!(error = %e, %id, "Failed to read changed answer");
                None
            }
        }
    }
}

#[async_trait]
impl ChangeSource for PgChangeListener {
    #[instrument(skip_all, fields(channel = %self.channel))]
    async fn run(
        &self,
        sender: mpsc::Sender<ChangeEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), RelationStoreError> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(&self.channel).await?;
        info!("Listening for row changes");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Change listener shutting down");
                    break;
                }
                notification = listener.recv() => {
                    let notification = notification
                        .map_err(|e| RelationStoreError::ListenerError(e.to_string()))?;
                    let Some(event) = self.resolve(notification.payload()).await else {
                        continue;
                    };
                    debug!(?event, "Forwarding change event");
                    if sender.send(event).await.is_err() {
                        info!("Change receiver dropped, stopping listener");
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}
