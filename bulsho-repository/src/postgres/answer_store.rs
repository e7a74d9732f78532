use async_trait::async_trait;
use bulsho_shared::types::{Answer, AnswerId, QuestionId};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::RelationStoreError;
use crate::interfaces::AnswerStore;

#[derive(Debug, sqlx::FromRow)]
struct AnswerRecord {
    id: Uuid,
    question_id: Uuid,
    parent_id: Option<Uuid>,
    user_id: Uuid,
    content: String,
    created_at: DateTime<Utc>,
}

impl From<AnswerRecord> for Answer {
    fn from(record: AnswerRecord) -> Self {
        Answer {
            id: record.id,
            question_id: record.question_id,
            parent_id: record.parent_id,
            author_id: record.user_id,
            content: record.content,
            created_at: record.created_at,
        }
    }
}

/// PostgreSQL-backed answer reads.
#[derive(Clone)]
pub struct PostgresAnswerStore {
    pool: sqlx::PgPool,
}

impl PostgresAnswerStore {
    pub async fn new(pool: sqlx::PgPool) -> Result<Self, RelationStoreError> {
        Ok(Self::from_pool(pool))
    }

    pub(crate) fn from_pool(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnswerStore for PostgresAnswerStore {
    async fn answers_for_question(
        &self,
        question_id: QuestionId,
    ) -> Result<Vec<Answer>, RelationStoreError> {
        let records = sqlx::query_as::<_, AnswerRecord>(
            r#"
            SELECT id, question_id, parent_id, user_id, content, created_at
            FROM answers
            WHERE question_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(question_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(Answer::from).collect())
    }

    async fn answer_by_id(&self, id: AnswerId) -> Result<Option<Answer>, RelationStoreError> {
        let record = sqlx::query_as::<_, AnswerRecord>(
            r#"
            SELECT id, question_id, parent_id, user_id, content, created_at
            FROM answers
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Answer::from))
    }
}
