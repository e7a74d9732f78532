use async_trait::async_trait;
use bulsho_shared::types::{Answer, AnswerId, QuestionId};

use crate::errors::RelationStoreError;

/// Read access to the `answers` table.
#[async_trait]
pub trait AnswerStore: Send + Sync {
    /// All answers of a question ordered by `created_at` ascending, ties broken by id.
    async fn answers_for_question(
        &self,
        question_id: QuestionId,
    ) -> Result<Vec<Answer>, RelationStoreError>;

    /// A single answer, `None` if it does not exist (any more).
    async fn answer_by_id(&self, id: AnswerId) -> Result<Option<Answer>, RelationStoreError>;
}
