use async_trait::async_trait;
use bulsho_shared::types::{Answer, AnswerId, QuestionId};
use tokio::sync::Mutex;

use crate::errors::RelationStoreError;
use crate::interfaces::AnswerStore;

/// Answer store kept in process memory.
#[derive(Default)]
pub struct InMemoryAnswerStore {
    answers: Mutex<Vec<Answer>>,
}

impl InMemoryAnswerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, answer: Answer) {
        self.answers.lock().await.push(answer);
    }
}

#[async_trait]
impl AnswerStore for InMemoryAnswerStore {
    async fn answers_for_question(
        &self,
        question_id: QuestionId,
    ) -> Result<Vec<Answer>, RelationStoreError> {
        let mut answers: Vec<Answer> = self
            .answers
            .lock()
            .await
            .iter()
            .filter(|answer| answer.question_id == question_id)
            .cloned()
            .collect();
        answers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(answers)
    }

    async fn answer_by_id(&self, id: AnswerId) -> Result<Option<Answer>, RelationStoreError> {
        Ok(self
            .answers
            .lock()
            .await
            .iter()
            .find(|answer| answer.id == id)
            .cloned())
    }
}
