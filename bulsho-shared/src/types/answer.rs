use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AnswerId, QuestionId, UserId};

/// An answer to a question, or a reply to another answer when `parent_id` is set.
///
/// The author owns the record for edits and deletes; its position in a thread
/// is derived by the tree builder and never stored here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub id: AnswerId,
    pub question_id: QuestionId,
    pub parent_id: Option<AnswerId>,
    pub author_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
