use uuid::Uuid;

pub type UserId = Uuid;
pub type QuestionId = Uuid;
pub type AnswerId = Uuid;
pub type PostId = Uuid;

/// Anything a relation can point at: a question, an answer, a post or another user.
pub type TargetId = Uuid;
