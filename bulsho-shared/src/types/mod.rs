mod answer;
mod change_event;
mod ids;
mod notification;
mod operation;
mod relation;
mod rows;
mod validation_error;

pub use answer::Answer;
pub use change_event::{ChangeEvent, ChangeOp, ChangePayload};
pub use ids::{AnswerId, PostId, QuestionId, TargetId, UserId};
pub use notification::{Notification, NotificationLevel};
pub use operation::RemoteOperation;
pub use relation::{FollowEdge, Relation, RelationKey, RelationKind, SavedPost, Vote, VotableType};
pub use rows::{AnswerKeyRow, AnswerRow, FollowRow, SavedPostRow, VoteRow};
pub use validation_error::RowValidationError;
