//! Row shapes as delivered by the hosted datastore and its realtime feed.
//!
//! Identifiers arrive as strings and enumerations as free text. Every row is
//! validated into its domain record with `TryFrom` before it reaches the
//! reconciler or the tree builder.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Answer, AnswerId, FollowEdge, RowValidationError, SavedPost, VotableType, Vote};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRow {
    pub user_id: String,
    pub votable_id: String,
    pub votable_type: String,
    pub value: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowRow {
    pub follower_id: String,
    pub followee_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedPostRow {
    pub user_id: String,
    pub post_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRow {
    pub id: String,
    pub question_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub user_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Key columns of an `answers` notification. The body is never published.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerKeyRow {
    pub id: String,
}

impl AnswerKeyRow {
    pub fn answer_id(&self) -> Result<AnswerId, RowValidationError> {
        parse_uuid("id", &self.id)
    }
}

fn parse_uuid(field: &'static str, value: &str) -> Result<Uuid, RowValidationError> {
    Uuid::parse_str(value).map_err(|_| RowValidationError::invalid_uuid(field, value))
}

impl TryFrom<VoteRow> for Vote {
    type Error = RowValidationError;

    fn try_from(row: VoteRow) -> Result<Self, Self::Error> {
        Ok(Vote {
            user_id: parse_uuid("user_id", &row.user_id)?,
            votable_id: parse_uuid("votable_id", &row.votable_id)?,
            votable_type: VotableType::try_from(row.votable_type.as_str())?,
            value: row.value,
        })
    }
}

impl TryFrom<FollowRow> for FollowEdge {
    type Error = RowValidationError;

    fn try_from(row: FollowRow) -> Result<Self, Self::Error> {
        Ok(FollowEdge {
            follower_id: parse_uuid("follower_id", &row.follower_id)?,
            followee_id: parse_uuid("followee_id", &row.followee_id)?,
        })
    }
}

impl TryFrom<SavedPostRow> for SavedPost {
    type Error = RowValidationError;

    fn try_from(row: SavedPostRow) -> Result<Self, Self::Error> {
        Ok(SavedPost {
            user_id: parse_uuid("user_id", &row.user_id)?,
            post_id: parse_uuid("post_id", &row.post_id)?,
        })
    }
}

impl TryFrom<AnswerRow> for Answer {
    type Error = RowValidationError;

    fn try_from(row: AnswerRow) -> Result<Self, Self::Error> {
        // Some clients send "" instead of null for top-level answers.
        let parent_id = match row.parent_id.as_deref() {
            None | Some("") => None,
            Some(parent) => Some(parse_uuid("parent_id", parent)?),
        };

        Ok(Answer {
            id: parse_uuid("id", &row.id)?,
            question_id: parse_uuid("question_id", &row.question_id)?,
            parent_id,
            author_id: parse_uuid("user_id", &row.user_id)?,
            content: row.content,
            created_at: row.created_at,
        })
    }
}
