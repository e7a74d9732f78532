use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{PostId, RowValidationError, TargetId, UserId};

/// The kinds of content a user can vote on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VotableType {
    Question,
    Answer,
}

impl VotableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VotableType::Question => "question",
            VotableType::Answer => "answer",
        }
    }
}

impl TryFrom<&str> for VotableType {
    type Error = RowValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "question" => Ok(VotableType::Question),
            "answer" => Ok(VotableType::Answer),
            other => Err(RowValidationError::UnknownVotableType(other.to_string())),
        }
    }
}

/// A user-owned relation kind.
///
/// All kinds share the `Absent -> Present(value) -> Absent` toggle lifecycle.
/// Votes carry a signed magnitude and feed an aggregate count; follows and
/// saves are binary and always hold `1` while present.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "votable_type", rename_all = "lowercase")]
pub enum RelationKind {
    Vote(VotableType),
    Follow,
    Save,
}

impl RelationKind {
    /// Whether the caller keeps a denormalized aggregate for this kind.
    pub fn is_counted(&self) -> bool {
        matches!(self, RelationKind::Vote(_))
    }

    /// Binary kinds only ever store the value `1`.
    pub fn is_binary(&self) -> bool {
        !self.is_counted()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Vote(VotableType::Question) => "vote:question",
            RelationKind::Vote(VotableType::Answer) => "vote:answer",
            RelationKind::Follow => "follow",
            RelationKind::Save => "save",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies a single relation row. At most one row exists per key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationKey {
    pub kind: RelationKind,
    pub owner_id: UserId,
    pub target_id: TargetId,
}

impl RelationKey {
    pub fn new(kind: RelationKind, owner_id: UserId, target_id: TargetId) -> Self {
        Self {
            kind,
            owner_id,
            target_id,
        }
    }

    /// A follow edge pointing back at its owner.
    pub fn is_self_follow(&self) -> bool {
        self.kind == RelationKind::Follow && self.owner_id == self.target_id
    }
}

/// A user's vote on a question or answer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub user_id: UserId,
    pub votable_id: TargetId,
    pub votable_type: VotableType,
    pub value: i32,
}

/// A directed follow relation between two users.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowEdge {
    pub follower_id: UserId,
    pub followee_id: UserId,
}

/// A post bookmarked by a user. Existence means "saved".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedPost {
    pub user_id: UserId,
    pub post_id: PostId,
}

/// Tagged union over the three relation records.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "relation", rename_all = "snake_case")]
pub enum Relation {
    Vote(Vote),
    Follow(FollowEdge),
    Save(SavedPost),
}

impl Relation {
    pub fn key(&self) -> RelationKey {
        match self {
            Relation::Vote(vote) => RelationKey::new(
                RelationKind::Vote(vote.votable_type),
                vote.user_id,
                vote.votable_id,
            ),
            Relation::Follow(edge) => {
                RelationKey::new(RelationKind::Follow, edge.follower_id, edge.followee_id)
            }
            Relation::Save(saved) => RelationKey::new(RelationKind::Save, saved.user_id, saved.post_id),
        }
    }

    pub fn value(&self) -> i32 {
        match self {
            Relation::Vote(vote) => vote.value,
            Relation::Follow(_) | Relation::Save(_) => 1,
        }
    }

    /// Builds the record for `key` holding `value`.
    ///
    /// Binary kinds reject any value other than `1`.
    pub fn from_key(key: RelationKey, value: i32) -> Result<Self, RowValidationError> {
        match key.kind {
            RelationKind::Vote(votable_type) => Ok(Relation::Vote(Vote {
                user_id: key.owner_id,
                votable_id: key.target_id,
                votable_type,
                value,
            })),
            RelationKind::Follow if value == 1 => Ok(Relation::Follow(FollowEdge {
                follower_id: key.owner_id,
                followee_id: key.target_id,
            })),
            RelationKind::Save if value == 1 => Ok(Relation::Save(SavedPost {
                user_id: key.owner_id,
                post_id: key.target_id,
            })),
            kind => Err(RowValidationError::InvalidValue {
                kind: kind.as_str(),
                value,
            }),
        }
    }
}
