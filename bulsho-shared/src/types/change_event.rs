//! Realtime change events.
//!
//! The datastore pushes row changes as loosely typed [`ChangePayload`]s. They are
//! validated into immutable [`ChangeEvent`]s, which are the only way out-of-band
//! changes reach the relation cache and the comment threads.
use serde::{Deserialize, Serialize};

use crate::types::{
    Answer, AnswerId, AnswerKeyRow, AnswerRow, FollowEdge, FollowRow, Relation, RelationKey, RelationKind,
    RowValidationError, SavedPost, SavedPostRow, TargetId, Vote, VoteRow,
};

/// An immutable change delivered to the local state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// A relation row was created, updated or removed (`value == 0`).
    RelationChanged {
        key: RelationKey,
        value: i32,
        previous_value: i32,
    },
    /// Authoritative aggregate for a target, e.g. from a batch fetch.
    AggregateRefreshed {
        kind: RelationKind,
        target_id: TargetId,
        total: i64,
    },
    AnswerInserted(Answer),
    AnswerUpdated(Answer),
    AnswerDeleted { id: AnswerId },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// Raw notification payload as published by the datastore trigger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangePayload {
    pub table: String,
    pub op: ChangeOp,
    #[serde(default)]
    pub record: Option<serde_json::Value>,
    #[serde(default)]
    pub old_record: Option<serde_json::Value>,
}

impl ChangePayload {
    fn row<T: serde::de::DeserializeOwned>(
        value: Option<&serde_json::Value>,
        name: &str,
    ) -> Result<Option<T>, RowValidationError> {
        value
            .map(|v| {
                serde_json::from_value(v.clone()).map_err(|e| {
                    RowValidationError::MalformedPayload(format!("{}: {}", name, e))
                })
            })
            .transpose()
    }

    /// Id of the answer an `answers` payload refers to, read from `old_record`
    /// for deletes and from `record` otherwise.
    pub fn answer_id(&self) -> Result<AnswerId, RowValidationError> {
        let (row, name) = match self.op {
            ChangeOp::Delete => (self.old_record.as_ref(), "old_record"),
            ChangeOp::Insert | ChangeOp::Update => (self.record.as_ref(), "record"),
        };
        Self::required(Self::row::<AnswerKeyRow>(row, name)?, name)?.answer_id()
    }

    fn required<T>(row: Option<T>, name: &str) -> Result<T, RowValidationError> {
        row.ok_or_else(|| RowValidationError::MalformedPayload(format!("missing {}", name)))
    }

    fn relation_change(
        &self,
        new: Option<Relation>,
        old: Option<Relation>,
    ) -> Result<ChangeEvent, RowValidationError> {
        let key = match (&new, &old) {
            (Some(relation), _) | (None, Some(relation)) => relation.key(),
            (None, None) => {
                return Err(RowValidationError::MalformedPayload(
                    "relation change without rows".to_string(),
                ))
            }
        };
        let value = match self.op {
            ChangeOp::Delete => 0,
            ChangeOp::Insert | ChangeOp::Update => {
                Self::required(new.as_ref(), "record")?.value()
            }
        };
        let previous_value = match self.op {
            ChangeOp::Insert => 0,
            ChangeOp::Update | ChangeOp::Delete => old.as_ref().map(Relation::value).unwrap_or(0),
        };

        Ok(ChangeEvent::RelationChanged {
            key,
            value,
            previous_value,
        })
    }
}

impl TryFrom<ChangePayload> for ChangeEvent {
    type Error = RowValidationError;

    fn try_from(payload: ChangePayload) -> Result<Self, Self::Error> {
        let record = payload.record.as_ref();
        let old_record = payload.old_record.as_ref();

        match payload.table.as_str() {
            "votes" => {
                let new = ChangePayload::row::<VoteRow>(record, "record")?
                    .map(Vote::try_from)
                    .transpose()?
                    .map(Relation::Vote);
                let old = ChangePayload::row::<VoteRow>(old_record, "old_record")?
                    .map(Vote::try_from)
                    .transpose()?
                    .map(Relation::Vote);
                payload.relation_change(new, old)
            }
            "follows" => {
                let new = ChangePayload::row::<FollowRow>(record, "record")?
                    .map(FollowEdge::try_from)
                    .transpose()?
                    .map(Relation::Follow);
                let old = ChangePayload::row::<FollowRow>(old_record, "old_record")?
                    .map(FollowEdge::try_from)
                    .transpose()?
                    .map(Relation::Follow);
                payload.relation_change(new, old)
            }
            "saved_posts" => {
                let new = ChangePayload::row::<SavedPostRow>(record, "record")?
                    .map(SavedPost::try_from)
                    .transpose()?
                    .map(Relation::Save);
                let old = ChangePayload::row::<SavedPostRow>(old_record, "old_record")?
                    .map(SavedPost::try_from)
                    .transpose()?
                    .map(Relation::Save);
                payload.relation_change(new, old)
            }
            "answers" => match payload.op {
                ChangeOp::Insert | ChangeOp::Update => {
                    let row = ChangePayload::required(
                        ChangePayload::row::<AnswerRow>(record, "record")?,
                        "record",
                    )?;
                    let answer = Answer::try_from(row)?;
                    if payload.op == ChangeOp::Insert {
                        Ok(ChangeEvent::AnswerInserted(answer))
                    } else {
                        Ok(ChangeEvent::AnswerUpdated(answer))
                    }
                }
                ChangeOp::Delete => Ok(ChangeEvent::AnswerDeleted {
                    id: payload.answer_id()?,
                }),
            },
            other => Err(RowValidationError::UnknownTable(other.to_string())),
        }
    }
}
