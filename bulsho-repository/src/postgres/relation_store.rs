//! PostgreSQL implementation of the relation store.
//!
//! ## Database Tables
//!
//! - `votes`: one row per `(user_id, votable_id, votable_type)` with a signed `value`
//! - `follows`: one row per `(follower_id, followee_id)`
//! - `saved_posts`: one row per `(user_id, post_id)`
//!
//! Follows and saved posts have no value column; a present row reads as `1`.
use async_trait::async_trait;
use bulsho_shared::types::{RelationKey, RelationKind, TargetId, UserId, VotableType};
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

use crate::errors::RelationStoreError;
use crate::interfaces::RelationStore;

/// Table layout for one relation kind.
struct TableSpec {
    table: &'static str,
    owner_column: &'static str,
    target_column: &'static str,
    votable_type: Option<VotableType>,
}

impl TableSpec {
    fn for_kind(kind: RelationKind) -> Self {
        match kind {
            RelationKind::Vote(votable_type) => Self {
                table: "votes",
                owner_column: "user_id",
                target_column: "votable_id",
                votable_type: Some(votable_type),
            },
            RelationKind::Follow => Self {
                table: "follows",
                owner_column: "follower_id",
                target_column: "followee_id",
                votable_type: None,
            },
            RelationKind::Save => Self {
                table: "saved_posts",
                owner_column: "user_id",
                target_column: "post_id",
                votable_type: None,
            },
        }
    }

    fn value_expr(&self) -> &'static str {
        if self.votable_type.is_some() {
            "value"
        } else {
            "1::int4"
        }
    }

    /// `AND votable_type = $n` for vote tables, empty otherwise.
    fn type_filter(&self, param: usize) -> String {
        if self.votable_type.is_some() {
            format!(" AND votable_type = ${}", param)
        } else {
            String::new()
        }
    }

    fn key_filter(&self) -> String {
        format!(
            "{} = $1 AND {} = $2{}",
            self.owner_column,
            self.target_column,
            self.type_filter(3)
        )
    }
}

/// PostgreSQL-backed relation store.
///
/// Each call runs as a single statement on the pool; uniqueness is enforced by
/// the primary keys of the relation tables.
pub struct PostgresRelationStore {
    pool: sqlx::PgPool,
}

impl PostgresRelationStore {
    /// Creates a new PostgreSQL relation store.
    ///
    /// # Arguments
    ///
    /// * `pool` - Connection pool with the relation schema migrated
    pub async fn new(pool: sqlx::PgPool) -> Result<Self, RelationStoreError> {
        Ok(Self { pool })
    }

    /// Binds a key-addressed statement: `$1` owner, `$2` target, `$3` votable type when present.
    fn bind_key<'q>(
        query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
        spec: &TableSpec,
        key: &RelationKey,
    ) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
        let query = query.bind(key.owner_id).bind(key.target_id);
        match spec.votable_type {
            Some(votable_type) => query.bind(votable_type.as_str()),
            None => query,
        }
    }
}

#[async_trait]
impl RelationStore for PostgresRelationStore {
    async fn find_value(&self, key: &RelationKey) -> Result<Option<i32>, RelationStoreError> {
        let spec = TableSpec::for_kind(key.kind);
        let sql = format!(
            "SELECT {} AS value FROM {} WHERE {}",
            spec.value_expr(),
            spec.table,
            spec.key_filter()
        );

        let row = Self::bind_key(sqlx::query(&sql), &spec, key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => Some(row.try_get::<i32, _>("value")?),
            None => None,
        })
    }

    async fn insert_relation(
        &self,
        key: &RelationKey,
        value: i32,
    ) -> Result<(), RelationStoreError> {
        let spec = TableSpec::for_kind(key.kind);
        let result = match spec.votable_type {
            Some(votable_type) => {
                sqlx::query(
                    "INSERT INTO votes (user_id, votable_id, votable_type, value) VALUES ($1, $2, $3, $4)",
                )
                .bind(key.owner_id)
                .bind(key.target_id)
                .bind(votable_type.as_str())
                .bind(value)
                .execute(&self.pool)
                .await
            }
            None => {
                let sql = format!(
                    "INSERT INTO {} ({}, {}) VALUES ($1, $2)",
                    spec.table, spec.owner_column, spec.target_column
                );
                sqlx::query(&sql)
                    .bind(key.owner_id)
                    .bind(key.target_id)
                    .execute(&self.pool)
                    .await
            }
        };

        result.map_err(|e| RelationStoreError::from_insert(e, key))?;
        debug!(kind = %key.kind, owner_id = %key.owner_id, target_id = %key.target_id, "Relation inserted");
        Ok(())
    }

    async fn update_relation(
        &self,
        key: &RelationKey,
        value: i32,
    ) -> Result<bool, RelationStoreError> {
        let spec = TableSpec::for_kind(key.kind);
        if spec.votable_type.is_none() {
            // Binary relations have nothing to update; report whether the row is there.
            return Ok(self.find_value(key).await?.is_some());
        }

        let result = sqlx::query(
            "UPDATE votes SET value = $4, updated_at = now() WHERE user_id = $1 AND votable_id = $2 AND votable_type = $3",
        );
        let result = Self::bind_key(result, &spec, key)
            .bind(value)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_relation(&self, key: &RelationKey) -> Result<bool, RelationStoreError> {
        let spec = TableSpec::for_kind(key.kind);
        let sql = format!("DELETE FROM {} WHERE {}", spec.table, spec.key_filter());

        let result = Self::bind_key(sqlx::query(&sql), &spec, key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn sum_values(
        &self,
        kind: RelationKind,
        target_ids: &[TargetId],
    ) -> Result<Vec<(TargetId, i64)>, RelationStoreError> {
        if target_ids.is_empty() {
            return Ok(Vec::new());
        }

        let spec = TableSpec::for_kind(kind);
        let total_expr = if spec.votable_type.is_some() {
            "SUM(value)::int8"
        } else {
            "COUNT(*)::int8"
        };
        let sql = format!(
            "SELECT {target} AS target_id, {total} AS total FROM {table} WHERE {target} = ANY($1){filter} GROUP BY {target}",
            target = spec.target_column,
            total = total_expr,
            table = spec.table,
            filter = spec.type_filter(2),
        );

        let mut query = sqlx::query(&sql).bind(target_ids);
        if let Some(votable_type) = spec.votable_type {
            query = query.bind(votable_type.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut totals = Vec::with_capacity(rows.len());
        for row in rows {
            totals.push((
                row.try_get::<Uuid, _>("target_id")?,
                row.try_get::<i64, _>("total")?,
            ));
        }
        Ok(totals)
    }

    async fn owner_values(
        &self,
        owner_id: UserId,
        kind: RelationKind,
        target_ids: &[TargetId],
    ) -> Result<Vec<(TargetId, i32)>, RelationStoreError> {
        if target_ids.is_empty() {
            return Ok(Vec::new());
        }

        let spec = TableSpec::for_kind(kind);
        let sql = format!(
            "SELECT {target} AS target_id, {value} AS value FROM {table} WHERE {owner} = $1 AND {target} = ANY($2){filter}",
            target = spec.target_column,
            value = spec.value_expr(),
            table = spec.table,
            owner = spec.owner_column,
            filter = spec.type_filter(3),
        );

        let mut query = sqlx::query(&sql).bind(owner_id).bind(target_ids);
        if let Some(votable_type) = spec.votable_type {
            query = query.bind(votable_type.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            values.push((
                row.try_get::<Uuid, _>("target_id")?,
                row.try_get::<i32, _>("value")?,
            ));
        }
        Ok(values)
    }
}
