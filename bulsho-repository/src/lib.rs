//! # Bulsho Repository
//!
//! This crate provides the traits and implementations used to persist
//! user-owned relations (votes, follows, saved posts) and to read answers.
//! It includes error definitions, store interfaces, a PostgreSQL backend,
//! an in-memory backend and the [`MutationClient`] service that every
//! caller goes through.

pub mod config;
pub mod errors;
pub mod interfaces;
pub mod memory;
pub mod postgres;
pub mod service;

pub use config::MutationClientConfig;
pub use errors::{MutationError, MutationResult, RelationStoreError};
pub use interfaces::{AnswerStore, ChangeSource, RelationStore};
pub use memory::{InMemoryAnswerStore, InMemoryChangeFeed, InMemoryRelationStore};
pub use postgres::{PgChangeListener, PostgresAnswerStore, PostgresRelationStore};
pub use service::{MutationClient, WriteOutcome};
