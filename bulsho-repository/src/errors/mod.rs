//! Error types for the relation repository.
//!
//! `RelationStoreError` is raised by store backends; `MutationError` is the
//! only error that crosses the `MutationClient` boundary.

mod mutation_error;
mod relation_store_error;

pub use mutation_error::{MutationError, MutationResult};
pub use relation_store_error::RelationStoreError;
