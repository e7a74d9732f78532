//! Interface definitions for the relation repository.
//!
//! These traits allow the datastore to be swapped (PostgreSQL, in-memory, or a
//! hosted backend) without touching the reconciliation logic.

mod answer_store;
mod change_source;
mod relation_store;

pub use answer_store::AnswerStore;
pub use change_source::ChangeSource;
pub use relation_store::RelationStore;
