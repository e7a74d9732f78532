//! In-memory store backends.
//!
//! Used by tests and by the `memory` backend of the service binary. They honour
//! the same contracts as the PostgreSQL stores, including the single row per
//! key constraint, and support failure injection.

mod answer_store;
mod change_feed;
mod relation_store;

pub use answer_store::InMemoryAnswerStore;
pub use change_feed::InMemoryChangeFeed;
pub use relation_store::InMemoryRelationStore;
