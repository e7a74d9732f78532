//! # Bulsho Sync
//!
//! Client-side state for relations and comment threads.
//!
//! ## Architecture
//!
//! 1. **Resolver**: turns a requested value into the next value and remote operation
//! 2. **Reconciler**: applies toggles optimistically and rolls back failed writes
//! 3. **Loader**: hydrates counts and own values in batches
//! 4. **Tree**: threads a flat answer list into a forest
//! 5. **Orchestrator**: reduces the realtime change feed into local state
//!
//! ## Modules
//!
//! - [`resolver`]: Toggle semantics shared by votes, follows and saves
//! - [`reconciler`]: Optimistic writes with per-entity gating and rollback
//! - [`state`]: The relation cache and its change-event reducer
//! - [`inflight`]: Per-entity in-flight gate
//! - [`loader`]: Batch hydration of the relation cache
//! - [`tree`]: Comment tree builder and thread state
//! - [`orchestrator`]: Change-feed consumer
//! - [`session`]: Signed-in user state
//! - [`notifier`]: User-facing notification sinks
//! - [`errors`]: Error types for the sync layer

pub mod errors;
pub mod inflight;
pub mod loader;
pub mod notifier;
pub mod orchestrator;
pub mod reconciler;
pub mod resolver;
pub mod session;
pub mod state;
pub mod tree;

pub use errors::SyncError;
pub use inflight::{InFlightGate, InFlightGuard};
pub use loader::{RelationLoader, RelationSource};
pub use notifier::{ChannelNotifier, Notifier, TracingNotifier};
pub use orchestrator::{OrchestratorConfig, OrchestratorStats, SyncOrchestrator};
pub use reconciler::{EntityPhase, Reconciler, ReconcilerConfig, RemoteMutation, ToggleOutcome};
pub use resolver::{next_count, resolve, Resolution};
pub use session::{session, Session, SessionHandle};
pub use state::{EntityKey, EntitySnapshot, RelationCache, SharedRelations};
pub use tree::{build_forest, walk, CommentThread, SharedThreads, ThreadNode, Threaded};
