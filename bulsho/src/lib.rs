//! # Bulsho
//!
//! Sync service for the Bulsho Q&A platform. Connects to the datastore, loads
//! the configured question thread, and keeps relation counts and comment
//! threads current from the realtime change feed.
//!
//! ## Modules
//!
//! - [`config`]: Environment settings and dependency wiring
//! - [`errors`]: Error types for the service

pub mod config;
pub mod errors;

pub use config::{Backend, Dependencies, Settings};
pub use errors::AppError;
