//! # Bulsho Shared
//! This crate defines the data structures shared across the Bulsho workspace.
//! It includes the relation kinds (votes, follows, saved posts), answers,
//! loosely typed row shapes with their ingress validation, realtime change
//! events and user-facing notifications.
pub mod types;
