//! SQLite storage layer for tripsync.
//!
//! The local cache serves three roles: offline write queue, read fallback
//! when the remote store is unreachable, and a materialized copy of the
//! remote data for fast reads. It provides:
//! - WAL mode for concurrent reads
//! - Transaction discipline for atomic writes
//! - Audit events for history
//!
//! # Submodules
//!
//! - [`events`] - Audit event storage
//! - [`migrations`] - Versioned upgrades of cached documents
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - Main SQLite storage implementation

pub mod events;
pub mod migrations;
pub mod schema;
pub mod sqlite;

pub use sqlite::{
    insert_row, CacheRow, MutationContext, PendingDeletion, ReplaceStats, SqliteStorage,
};
