//! Offline-first sync engine.
//!
//! - **Repositories**: online-first reads and writes with cache fallback
//! - **Metadata sync**: ownership and sharing fields of one trip
//! - **Reconcile**: replace a trip's cached children with a remote snapshot
//! - **Pending flush**: push unsynced records and queued deletes
//! - **Access gate**: owner / share-list check on fresh metadata
//! - **Import/Export**: portable trip graphs with key remapping
//!
//! # Example
//!
//! ```ignore
//! use tripsync::sync::{AccessGate, SyncEngine};
//!
//! let mut engine = SyncEngine::new(remote, probe, storage);
//!
//! // Works the same online and offline
//! let trip = engine.trips().create(Trip::new("Lisbon", "alice")).await?;
//! engine.packing().add(&trip.key, PackingItem::new(trip.key.clone(), "Passport", 0)).await?;
//!
//! // Push what was written offline
//! let stats = engine.flush_pending().await?;
//!
//! // Check access, reconcile, read
//! let opened = engine.open_trip(&AccessGate::default(), &identity, &trip.key).await?;
//! ```

mod access;
mod engine;
mod export;
mod file;
mod hash;
mod import;
mod metadata;
mod pending;
mod reconcile;
mod remap;
mod repository;
mod status;
mod types;

pub use access::{AccessDecision, AccessGate, DenyReason, DEFAULT_REDIRECT};
pub use engine::{OpenOutcome, SyncEngine, DEFAULT_ACTOR};
pub use export::{
    payload_checksum, ExportDocument, ExportPayload, Exporter, PortableEntity, TripGraph,
    FORMAT_VERSION,
};
pub use file::atomic_write;
pub use hash::content_hash;
pub use import::parse_document;
pub use remap::{remap_refs, IdMap};
pub use repository::Repository;
pub(crate) use status::count_lines;
pub use status::print_status;
pub use types::{
    DeleteOutcome, ExportStats, FlushStats, ImportStats, KindCounts, OpenedTrip,
    ReconcileState, ReconcileStats, RemoteDelete, SyncStatus, TripContents,
};
