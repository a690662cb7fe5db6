//! Result and statistics types for sync operations.

use serde::Serialize;

use crate::model::{
    EntityKind, Expense, ItineraryItem, PackingItem, Place, Record, Traveler, Trip,
};
use crate::storage::PendingDeletion;

/// Per-kind counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KindCounts {
    pub trips: usize,
    pub places: usize,
    pub itinerary: usize,
    pub packing: usize,
    pub travelers: usize,
    pub expenses: usize,
}

impl KindCounts {
    pub fn bump(&mut self, kind: EntityKind) {
        *self.slot(kind) += 1;
    }

    pub fn set(&mut self, kind: EntityKind, value: usize) {
        *self.slot(kind) = value;
    }

    #[must_use]
    pub const fn get(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Trip => self.trips,
            EntityKind::Place => self.places,
            EntityKind::Itinerary => self.itinerary,
            EntityKind::Packing => self.packing,
            EntityKind::Traveler => self.travelers,
            EntityKind::Expense => self.expenses,
        }
    }

    fn slot(&mut self, kind: EntityKind) -> &mut usize {
        match kind {
            EntityKind::Trip => &mut self.trips,
            EntityKind::Place => &mut self.places,
            EntityKind::Itinerary => &mut self.itinerary,
            EntityKind::Packing => &mut self.packing,
            EntityKind::Traveler => &mut self.travelers,
            EntityKind::Expense => &mut self.expenses,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        EntityKind::ALL.iter().map(|k| self.get(*k)).sum()
    }
}

/// What happened to the remote side of a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteDelete {
    /// The remote row is gone.
    Deleted,
    /// The remote delete failed or could not be attempted; it is queued
    /// and retried by the next flush.
    Queued,
    /// The record never had a remote key.
    NotApplicable,
}

/// Outcome of a repository delete.
///
/// A delete is reported as successful as long as one side went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub remote: RemoteDelete,
    /// Whether a cached row was removed.
    pub local: bool,
}

impl DeleteOutcome {
    /// True when the two stores disagree after this delete.
    #[must_use]
    pub fn diverged(&self) -> bool {
        self.remote == RemoteDelete::Queued || (self.remote == RemoteDelete::Deleted && !self.local)
    }
}

/// Statistics for a pending-write flush.
#[derive(Debug, Default, Clone, Serialize)]
pub struct FlushStats {
    /// Records newly inserted remotely and promoted.
    pub promoted: KindCounts,
    /// Records with a remote key whose local edits were pushed.
    pub updated: KindCounts,
    /// Records left unsynced (unresolved references or transport failure).
    pub deferred: KindCounts,
    /// Records the remote store rejected.
    pub failed: KindCounts,
    pub deletes_applied: usize,
    pub deletes_remaining: usize,
}

impl FlushStats {
    #[must_use]
    pub fn pushed(&self) -> usize {
        self.promoted.total() + self.updated.total()
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.deferred.total() == 0 && self.failed.total() == 0 && self.deletes_remaining == 0
    }
}

/// Statistics for one full trip reconciliation.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ReconcileStats {
    pub trip_id: String,
    /// Children fetched and cached per kind.
    pub fetched: KindCounts,
    /// Cached rows removed before the snapshot was written.
    pub removed: usize,
    /// Removed rows that had never reached the remote store.
    pub discarded_unsynced: usize,
    /// Fetched rows skipped because a delete for them is queued.
    pub skipped_pending_deletes: usize,
}

/// Statistics for an import.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ImportStats {
    pub created: KindCounts,
    /// References whose target was not in the imported graph.
    pub dangling_dropped: usize,
    /// Records pushed to the remote store after import.
    pub pushed: usize,
    /// Records left local-only after import.
    pub unsynced: usize,
}

/// Statistics for an export.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ExportStats {
    pub exported: KindCounts,
    pub checksum: String,
}

/// Cached children of one trip.
#[derive(Debug, Default, Clone, Serialize)]
pub struct TripContents {
    pub places: Vec<Record<Place>>,
    pub travelers: Vec<Record<Traveler>>,
    pub itinerary: Vec<Record<ItineraryItem>>,
    pub packing: Vec<Record<PackingItem>>,
    pub expenses: Vec<Record<Expense>>,
}

/// How the reconcile step of a trip open went.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReconcileState {
    Reconciled(ReconcileStats),
    /// Offline, or the trip has never been pushed.
    Skipped,
    /// The snapshot could not be fetched; cached children were kept.
    Failed { message: String },
}

/// A trip that passed the access check, with its children.
#[derive(Debug, Clone, Serialize)]
pub struct OpenedTrip {
    pub trip: Record<Trip>,
    /// Whether sharing data was confirmed against the remote store.
    pub fresh: bool,
    pub reconcile: ReconcileState,
    pub contents: TripContents,
}

/// Local cache sync status.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub totals: KindCounts,
    pub unsynced: KindCounts,
    pub pending_deletions: Vec<PendingDeletion>,
    pub online: bool,
}

impl SyncStatus {
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.unsynced.total() > 0 || !self.pending_deletions.is_empty()
    }
}
