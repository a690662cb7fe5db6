//! Full trip reconciler.
//!
//! Fetches every child collection of one trip concurrently and, only if all
//! fetches succeed, swaps the cached children for the snapshot in a single
//! transaction.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::connectivity::Connectivity;
use crate::error::{Error, Result};
use crate::model::{
    wire, Entity, EntityKind, Expense, ItineraryItem, PackingItem, Place, Traveler,
};
use crate::remote::{Filter, RemoteStore, Row};
use crate::storage::CacheRow;
use crate::sync::engine::SyncEngine;
use crate::sync::types::ReconcileStats;

/// Decode one fetched collection into cache rows.
fn snapshot<T: Entity>(
    rows: Vec<Row>,
    pending: &HashSet<(EntityKind, String)>,
    out: &mut Vec<CacheRow>,
    stats: &mut ReconcileStats,
) -> Result<()> {
    for row in rows {
        let (remote_id, fields) = wire::from_remote_row::<T>(row)?;
        if pending.contains(&(T::KIND, remote_id.clone())) {
            stats.skipped_pending_deletes += 1;
            continue;
        }
        out.push(CacheRow::synced(&remote_id, &fields)?);
        stats.fetched.bump(T::KIND);
    }
    Ok(())
}

impl<R: RemoteStore, C: Connectivity> SyncEngine<R, C> {
    /// Replace the cached children of one trip with the remote snapshot,
    /// then refresh the trip's sharing metadata.
    ///
    /// Cached children that were never pushed are discarded; push them
    /// with [`SyncEngine::flush_pending`] first.
    ///
    /// # Errors
    ///
    /// Returns `Offline` when the remote store is unreachable and
    /// `Reconcile` naming the collection whose fetch failed. The cache is
    /// untouched on error.
    pub async fn sync_trip(&mut self, trip_id: &str) -> Result<ReconcileStats> {
        if !self.is_online().await {
            return Err(Error::Offline);
        }

        let filter = Filter::Trip(trip_id.to_string());
        let fetch = |kind: EntityKind| {
            let remote = &self.remote;
            let filter = &filter;
            async move {
                remote
                    .list(kind, filter)
                    .await
                    .map_err(|source| Error::Reconcile {
                        trip: trip_id.to_string(),
                        kind,
                        source,
                    })
            }
        };

        let (places, travelers, itinerary, packing, expenses) = tokio::try_join!(
            fetch(EntityKind::Place),
            fetch(EntityKind::Traveler),
            fetch(EntityKind::Itinerary),
            fetch(EntityKind::Packing),
            fetch(EntityKind::Expense),
        )?;

        let pending: HashSet<(EntityKind, String)> = self
            .storage
            .pending_deletions()?
            .into_iter()
            .map(|p| (p.kind, p.remote_id))
            .collect();

        let mut stats = ReconcileStats {
            trip_id: trip_id.to_string(),
            ..ReconcileStats::default()
        };
        let mut rows = Vec::new();
        snapshot::<Place>(places, &pending, &mut rows, &mut stats)?;
        snapshot::<Traveler>(travelers, &pending, &mut rows, &mut stats)?;
        snapshot::<ItineraryItem>(itinerary, &pending, &mut rows, &mut stats)?;
        snapshot::<PackingItem>(packing, &pending, &mut rows, &mut stats)?;
        snapshot::<Expense>(expenses, &pending, &mut rows, &mut stats)?;

        let replaced = self
            .storage
            .replace_trip_children(trip_id, &rows, &self.actor)?;
        stats.removed = replaced.removed;
        stats.discarded_unsynced = replaced.discarded_unsynced;

        if stats.discarded_unsynced > 0 {
            warn!(
                trip_id,
                discarded = stats.discarded_unsynced,
                "reconcile discarded children that were never pushed"
            );
        }
        info!(
            trip_id,
            fetched = stats.fetched.total(),
            removed = stats.removed,
            "trip reconciled"
        );

        if let Err(e) = self.sync_metadata(trip_id).await {
            warn!(trip_id, error = %e, "metadata refresh after reconcile failed");
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::ManualConnectivity;
    use crate::model::{Key, Record, Trip};
    use crate::remote::{MemoryRemoteStore, RemoteError};
    use crate::storage::SqliteStorage;
    use serde_json::json;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn setup() -> (
        SyncEngine<MemoryRemoteStore, ManualConnectivity>,
        MemoryRemoteStore,
    ) {
        let remote = MemoryRemoteStore::new();
        remote.seed(
            EntityKind::Trip,
            row(json!({"id": "T1", "title": "Oslo", "owner_id": "alice", "updated_at": "2026-02-01T00:00:00Z"})),
        );
        remote.seed(
            EntityKind::Traveler,
            row(json!({"id": "V1", "trip_id": "T1", "name": "Ana"})),
        );
        remote.seed(
            EntityKind::Expense,
            row(json!({"id": "E1", "trip_id": "T1", "title": "Ferry", "amount": 30.0, "payer_id": "V1", "charged_to": ["V1"]})),
        );
        remote.seed(
            EntityKind::Packing,
            row(json!({"id": "P2", "trip_id": "T1", "title": "Boots", "order": 2})),
        );
        remote.seed(
            EntityKind::Packing,
            row(json!({"id": "P1", "trip_id": "T1", "title": "Scarf", "order": 1})),
        );
        let engine = SyncEngine::new(
            remote.clone(),
            ManualConnectivity::new(true),
            SqliteStorage::open_memory().unwrap(),
        );
        (engine, remote)
    }

    #[tokio::test]
    async fn test_sync_trip_replaces_children() {
        let (mut engine, remote) = setup();
        let trip = Key::remote("T1");
        engine.trips().get(&trip).await.unwrap();
        engine.packing().list(&trip).await.unwrap();

        remote.remove(EntityKind::Packing, "P2");
        let stats = engine.sync_trip("T1").await.unwrap();
        assert_eq!(stats.fetched.packing, 1);
        assert_eq!(stats.fetched.travelers, 1);
        assert_eq!(stats.fetched.expenses, 1);
        assert_eq!(stats.removed, 2);

        let contents = engine.cached_contents(&trip).unwrap();
        assert_eq!(contents.packing.len(), 1);
        assert_eq!(contents.packing[0].fields.title, "Scarf");
        assert!(contents.packing.iter().all(|r| r.is_synced));
        assert_eq!(
            contents.expenses[0].fields.payer_id,
            Some(Key::remote("V1"))
        );
    }

    #[tokio::test]
    async fn test_sync_trip_aborts_on_any_failed_fetch() {
        let (mut engine, remote) = setup();
        let trip = Key::remote("T1");
        engine.sync_trip("T1").await.unwrap();
        let before = engine.cached_contents(&trip).unwrap();

        remote.remove(EntityKind::Packing, "P1");
        remote.fail(EntityKind::Expense, RemoteError::Transport("timeout".into()));

        let err = engine.sync_trip("T1").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Reconcile {
                kind: EntityKind::Expense,
                ..
            }
        ));

        let after = engine.cached_contents(&trip).unwrap();
        assert_eq!(after.packing.len(), before.packing.len());
        assert_eq!(after.expenses.len(), 1);
    }

    #[tokio::test]
    async fn test_sync_trip_refreshes_metadata() {
        let (mut engine, remote) = setup();
        engine.trips().get(&Key::remote("T1")).await.unwrap();
        remote.patch(
            EntityKind::Trip,
            "T1",
            row(json!({"shared_with": ["bob"], "updated_at": "2026-02-02T00:00:00Z"})),
        );

        engine.sync_trip("T1").await.unwrap();
        let trip: Record<Trip> = engine.storage().get(&Key::remote("T1")).unwrap().unwrap();
        assert!(trip.fields.is_accessible_by("bob"));
    }

    #[tokio::test]
    async fn test_sync_trip_skips_rows_queued_for_deletion() {
        let (mut engine, _remote) = setup();
        engine
            .storage_mut()
            .queue_deletion(EntityKind::Packing, "P1", None, "test")
            .unwrap();

        let stats = engine.sync_trip("T1").await.unwrap();
        assert_eq!(stats.skipped_pending_deletes, 1);
        assert_eq!(stats.fetched.packing, 1);
    }

    #[tokio::test]
    async fn test_sync_trip_offline() {
        let remote = MemoryRemoteStore::new();
        let mut engine = SyncEngine::new(
            remote,
            ManualConnectivity::new(false),
            SqliteStorage::open_memory().unwrap(),
        );
        assert!(matches!(engine.sync_trip("T1").await, Err(Error::Offline)));
    }
}
