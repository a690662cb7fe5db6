//! The sync engine: remote store, connectivity oracle and local cache
//! wired together.
//!
//! Repositories, the metadata synchronizer, the trip reconciler, the
//! pending flush and import all run against one [`SyncEngine`].

use tracing::{debug, warn};

use crate::connectivity::Connectivity;
use crate::error::{Error, Result};
use crate::model::{
    Entity, Expense, Identity, ItineraryItem, Key, PackingItem, Place, Traveler, Trip,
};
use crate::remote::RemoteStore;
use crate::storage::SqliteStorage;
use crate::sync::access::{AccessDecision, AccessGate};
use crate::sync::repository::Repository;
use crate::sync::types::{KindCounts, OpenedTrip, ReconcileState, SyncStatus, TripContents};

/// Default actor recorded in audit events.
pub const DEFAULT_ACTOR: &str = "tripsync";

/// Online-first data access with a local fallback.
pub struct SyncEngine<R, C> {
    pub(crate) remote: R,
    pub(crate) connectivity: C,
    pub(crate) storage: SqliteStorage,
    pub(crate) actor: String,
}

/// Result of [`SyncEngine::open_trip`].
#[derive(Debug)]
pub enum OpenOutcome {
    Opened(Box<OpenedTrip>),
    Denied { redirect: String, reason: String },
}

impl<R: RemoteStore, C: Connectivity> SyncEngine<R, C> {
    pub fn new(remote: R, connectivity: C, storage: SqliteStorage) -> Self {
        Self {
            remote,
            connectivity,
            storage,
            actor: DEFAULT_ACTOR.to_string(),
        }
    }

    /// Name recorded as the actor of cache mutations.
    #[must_use]
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    #[must_use]
    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut SqliteStorage {
        &mut self.storage
    }

    #[must_use]
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Ask the connectivity oracle. Never cached.
    pub async fn is_online(&self) -> bool {
        self.connectivity.is_reachable().await
    }

    /// Repository for any entity kind.
    pub fn repo<T: Entity>(&mut self) -> Repository<'_, T, R, C> {
        Repository::new(self)
    }

    pub fn trips(&mut self) -> Repository<'_, Trip, R, C> {
        self.repo()
    }

    pub fn places(&mut self) -> Repository<'_, Place, R, C> {
        self.repo()
    }

    pub fn itinerary(&mut self) -> Repository<'_, ItineraryItem, R, C> {
        self.repo()
    }

    pub fn packing(&mut self) -> Repository<'_, PackingItem, R, C> {
        self.repo()
    }

    pub fn travelers(&mut self) -> Repository<'_, Traveler, R, C> {
        self.repo()
    }

    pub fn expenses(&mut self) -> Repository<'_, Expense, R, C> {
        self.repo()
    }

    /// Cached children of a trip, in caller order.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be read.
    pub fn cached_contents(&self, trip: &Key) -> Result<TripContents> {
        Ok(TripContents {
            places: self.storage.list_children(trip)?,
            travelers: self.storage.list_children(trip)?,
            itinerary: self.storage.list_children(trip)?,
            packing: self.storage.list_children(trip)?,
            expenses: self.storage.list_children(trip)?,
        })
    }

    /// Open a trip for display.
    ///
    /// Runs the access check (which refreshes sharing metadata first), then
    /// pushes pending local writes and reconciles the trip's children. A
    /// denied check never touches child data.
    ///
    /// # Errors
    ///
    /// Returns an error if the access check itself fails or the cache
    /// cannot be read. A failed reconcile is reported in the result.
    pub async fn open_trip(
        &mut self,
        gate: &AccessGate,
        identity: &Identity,
        trip: &Key,
    ) -> Result<OpenOutcome> {
        let (record, fresh) = match gate.check(self, identity, trip).await? {
            AccessDecision::Allow { trip, fresh } => (trip, fresh),
            AccessDecision::Deny { redirect, reason } => {
                return Ok(OpenOutcome::Denied {
                    redirect,
                    reason: reason.to_string(),
                });
            }
        };

        let reconcile = match record.key.remote_id().map(str::to_string) {
            Some(trip_id) if self.is_online().await => {
                match self.flush_pending().await {
                    Ok(stats) if !stats.is_clean() => {
                        debug!(pushed = stats.pushed(), "flush left records unsynced");
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "pending flush failed before reconcile"),
                }
                match self.sync_trip(&trip_id).await {
                    Ok(stats) => ReconcileState::Reconciled(stats),
                    Err(e) => {
                        warn!(trip_id = %trip_id, error = %e, "reconcile failed, showing cached data");
                        ReconcileState::Failed {
                            message: e.to_string(),
                        }
                    }
                }
            }
            _ => ReconcileState::Skipped,
        };

        // Reconcile may have refreshed the trip row itself.
        let trip = match self.storage.get::<Trip>(&record.key)? {
            Some(current) => current,
            None => record,
        };
        let contents = self.cached_contents(&trip.key)?;

        Ok(OpenOutcome::Opened(Box::new(OpenedTrip {
            trip,
            fresh,
            reconcile,
            contents,
        })))
    }

    /// Counts of cached and unsynced records plus queued deletes.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be read.
    pub async fn status(&self) -> Result<SyncStatus> {
        let mut totals = KindCounts::default();
        let mut unsynced = KindCounts::default();
        for kind in crate::model::EntityKind::ALL {
            let (total, pending) = self.storage.counts(kind)?;
            totals.set(kind, total);
            unsynced.set(kind, pending);
        }
        Ok(SyncStatus {
            totals,
            unsynced,
            pending_deletions: self.storage.pending_deletions()?,
            online: self.is_online().await,
        })
    }

    /// Resolve a trip key to the key the cache currently knows it by.
    pub(crate) fn resolve_trip(&self, trip: &Key) -> Result<Key> {
        self.storage
            .canonical_key(crate::model::EntityKind::Trip, trip)?
            .ok_or_else(|| Error::TripNotFound {
                key: trip.to_string(),
            })
    }
}
