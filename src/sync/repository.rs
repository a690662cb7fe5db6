//! Entity repositories.
//!
//! One façade per entity kind implementing the online-first policy:
//!
//! 1. Ask the connectivity oracle.
//! 2. If reachable, call the remote store. Reads republish the result into
//!    the cache and return the remote result itself. A write that gives a
//!    local-only record its first remote key promotes it.
//! 3. If unreachable, or the remote call fails at the transport level, run
//!    the same operation against the cache; writes are left unsynced.
//!
//! Local keys never reach the remote store: operations on them go straight
//! to the cache.

use std::collections::HashSet;
use std::marker::PhantomData;

use tracing::{debug, warn};

use crate::connectivity::Connectivity;
use crate::error::{Error, Result};
use crate::model::wire::{self, Patch};
use crate::model::{map_refs, ChildEntity, Entity, Identity, Key, Record, Trip};
use crate::remote::{Filter, RemoteError, RemoteStore};
use crate::storage::SqliteStorage;
use crate::sync::engine::SyncEngine;
use crate::sync::types::{DeleteOutcome, RemoteDelete};

/// Repository for entity kind `T`.
pub struct Repository<'e, T, R, C> {
    engine: &'e mut SyncEngine<R, C>,
    _kind: PhantomData<T>,
}

/// Rewrite local references whose target has since been promoted.
fn canonicalize_refs<T: Entity>(storage: &SqliteStorage, fields: &T) -> Result<T> {
    let mut doc = wire::to_document(fields)?;
    let mut failure = None;
    map_refs(T::KIND, &mut doc, |field, value| match Key::from_json(&value) {
        Some(key @ Key::Local(_)) => match storage.canonical_key(field.target, &key) {
            Ok(Some(current)) => Some(current.to_json()),
            Ok(None) => Some(value),
            Err(e) => {
                failure.get_or_insert(e);
                Some(value)
            }
        },
        _ => Some(value),
    });
    match failure {
        Some(e) => Err(e),
        None => wire::from_document(doc),
    }
}

fn not_found<T: Entity>(key: &Key) -> Error {
    if T::KIND == crate::model::EntityKind::Trip {
        Error::TripNotFound {
            key: key.to_string(),
        }
    } else {
        Error::RecordNotFound {
            kind: T::KIND,
            key: key.to_string(),
        }
    }
}

fn pending_ids(storage: &SqliteStorage, kind: crate::model::EntityKind) -> Result<HashSet<String>> {
    Ok(storage
        .pending_deletions()?
        .into_iter()
        .filter(|p| p.kind == kind)
        .map(|p| p.remote_id)
        .collect())
}

impl<'e, T, R, C> Repository<'e, T, R, C>
where
    T: Entity,
    R: RemoteStore,
    C: Connectivity,
{
    pub(crate) fn new(engine: &'e mut SyncEngine<R, C>) -> Self {
        Self {
            engine,
            _kind: PhantomData,
        }
    }

    /// Cache a remote record, logging instead of failing if the cache
    /// write does not go through.
    fn republish(&mut self, remote_id: String, fields: T) -> Record<T> {
        match self.engine.storage.put_synced(&remote_id, &fields) {
            Ok(record) => record,
            Err(e) => {
                warn!(kind = %T::KIND, remote_id = %remote_id, error = %e, "cache refresh failed");
                Record {
                    key: Key::Remote(remote_id),
                    local_id: None,
                    is_synced: true,
                    fields,
                }
            }
        }
    }

    /// Fetch one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote store rejects the read or the cache
    /// cannot be read. Transport failures fall back to the cache.
    pub async fn get(&mut self, key: &Key) -> Result<Option<Record<T>>> {
        let Key::Remote(id) = key else {
            return self.engine.storage.get(key);
        };

        if !self.engine.is_online().await {
            debug!(kind = %T::KIND, remote_id = %id, "offline, reading cache");
            return self.engine.storage.get(key);
        }

        match self.engine.remote.get(T::KIND, id, None).await {
            Ok(Some(row)) => {
                let (remote_id, fields) = wire::from_remote_row::<T>(row)?;
                Ok(Some(self.republish(remote_id, fields)))
            }
            Ok(None) => {
                if let Err(e) = self.engine.storage.evict(T::KIND, id) {
                    warn!(kind = %T::KIND, remote_id = %id, error = %e, "cache eviction failed");
                }
                Ok(None)
            }
            Err(e) if e.is_transport() => {
                warn!(kind = %T::KIND, remote_id = %id, error = %e, "remote unreachable, reading cache");
                self.engine.storage.get(key)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Store a new record, remotely when possible.
    async fn insert(&mut self, fields: T) -> Result<Record<T>> {
        let fields = canonicalize_refs(&self.engine.storage, &fields)?;

        if !self.engine.is_online().await {
            debug!(kind = %T::KIND, "offline, storing locally");
            return self.engine.storage.insert_local(&fields, &self.engine.actor);
        }

        let row = match wire::to_remote_row(&fields) {
            Ok(row) => row,
            Err(Error::UnresolvedReference { field, .. }) => {
                debug!(kind = %T::KIND, field, "reference not pushed yet, storing locally");
                return self.engine.storage.insert_local(&fields, &self.engine.actor);
            }
            Err(e) => return Err(e),
        };

        match self.engine.remote.insert(T::KIND, row).await {
            Ok(stored) => {
                let (remote_id, fields) = wire::from_remote_row::<T>(stored)?;
                Ok(self.republish(remote_id, fields))
            }
            Err(e) if e.is_transport() => {
                warn!(kind = %T::KIND, error = %e, "remote insert failed, storing locally");
                self.engine.storage.insert_local(&fields, &self.engine.actor)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write new fields for an existing record.
    ///
    /// A record without a remote key is inserted remotely and promoted; one
    /// with a remote key is updated by that key.
    async fn write(&mut self, record: &Record<T>, fields: T) -> Result<Record<T>> {
        let local_id = match record.local_id {
            Some(id) => id,
            None => self.republish_pending(record)?,
        };
        let fields = canonicalize_refs(&self.engine.storage, &fields)?;

        let keep_local = |engine: &mut SyncEngine<R, C>, fields: T| -> Result<Record<T>> {
            engine
                .storage
                .save_fields(local_id, &fields, false, &engine.actor)?;
            Ok(Record {
                key: record.key.clone(),
                local_id: Some(local_id),
                is_synced: false,
                fields,
            })
        };

        if !self.engine.is_online().await {
            debug!(kind = %T::KIND, key = %record.key, "offline, saving locally");
            return keep_local(self.engine, fields);
        }

        let row = match wire::to_remote_row(&fields) {
            Ok(row) => row,
            Err(Error::UnresolvedReference { field, .. }) => {
                debug!(kind = %T::KIND, field, "reference not pushed yet, saving locally");
                return keep_local(self.engine, fields);
            }
            Err(e) => return Err(e),
        };

        let result = match &record.key {
            Key::Remote(id) => self.engine.remote.update(T::KIND, id, row).await,
            Key::Local(_) => self.engine.remote.insert(T::KIND, row).await,
        };

        match result {
            Ok(stored) => {
                let (remote_id, remote_fields) = wire::from_remote_row::<T>(stored)?;
                if record.key.is_remote() {
                    Ok(self.republish(remote_id, remote_fields))
                } else {
                    self.engine.storage.promote(
                        local_id,
                        &remote_id,
                        &remote_fields,
                        &self.engine.actor,
                    )
                }
            }
            Err(e) if e.is_transport() => {
                warn!(kind = %T::KIND, key = %record.key, error = %e, "remote write failed, saving locally");
                keep_local(self.engine, fields)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Cache a remote record that only exists in memory so it can be edited.
    fn republish_pending(&mut self, record: &Record<T>) -> Result<i64> {
        let remote_id = record.key.remote_id().ok_or_else(|| not_found::<T>(&record.key))?;
        self.engine
            .storage
            .put_synced(remote_id, &record.fields)?
            .local_id
            .ok_or_else(|| not_found::<T>(&record.key))
    }

    /// Apply a field patch.
    ///
    /// # Errors
    ///
    /// Returns `RecordNotFound` for an unknown key, `InvalidArgument` for a
    /// bad patch, or the remote store's rejection.
    pub async fn update(&mut self, key: &Key, patch: &Patch) -> Result<Record<T>> {
        let record = self.get(key).await?.ok_or_else(|| not_found::<T>(key))?;
        let fields = wire::apply_patch(&record.fields, patch)?;
        self.write(&record, fields).await
    }

    /// Push one unsynced cached record to the remote store.
    ///
    /// Returns the record as it now stands; `is_synced` is false if it
    /// could not be pushed yet.
    ///
    /// # Errors
    ///
    /// Returns `Offline` when the remote store is unreachable, or the
    /// remote store's rejection.
    pub async fn push(&mut self, key: &Key) -> Result<Record<T>> {
        let record = self
            .engine
            .storage
            .get::<T>(key)?
            .ok_or_else(|| not_found::<T>(key))?;
        if record.is_synced {
            return Ok(record);
        }
        if !self.engine.is_online().await {
            return Err(Error::Offline);
        }
        let fields = record.fields.clone();
        self.write(&record, fields).await
    }

    /// Delete a record from both stores.
    ///
    /// Succeeds if either side went through. A remote delete that could not
    /// be applied is queued and retried by the next flush.
    ///
    /// # Errors
    ///
    /// Returns `RecordNotFound` if neither store knows the key, or the local
    /// error when both sides fail.
    pub async fn delete(&mut self, key: &Key) -> Result<DeleteOutcome> {
        let cached = self.engine.storage.get::<T>(key)?;
        let remote_id = key
            .remote_id()
            .or_else(|| cached.as_ref().and_then(Record::remote_id))
            .map(str::to_string);

        if cached.is_none() && remote_id.is_none() {
            return Err(not_found::<T>(key));
        }

        let remote = match &remote_id {
            None => RemoteDelete::NotApplicable,
            Some(id) => self.delete_remote(id).await?,
        };

        let local = match self.engine.storage.delete(T::KIND, key, &self.engine.actor) {
            Ok(existed) => existed,
            Err(e) if remote == RemoteDelete::Deleted => {
                warn!(kind = %T::KIND, key = %key, error = %e, "local delete failed, left for next reconcile");
                false
            }
            Err(e) => return Err(e),
        };

        let outcome = DeleteOutcome { remote, local };
        if outcome.diverged() {
            warn!(kind = %T::KIND, key = %key, remote = ?outcome.remote, local, "delete diverged");
        }
        Ok(outcome)
    }

    async fn delete_remote(&mut self, id: &str) -> Result<RemoteDelete> {
        let failure = if self.engine.is_online().await {
            match self.engine.remote.delete(T::KIND, id).await {
                Ok(()) | Err(RemoteError::Status { status: 404, .. }) => {
                    return Ok(RemoteDelete::Deleted);
                }
                Err(e) => Some(e),
            }
        } else {
            None
        };

        let message = failure.as_ref().map(RemoteError::to_string);
        self.engine.storage.queue_deletion(
            T::KIND,
            id,
            message.as_deref(),
            &self.engine.actor,
        )?;
        Ok(RemoteDelete::Queued)
    }
}

impl<T, R, C> Repository<'_, T, R, C>
where
    T: ChildEntity,
    R: RemoteStore,
    C: Connectivity,
{
    /// Children of one trip, in caller order.
    ///
    /// # Errors
    ///
    /// Returns `TripNotFound` for an unknown local trip key, or the remote
    /// store's rejection. Transport failures fall back to the cache.
    pub async fn list(&mut self, parent: &Key) -> Result<Vec<Record<T>>> {
        let trip = self.engine.resolve_trip(parent)?;
        let Key::Remote(trip_id) = &trip else {
            return self.engine.storage.list_children(&trip);
        };

        if !self.engine.is_online().await {
            debug!(kind = %T::KIND, trip_id = %trip_id, "offline, listing cache");
            return self.engine.storage.list_children(&trip);
        }

        let rows = match self
            .engine
            .remote
            .list(T::KIND, &Filter::Trip(trip_id.clone()))
            .await
        {
            Ok(rows) => rows,
            Err(e) if e.is_transport() => {
                warn!(kind = %T::KIND, trip_id = %trip_id, error = %e, "remote unreachable, listing cache");
                return self.engine.storage.list_children(&trip);
            }
            Err(e) => return Err(e.into()),
        };

        let skip = pending_ids(&self.engine.storage, T::KIND)?;
        let fresh = rows
            .into_iter()
            .map(wire::from_remote_row::<T>)
            .filter(|row| !matches!(row, Ok((id, _)) if skip.contains(id)))
            .collect::<Result<Vec<_>>>()?;

        match self.engine.storage.refresh_children(&trip, &fresh) {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!(kind = %T::KIND, trip_id = %trip_id, error = %e, "cache refresh failed");
                Ok(fresh
                    .into_iter()
                    .map(|(id, fields)| Record {
                        key: Key::Remote(id),
                        local_id: None,
                        is_synced: true,
                        fields,
                    })
                    .collect())
            }
        }
    }

    /// Add a child to a trip.
    ///
    /// # Errors
    ///
    /// Returns `TripNotFound` for an unknown local trip key, or the remote
    /// store's rejection.
    pub async fn add(&mut self, parent: &Key, mut fields: T) -> Result<Record<T>> {
        let trip = self.engine.resolve_trip(parent)?;
        fields.set_trip_id(trip);
        self.insert(fields).await
    }
}

impl<R, C> Repository<'_, Trip, R, C>
where
    R: RemoteStore,
    C: Connectivity,
{
    /// Trips owned by or shared with `identity`.
    ///
    /// # Errors
    ///
    /// Returns the remote store's rejection. Transport failures fall back
    /// to the cache.
    pub async fn list_visible(&mut self, identity: &Identity) -> Result<Vec<Record<Trip>>> {
        let cached = |storage: &SqliteStorage| -> Result<Vec<Record<Trip>>> {
            Ok(storage
                .list_trips()?
                .into_iter()
                .filter(|t| t.fields.is_accessible_by(&identity.user_id))
                .collect())
        };

        if !self.engine.is_online().await {
            debug!(user = %identity.user_id, "offline, listing cached trips");
            return cached(&self.engine.storage);
        }

        let rows = match self
            .engine
            .remote
            .list(
                crate::model::EntityKind::Trip,
                &Filter::VisibleTo(identity.user_id.clone()),
            )
            .await
        {
            Ok(rows) => rows,
            Err(e) if e.is_transport() => {
                warn!(error = %e, "remote unreachable, listing cached trips");
                return cached(&self.engine.storage);
            }
            Err(e) => return Err(e.into()),
        };

        let skip = pending_ids(&self.engine.storage, crate::model::EntityKind::Trip)?;
        let fresh = rows
            .into_iter()
            .map(wire::from_remote_row::<Trip>)
            .filter(|row| !matches!(row, Ok((id, _)) if skip.contains(id)))
            .collect::<Result<Vec<_>>>()?;

        match self.engine.storage.refresh_trips(&identity.user_id, &fresh) {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!(error = %e, "trip cache refresh failed");
                Ok(fresh
                    .into_iter()
                    .map(|(id, fields)| Record {
                        key: Key::Remote(id),
                        local_id: None,
                        is_synced: true,
                        fields,
                    })
                    .collect())
            }
        }
    }

    /// Create a trip.
    ///
    /// # Errors
    ///
    /// Returns the remote store's rejection.
    pub async fn create(&mut self, trip: Trip) -> Result<Record<Trip>> {
        self.insert(trip).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::ManualConnectivity;
    use crate::model::{EntityKind, Expense, PackingItem, Traveler};
    use crate::remote::MemoryRemoteStore;
    use serde_json::json;

    fn engine(online: bool) -> (
        SyncEngine<MemoryRemoteStore, ManualConnectivity>,
        MemoryRemoteStore,
        ManualConnectivity,
    ) {
        let remote = MemoryRemoteStore::new();
        let net = ManualConnectivity::new(online);
        let engine = SyncEngine::new(
            remote.clone(),
            net.clone(),
            SqliteStorage::open_memory().unwrap(),
        );
        (engine, remote, net)
    }

    #[tokio::test]
    async fn test_online_create_returns_remote_record() {
        let (mut engine, remote, _) = engine(true);
        remote.queue_ids(["T1"]);

        let trip = engine.trips().create(Trip::new("Rome", "alice")).await.unwrap();
        assert_eq!(trip.key, Key::remote("T1"));
        assert!(trip.is_synced);
        assert!(remote.row(EntityKind::Trip, "T1").is_some());

        let cached: Record<Trip> = engine.storage().get(&trip.key).unwrap().unwrap();
        assert!(cached.is_synced);
    }

    #[tokio::test]
    async fn test_offline_operations_use_cache_only() {
        let (mut engine, remote, _) = engine(false);

        let trip = engine.trips().create(Trip::new("Rome", "alice")).await.unwrap();
        assert_eq!(trip.key, Key::Local(1));
        assert!(!trip.is_synced);

        let item = engine
            .packing()
            .add(&trip.key, PackingItem::new(Key::Local(0), "Socks", 0))
            .await
            .unwrap();
        assert_eq!(item.fields.trip_id, trip.key);

        let mut patch = Patch::new();
        patch.insert("completed".into(), json!(true));
        let updated = engine.packing().update(&item.key, &patch).await.unwrap();
        assert!(updated.fields.completed);
        assert!(!updated.is_synced);

        let listed = engine.packing().list(&trip.key).await.unwrap();
        assert_eq!(listed.len(), 1);

        let outcome = engine.packing().delete(&item.key).await.unwrap();
        assert_eq!(outcome.remote, RemoteDelete::NotApplicable);
        assert!(outcome.local);

        assert_eq!(remote.call_count(), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_falls_back_without_error() {
        let (mut engine, remote, _) = engine(true);
        remote.seed(
            EntityKind::Trip,
            json!({"id": "T1", "title": "Rome", "owner_id": "alice", "updated_at": "2026-01-01T00:00:00Z"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let cached = engine.trips().get(&Key::remote("T1")).await.unwrap();
        assert!(cached.is_some());

        remote.fail_all(&RemoteError::Transport("connection reset".into()));

        let got = engine.trips().get(&Key::remote("T1")).await.unwrap().unwrap();
        assert_eq!(got.fields.title, "Rome");

        let created = engine
            .packing()
            .add(&Key::remote("T1"), PackingItem::new(Key::Local(0), "Socks", 0))
            .await
            .unwrap();
        assert!(!created.is_synced);
        assert!(matches!(created.key, Key::Local(_)));
    }

    #[tokio::test]
    async fn test_rejection_is_surfaced() {
        let (mut engine, remote, _) = engine(true);
        remote.fail(EntityKind::Trip, RemoteError::status(403, "row level security"));
        let err = engine
            .trips()
            .create(Trip::new("Rome", "alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Remote(RemoteError::Status { status: 403, .. })));
    }

    #[tokio::test]
    async fn test_local_key_never_reaches_remote() {
        let (mut engine, remote, _) = engine(true);
        assert!(engine.trips().get(&Key::Local(42)).await.unwrap().is_none());
        assert_eq!(remote.call_count(), 0);
    }

    #[tokio::test]
    async fn test_online_list_reflects_latest_remote_write() {
        let (mut engine, remote, _) = engine(true);
        remote.queue_ids(["T1", "P1"]);
        let trip = engine.trips().create(Trip::new("Rome", "alice")).await.unwrap();
        let item = engine
            .packing()
            .add(&trip.key, PackingItem::new(Key::Local(0), "Socks", 0))
            .await
            .unwrap();

        // Another client renames the item.
        remote.patch(
            EntityKind::Packing,
            "P1",
            json!({"title": "Wool socks"}).as_object().cloned().unwrap(),
        );

        let listed = engine.packing().list(&trip.key).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].fields.title, "Wool socks");

        let cached: Record<PackingItem> = engine.storage().get(&item.key).unwrap().unwrap();
        assert_eq!(cached.fields.title, "Wool socks");
    }

    #[tokio::test]
    async fn test_update_of_local_record_promotes_it() {
        let (mut engine, remote, net) = engine(false);
        let trip = engine.trips().create(Trip::new("A", "alice")).await.unwrap();
        let traveler = engine
            .travelers()
            .add(&trip.key, Traveler::new(Key::Local(0), "Ana"))
            .await
            .unwrap();

        net.set_online(true);
        remote.queue_ids(["R9"]);
        engine.trips().push(&trip.key).await.unwrap();

        remote.queue_ids(["V1"]);
        let mut patch = Patch::new();
        patch.insert("email".into(), json!("ana@example.com"));
        let updated = engine.travelers().update(&traveler.key, &patch).await.unwrap();
        assert_eq!(updated.key, Key::remote("V1"));
        assert_eq!(updated.fields.trip_id, Key::remote("R9"));
        assert_eq!(
            remote.row(EntityKind::Traveler, "V1").unwrap()["trip_id"],
            json!("R9")
        );
    }

    #[tokio::test]
    async fn test_delete_queues_remote_side_when_offline() {
        let (mut engine, remote, net) = engine(true);
        remote.queue_ids(["T1", "E1"]);
        let trip = engine.trips().create(Trip::new("Rome", "alice")).await.unwrap();
        let expense = engine
            .expenses()
            .add(&trip.key, Expense::new(Key::Local(0), "Taxi", 20.0))
            .await
            .unwrap();

        net.set_online(false);
        let outcome = engine.expenses().delete(&expense.key).await.unwrap();
        assert_eq!(outcome.remote, RemoteDelete::Queued);
        assert!(outcome.local);
        assert!(outcome.diverged());

        let pending = engine.storage().pending_deletions().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].remote_id, "E1");
        assert!(remote.row(EntityKind::Expense, "E1").is_some());
    }

    #[tokio::test]
    async fn test_online_delete_removes_both_sides_and_scrubs_refs() {
        let (mut engine, remote, _) = engine(true);
        remote.queue_ids(["T1", "V1", "E1"]);
        let trip = engine.trips().create(Trip::new("Rome", "alice")).await.unwrap();
        let payer = engine
            .travelers()
            .add(&trip.key, Traveler::new(Key::Local(0), "Ana"))
            .await
            .unwrap();
        let mut expense = Expense::new(Key::Local(0), "Dinner", 80.0);
        expense.payer_id = Some(payer.key.clone());
        let expense = engine.expenses().add(&trip.key, expense).await.unwrap();
        assert_eq!(expense.key, Key::remote("E1"));

        let outcome = engine.travelers().delete(&payer.key).await.unwrap();
        assert_eq!(outcome.remote, RemoteDelete::Deleted);
        assert!(outcome.local);
        assert!(!outcome.diverged());
        assert!(remote.row(EntityKind::Traveler, "V1").is_none());

        let cached: Record<Expense> = engine.storage().get(&expense.key).unwrap().unwrap();
        assert_eq!(cached.fields.payer_id, None);
        assert!(engine.storage().pending_deletions().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deleted_payer_stays_dropped_after_flush_and_reconcile() {
        let (mut engine, remote, _) = engine(true);
        remote.queue_ids(["T1", "V1", "E1"]);
        let trip = engine.trips().create(Trip::new("Rome", "alice")).await.unwrap();
        let payer = engine
            .travelers()
            .add(&trip.key, Traveler::new(Key::Local(0), "Ana"))
            .await
            .unwrap();
        let mut expense = Expense::new(Key::Local(0), "Dinner", 80.0);
        expense.payer_id = Some(payer.key.clone());
        expense.charged_to = vec![payer.key.clone()];
        let expense = engine.expenses().add(&trip.key, expense).await.unwrap();

        engine.travelers().delete(&payer.key).await.unwrap();
        let cached: Record<Expense> = engine.storage().get(&expense.key).unwrap().unwrap();
        assert!(cached.fields.charged_to.is_empty());
        assert!(!cached.is_synced);

        let stats = engine.flush_pending().await.unwrap();
        assert_eq!(stats.updated.expenses, 1);
        let stored = remote.row(EntityKind::Expense, "E1").unwrap();
        assert_eq!(stored["payer_id"], serde_json::Value::Null);
        assert_eq!(stored["charged_to"], json!([]));

        engine.sync_trip("T1").await.unwrap();
        let contents = engine.cached_contents(&Key::remote("T1")).unwrap();
        assert!(contents.travelers.is_empty());
        assert_eq!(contents.expenses[0].fields.payer_id, None);
        assert!(contents.expenses[0].is_synced);
    }

    #[tokio::test]
    async fn test_list_visible_filters_by_identity() {
        let (mut engine, remote, net) = engine(true);
        for (id, owner, shared) in [("T1", "alice", vec![]), ("T2", "carol", vec!["alice"]), ("T3", "carol", vec![])] {
            remote.seed(
                EntityKind::Trip,
                json!({"id": id, "title": id, "owner_id": owner, "shared_with": shared, "updated_at": "2026-01-01T00:00:00Z"})
                    .as_object()
                    .cloned()
                    .unwrap(),
            );
        }
        let alice = Identity::new("alice");
        let online = engine.trips().list_visible(&alice).await.unwrap();
        assert_eq!(online.len(), 2);

        net.set_online(false);
        let offline = engine.trips().list_visible(&alice).await.unwrap();
        assert_eq!(offline.len(), 2);
        let carol = engine.trips().list_visible(&Identity::new("carol")).await.unwrap();
        assert_eq!(carol.len(), 1);
    }
}
