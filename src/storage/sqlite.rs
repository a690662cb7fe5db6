//! SQLite storage implementation.
//!
//! This module provides the local cache for tripsync. It follows the
//! `MutationContext` pattern for transaction discipline and audit logging:
//! every write runs inside one IMMEDIATE transaction and records its audit
//! events before committing.
//!
//! Entity documents are stored as JSON with references in tagged [`Key`]
//! form. The owning-trip reference is mirrored into `trip_local_id` or
//! `trip_remote_id` so a trip's children can be found by index.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Transaction};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::model::{map_refs, wire, Entity, EntityKind, Key, Record, Trip, TripMeta};
use crate::storage::events::{insert_event, Event, EventType};
use crate::storage::schema::apply_schema;

/// SQLite-based cache backend.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

/// Context for a mutation operation, tracking side effects.
///
/// Passed to mutation closures to collect the audit events written at the
/// end of the transaction.
pub struct MutationContext {
    /// Name of the operation being performed.
    pub op_name: String,
    /// Actor performing the operation.
    pub actor: String,
    /// Events to write at the end of the transaction.
    pub events: Vec<Event>,
}

impl MutationContext {
    #[must_use]
    pub fn new(op_name: &str, actor: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            actor: actor.to_string(),
            events: Vec::new(),
        }
    }

    /// Record an event for this operation.
    pub fn record_event(&mut self, kind: EntityKind, key: &Key, event_type: EventType) {
        self.events.push(Event::new(
            kind.as_str(),
            &key.to_string(),
            event_type,
            &self.actor,
        ));
    }

    /// Record an event with old/new values.
    pub fn record_change(
        &mut self,
        kind: EntityKind,
        key: &Key,
        event_type: EventType,
        old_value: Option<String>,
        new_value: Option<String>,
    ) {
        self.events.push(
            Event::new(kind.as_str(), &key.to_string(), event_type, &self.actor)
                .with_values(old_value, new_value),
        );
    }

    /// Record an event with a free-text comment.
    pub fn record_note(&mut self, kind: EntityKind, key: &Key, event_type: EventType, note: &str) {
        self.events.push(
            Event::new(kind.as_str(), &key.to_string(), event_type, &self.actor)
                .with_comment(note),
        );
    }
}

/// A document ready to be written to the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRow {
    pub kind: EntityKind,
    pub remote_id: Option<String>,
    pub is_synced: bool,
    /// Owning trip; `None` for trips.
    pub trip: Option<Key>,
    pub sort_order: i64,
    pub data: Map<String, Value>,
}

impl CacheRow {
    /// A local-only, unsynced row.
    pub fn local<T: Entity>(fields: &T) -> Result<Self> {
        Ok(Self {
            kind: T::KIND,
            remote_id: None,
            is_synced: false,
            trip: fields.trip_id().cloned(),
            sort_order: fields.sort_order(),
            data: wire::to_document(fields)?,
        })
    }

    /// A row mirroring the remote store.
    pub fn synced<T: Entity>(remote_id: &str, fields: &T) -> Result<Self> {
        Ok(Self {
            remote_id: Some(remote_id.to_string()),
            is_synced: true,
            ..Self::local(fields)?
        })
    }

    fn trip_columns(&self) -> (Option<i64>, Option<&str>) {
        match &self.trip {
            Some(key) => (key.local_id(), key.remote_id()),
            None => (None, None),
        }
    }
}

/// A remote delete waiting to be retried.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PendingDeletion {
    pub kind: EntityKind,
    pub remote_id: String,
    pub queued_at: i64,
    pub attempts: i64,
    pub last_error: Option<String>,
}

/// Outcome of replacing one trip's children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceStats {
    /// Rows removed, synced or not.
    pub removed: usize,
    /// Removed rows that had never been pushed.
    pub discarded_unsynced: usize,
    /// Rows inserted from the remote snapshot.
    pub inserted: usize,
}

/// Raw cache row as read from a table.
struct StoredRow {
    local_id: i64,
    remote_id: Option<String>,
    is_synced: bool,
    data: String,
}

impl StoredRow {
    const COLUMNS: &'static str = "local_id, remote_id, is_synced, data";

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            local_id: row.get(0)?,
            remote_id: row.get(1)?,
            is_synced: row.get(2)?,
            data: row.get(3)?,
        })
    }

    fn key(&self) -> Key {
        self.remote_id
            .clone()
            .map_or(Key::Local(self.local_id), Key::Remote)
    }

    fn document(&self) -> Result<Map<String, Value>> {
        Ok(serde_json::from_str(&self.data)?)
    }

    fn into_record<T: Entity>(self) -> Result<Record<T>> {
        let fields = serde_json::from_str(&self.data)?;
        Ok(Record {
            key: self.key(),
            local_id: Some(self.local_id),
            is_synced: self.is_synced,
            fields,
        })
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// SQL predicate selecting the children of `trip` (parameter `?1`).
fn trip_scope(trip: &Key) -> (&'static str, rusqlite::types::Value) {
    match trip {
        Key::Local(id) => ("trip_local_id = ?1", (*id).into()),
        Key::Remote(id) => ("trip_remote_id = ?1", id.clone().into()),
    }
}

/// Insert a cache row and return its new local id.
///
/// # Errors
///
/// Returns an error if the row violates a constraint (duplicate remote key,
/// missing trip reference on a child).
pub fn insert_row(conn: &Connection, row: &CacheRow) -> Result<i64> {
    let (trip_local, trip_remote) = row.trip_columns();
    let sql = if row.kind.is_child() {
        format!(
            "INSERT INTO {} (remote_id, is_synced, trip_local_id, trip_remote_id, sort_order, data, cached_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            row.kind.table()
        )
    } else {
        format!(
            "INSERT INTO {} (remote_id, is_synced, sort_order, data, cached_at)
             VALUES (?1, ?2, ?5, ?6, ?7)",
            row.kind.table()
        )
    };
    conn.execute(
        &sql,
        rusqlite::params![
            row.remote_id,
            row.is_synced,
            trip_local,
            trip_remote,
            row.sort_order,
            serde_json::to_string(&row.data)?,
            now_ms(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Insert or overwrite the row holding `row.remote_id`, keeping its local id.
fn upsert_synced(conn: &Connection, row: &CacheRow) -> Result<i64> {
    let (trip_local, trip_remote) = row.trip_columns();
    let table = row.kind.table();
    let sql = if row.kind.is_child() {
        format!(
            "INSERT INTO {table} (remote_id, is_synced, trip_local_id, trip_remote_id, sort_order, data, cached_at)
             VALUES (?1, 1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(remote_id) DO UPDATE SET
                is_synced = 1,
                trip_local_id = excluded.trip_local_id,
                trip_remote_id = excluded.trip_remote_id,
                sort_order = excluded.sort_order,
                data = excluded.data,
                cached_at = excluded.cached_at
             RETURNING local_id"
        )
    } else {
        format!(
            "INSERT INTO {table} (remote_id, is_synced, sort_order, data, cached_at)
             VALUES (?1, 1, ?4, ?5, ?6)
             ON CONFLICT(remote_id) DO UPDATE SET
                is_synced = 1,
                sort_order = excluded.sort_order,
                data = excluded.data,
                cached_at = excluded.cached_at
             RETURNING local_id"
        )
    };
    let local_id = conn.query_row(
        &sql,
        rusqlite::params![
            row.remote_id,
            trip_local,
            trip_remote,
            row.sort_order,
            serde_json::to_string(&row.data)?,
            now_ms(),
        ],
        |r| r.get(0),
    )?;
    Ok(local_id)
}

fn find_row(conn: &Connection, kind: EntityKind, key: &Key) -> Result<Option<StoredRow>> {
    let (column, value): (&str, rusqlite::types::Value) = match key {
        Key::Local(id) => ("local_id", (*id).into()),
        Key::Remote(id) => ("remote_id", id.clone().into()),
    };
    let sql = format!(
        "SELECT {} FROM {} WHERE {column} = ?1",
        StoredRow::COLUMNS,
        kind.table()
    );
    Ok(conn
        .query_row(&sql, [value], StoredRow::from_row)
        .optional()?)
}

fn rows_in_trip(conn: &Connection, kind: EntityKind, trip: &Key) -> Result<Vec<StoredRow>> {
    let (predicate, value) = trip_scope(trip);
    let sql = format!(
        "SELECT {} FROM {} WHERE {predicate}
         ORDER BY sort_order, json_extract(data, '$.order'), local_id",
        StoredRow::COLUMNS,
        kind.table()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([value], StoredRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn delete_trip_children(conn: &Connection, trip: &Key) -> Result<(usize, usize)> {
    let (predicate, value) = trip_scope(trip);
    let mut removed = 0;
    let mut unsynced = 0;
    for kind in EntityKind::CHILDREN {
        let table = kind.table();
        unsynced += conn.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE {predicate} AND is_synced = 0"),
            [value.clone()],
            |r| r.get::<_, usize>(0),
        )?;
        removed += conn.execute(
            &format!("DELETE FROM {table} WHERE {predicate}"),
            [value.clone()],
        )?;
    }
    Ok((removed, unsynced))
}

/// Rewrite every reference to `old` among the records that can point at a
/// `target` record of trip `scope`. `new = None` drops the reference and
/// leaves the changed rows unsynced so the next flush pushes the drop.
///
/// Returns the number of rows changed.
fn rewrite_refs(
    conn: &Connection,
    target: EntityKind,
    scope: &Key,
    old: &Key,
    new: Option<&Key>,
) -> Result<usize> {
    let old_json = old.to_json();
    let mut changed_rows = 0;

    for dependent in target.referenced_by() {
        for stored in rows_in_trip(conn, *dependent, scope)? {
            let mut doc = stored.document()?;
            let mut changed = false;
            map_refs(*dependent, &mut doc, |field, value| {
                if field.target == target && value == old_json {
                    changed = true;
                    new.map(Key::to_json)
                } else {
                    Some(value)
                }
            });
            if !changed {
                continue;
            }

            let data = serde_json::to_string(&doc)?;
            if target == EntityKind::Trip {
                let (trip_local, trip_remote) = match new {
                    Some(key) => (key.local_id(), key.remote_id()),
                    None => (None, None),
                };
                conn.execute(
                    &format!(
                        "UPDATE {} SET data = ?1, trip_local_id = ?2, trip_remote_id = ?3 WHERE local_id = ?4",
                        dependent.table()
                    ),
                    rusqlite::params![data, trip_local, trip_remote, stored.local_id],
                )?;
            } else if new.is_some() {
                conn.execute(
                    &format!("UPDATE {} SET data = ?1 WHERE local_id = ?2", dependent.table()),
                    rusqlite::params![data, stored.local_id],
                )?;
            } else {
                // The remote copy still holds the dropped reference.
                conn.execute(
                    &format!(
                        "UPDATE {} SET data = ?1, is_synced = 0 WHERE local_id = ?2",
                        dependent.table()
                    ),
                    rusqlite::params![data, stored.local_id],
                )?;
            }
            changed_rows += 1;
        }
    }

    Ok(changed_rows)
}

impl SqliteStorage {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(timeout_ms.unwrap_or(5000)))?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Execute a mutation with the transaction protocol.
    ///
    /// Begins an IMMEDIATE transaction, runs the closure, writes the audit
    /// events it recorded and commits. Any error rolls everything back.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails.
    pub fn mutate<F, R>(&mut self, op: &str, actor: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let mut ctx = MutationContext::new(op, actor);
        let result = f(&tx, &mut ctx)?;

        for event in &ctx.events {
            insert_event(&tx, event)?;
        }

        tx.commit()?;
        Ok(result)
    }

    // ==================
    // Reads
    // ==================

    /// Get a record by either key.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the cached document is corrupt.
    pub fn get<T: Entity>(&self, key: &Key) -> Result<Option<Record<T>>> {
        find_row(&self.conn, T::KIND, key)?
            .map(StoredRow::into_record)
            .transpose()
    }

    /// The key a cached record is currently known by.
    ///
    /// A local key of a promoted record resolves to its remote key. A remote
    /// key is returned as-is even when not cached. `None` means a local key
    /// with no cached row.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn canonical_key(&self, kind: EntityKind, key: &Key) -> Result<Option<Key>> {
        match key {
            Key::Remote(_) => Ok(Some(key.clone())),
            Key::Local(_) => Ok(find_row(&self.conn, kind, key)?.map(|row| row.key())),
        }
    }

    /// Children of `trip` in caller order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_children<T: Entity>(&self, trip: &Key) -> Result<Vec<Record<T>>> {
        rows_in_trip(&self.conn, T::KIND, trip)?
            .into_iter()
            .map(StoredRow::into_record)
            .collect()
    }

    /// Every cached trip, earliest start date first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_trips(&self) -> Result<Vec<Record<Trip>>> {
        let sql = format!(
            "SELECT {} FROM trips
             ORDER BY json_extract(data, '$.start_date') IS NULL,
                      json_extract(data, '$.start_date'),
                      local_id",
            StoredRow::COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], StoredRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(StoredRow::into_record).collect()
    }

    /// Records whose local state has not reached the remote store.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_unsynced<T: Entity>(&self) -> Result<Vec<Record<T>>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE is_synced = 0 ORDER BY local_id",
            StoredRow::COLUMNS,
            T::KIND.table()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], StoredRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(StoredRow::into_record).collect()
    }

    /// Total and unsynced row counts for a kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn counts(&self, kind: EntityKind) -> Result<(usize, usize)> {
        let sql = format!(
            "SELECT COUNT(*), COALESCE(SUM(is_synced = 0), 0) FROM {}",
            kind.table()
        );
        Ok(self.conn.query_row(&sql, [], |r| Ok((r.get(0)?, r.get(1)?)))?)
    }

    /// Queued remote deletes, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn pending_deletions(&self) -> Result<Vec<PendingDeletion>> {
        let mut stmt = self.conn.prepare(
            "SELECT kind, remote_id, queued_at, attempts, last_error
             FROM pending_deletions ORDER BY queued_at, rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            let kind: String = row.get(0)?;
            let kind = kind.parse::<EntityKind>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into())
            })?;
            Ok(PendingDeletion {
                kind,
                remote_id: row.get(1)?,
                queued_at: row.get(2)?,
                attempts: row.get(3)?,
                last_error: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ==================
    // Local writes
    // ==================

    /// Store a record that exists only locally.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_local<T: Entity>(&mut self, fields: &T, actor: &str) -> Result<Record<T>> {
        let row = CacheRow::local(fields)?;
        let local_id = self.mutate("insert_local", actor, |tx, ctx| {
            let local_id = insert_row(tx, &row)?;
            ctx.record_event(T::KIND, &Key::Local(local_id), EventType::RecordCreated);
            Ok(local_id)
        })?;
        Ok(Record {
            key: Key::Local(local_id),
            local_id: Some(local_id),
            is_synced: false,
            fields: fields.clone(),
        })
    }

    /// Overwrite a cached record's fields and sync flag.
    ///
    /// # Errors
    ///
    /// Returns `RecordNotFound` if no row has this local id.
    pub fn save_fields<T: Entity>(
        &mut self,
        local_id: i64,
        fields: &T,
        synced: bool,
        actor: &str,
    ) -> Result<()> {
        let kind = T::KIND;
        let data = serde_json::to_string(&wire::to_document(fields)?)?;
        self.mutate("save_fields", actor, |tx, ctx| {
            let changed = tx.execute(
                &format!(
                    "UPDATE {} SET data = ?1, sort_order = ?2, is_synced = ?3, cached_at = ?4 WHERE local_id = ?5",
                    kind.table()
                ),
                rusqlite::params![data, fields.sort_order(), synced, now_ms(), local_id],
            )?;
            if changed == 0 {
                return Err(Error::RecordNotFound {
                    kind,
                    key: Key::Local(local_id).to_string(),
                });
            }
            ctx.record_event(kind, &Key::Local(local_id), EventType::RecordUpdated);
            Ok(())
        })
    }

    /// Delete a record, cascading to a trip's children and dropping
    /// references held by sibling records.
    ///
    /// Returns `false` if nothing was cached under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails; nothing is removed in that case.
    pub fn delete(&mut self, kind: EntityKind, key: &Key, actor: &str) -> Result<bool> {
        let Some(stored) = find_row(&self.conn, kind, key)? else {
            return Ok(false);
        };
        let current = stored.key();
        let trip = if kind.is_child() {
            let doc = stored.document()?;
            doc.get(crate::model::TRIP_REF).and_then(Key::from_json)
        } else {
            None
        };

        self.mutate("delete", actor, |tx, ctx| {
            tx.execute(
                &format!("DELETE FROM {} WHERE local_id = ?1", kind.table()),
                [stored.local_id],
            )?;

            if kind == EntityKind::Trip {
                let (removed, _) = delete_trip_children(tx, &current)?;
                if let Key::Remote(_) = current {
                    // Children cached before promotion finished.
                    delete_trip_children(tx, &Key::Local(stored.local_id))?;
                }
                ctx.record_note(kind, &current, EventType::RecordDeleted, &format!("{removed} children removed"));
            } else {
                if let Some(trip) = &trip {
                    rewrite_refs(tx, kind, trip, &current, None)?;
                }
                ctx.record_event(kind, &current, EventType::RecordDeleted);
            }
            Ok(true)
        })
    }

    // ==================
    // Remote mirror writes
    // ==================

    /// Cache a record as the remote store returned it.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub fn put_synced<T: Entity>(&mut self, remote_id: &str, fields: &T) -> Result<Record<T>> {
        let row = CacheRow::synced(remote_id, fields)?;
        let key = Key::remote(remote_id);
        let local_id = self.mutate("put_synced", "cache", |tx, ctx| {
            let local_id = upsert_synced(tx, &row)?;
            ctx.record_event(T::KIND, &key, EventType::RecordUpdated);
            Ok(local_id)
        })?;
        Ok(Record {
            key,
            local_id: Some(local_id),
            is_synced: true,
            fields: fields.clone(),
        })
    }

    /// Refresh the cached children of `trip` from a remote listing.
    ///
    /// Rows with a remote key that the listing no longer contains are
    /// removed; local-only rows are kept for the next push.
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh fails; the cache is left as it was.
    pub fn refresh_children<T: Entity>(
        &mut self,
        trip: &Key,
        rows: &[(String, T)],
    ) -> Result<Vec<Record<T>>> {
        let kind = T::KIND;
        let fresh: HashSet<&str> = rows.iter().map(|(id, _)| id.as_str()).collect();
        let cache_rows = rows
            .iter()
            .map(|(id, fields)| CacheRow::synced(id, fields))
            .collect::<Result<Vec<_>>>()?;

        self.mutate("refresh_children", "cache", |tx, _| {
            for stored in rows_in_trip(tx, kind, trip)? {
                if stored.remote_id.as_deref().is_some_and(|id| !fresh.contains(id)) {
                    tx.execute(
                        &format!("DELETE FROM {} WHERE local_id = ?1", kind.table()),
                        [stored.local_id],
                    )?;
                }
            }
            cache_rows
                .iter()
                .zip(rows)
                .map(|(row, (id, fields))| {
                    Ok(Record {
                        key: Key::remote(id.clone()),
                        local_id: Some(upsert_synced(tx, row)?),
                        is_synced: true,
                        fields: fields.clone(),
                    })
                })
                .collect::<Result<Vec<_>>>()
        })
    }

    /// Refresh the cached trips visible to `user_id` from a remote listing.
    ///
    /// Cached remote trips that `user_id` could see but the listing no
    /// longer contains are removed together with their children.
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh fails; the cache is left as it was.
    pub fn refresh_trips(
        &mut self,
        user_id: &str,
        rows: &[(String, Trip)],
    ) -> Result<Vec<Record<Trip>>> {
        let fresh: HashSet<&str> = rows.iter().map(|(id, _)| id.as_str()).collect();
        let stale: Vec<Record<Trip>> = self
            .list_trips()?
            .into_iter()
            .filter(|t| {
                t.fields.is_accessible_by(user_id)
                    && t.remote_id().is_some_and(|id| !fresh.contains(id))
            })
            .collect();
        let cache_rows = rows
            .iter()
            .map(|(id, fields)| CacheRow::synced(id, fields))
            .collect::<Result<Vec<_>>>()?;

        self.mutate("refresh_trips", "cache", |tx, _| {
            for trip in &stale {
                tx.execute("DELETE FROM trips WHERE remote_id = ?1", [trip.remote_id()])?;
                delete_trip_children(tx, &trip.key)?;
            }
            cache_rows
                .iter()
                .zip(rows)
                .map(|(row, (id, fields))| {
                    Ok(Record {
                        key: Key::remote(id.clone()),
                        local_id: Some(upsert_synced(tx, row)?),
                        is_synced: true,
                        fields: fields.clone(),
                    })
                })
                .collect::<Result<Vec<_>>>()
        })
    }

    /// Drop a remotely deleted record from the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn evict(&mut self, kind: EntityKind, remote_id: &str) -> Result<bool> {
        self.delete(kind, &Key::remote(remote_id), "cache")
    }

    /// Replace every cached child of one trip with a remote snapshot.
    ///
    /// Runs as a single transaction: readers see either the old children
    /// or the new ones, never a mix.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails; the cache is left as it was.
    pub fn replace_trip_children(
        &mut self,
        trip_remote_id: &str,
        rows: &[CacheRow],
        actor: &str,
    ) -> Result<ReplaceStats> {
        let trip = Key::remote(trip_remote_id);
        let trip_local = find_row(&self.conn, EntityKind::Trip, &trip)?.map(|r| r.local_id);

        self.mutate("replace_trip_children", actor, |tx, ctx| {
            let mut stats = ReplaceStats::default();
            let (removed, unsynced) = delete_trip_children(tx, &trip)?;
            stats.removed += removed;
            stats.discarded_unsynced += unsynced;
            if let Some(local_id) = trip_local {
                let (removed, unsynced) = delete_trip_children(tx, &Key::Local(local_id))?;
                stats.removed += removed;
                stats.discarded_unsynced += unsynced;
            }

            for row in rows {
                insert_row(tx, row)?;
                stats.inserted += 1;
            }

            ctx.record_note(
                EntityKind::Trip,
                &trip,
                EventType::TripReconciled,
                &format!("removed {} inserted {}", stats.removed, stats.inserted),
            );
            Ok(stats)
        })
    }

    /// Overwrite the ownership, sharing and timestamp fields of a cached
    /// trip, leaving its other fields alone.
    ///
    /// Returns `None` if the trip is not cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn apply_trip_metadata(
        &mut self,
        remote_id: &str,
        meta: &TripMeta,
        actor: &str,
    ) -> Result<Option<Record<Trip>>> {
        let key = Key::remote(remote_id);
        let Some(mut record) = self.get::<Trip>(&key)? else {
            return Ok(None);
        };
        let before = record.fields.metadata();
        record.fields.apply_metadata(meta.clone());
        let data = serde_json::to_string(&wire::to_document(&record.fields)?)?;

        self.mutate("apply_trip_metadata", actor, |tx, ctx| {
            tx.execute(
                "UPDATE trips SET data = ?1, cached_at = ?2 WHERE remote_id = ?3",
                rusqlite::params![data, now_ms(), remote_id],
            )?;
            if before != *meta {
                ctx.record_change(
                    EntityKind::Trip,
                    &key,
                    EventType::MetadataSynced,
                    serde_json::to_string(&before).ok(),
                    serde_json::to_string(meta).ok(),
                );
            }
            Ok(())
        })?;
        Ok(Some(record))
    }

    // ==================
    // Promotion
    // ==================

    /// Give a local-only record its remote key.
    ///
    /// In one transaction: the row takes the remote key and the stored
    /// remote fields, and every dependent record referencing the old local
    /// key is rewritten to the remote key. Children of a promoted trip move
    /// to the remote trip reference.
    ///
    /// # Errors
    ///
    /// Returns `RecordNotFound` if the local row is gone.
    pub fn promote<T: Entity>(
        &mut self,
        local_id: i64,
        remote_id: &str,
        fields: &T,
        actor: &str,
    ) -> Result<Record<T>> {
        let kind = T::KIND;
        let old = Key::Local(local_id);
        let new = Key::remote(remote_id);
        let row = CacheRow::synced(remote_id, fields)?;
        let (trip_local, trip_remote) = row.trip_columns();
        let data = serde_json::to_string(&row.data)?;

        let rewritten = self.mutate("promote", actor, |tx, ctx| {
            // A listing may have cached the remote copy already.
            tx.execute(
                &format!(
                    "DELETE FROM {} WHERE remote_id = ?1 AND local_id != ?2",
                    kind.table()
                ),
                rusqlite::params![remote_id, local_id],
            )?;

            let sql = if kind.is_child() {
                format!(
                    "UPDATE {} SET remote_id = ?1, is_synced = 1, sort_order = ?2, data = ?3,
                        cached_at = ?4, trip_local_id = ?5, trip_remote_id = ?6
                     WHERE local_id = ?7",
                    kind.table()
                )
            } else {
                format!(
                    "UPDATE {} SET remote_id = ?1, is_synced = 1, sort_order = ?2, data = ?3,
                        cached_at = ?4
                     WHERE local_id = ?7",
                    kind.table()
                )
            };
            let changed = tx.execute(
                &sql,
                rusqlite::params![
                    remote_id,
                    row.sort_order,
                    data,
                    now_ms(),
                    trip_local,
                    trip_remote,
                    local_id
                ],
            )?;
            if changed == 0 {
                return Err(Error::RecordNotFound {
                    kind,
                    key: old.to_string(),
                });
            }

            let scope = match &row.trip {
                Some(trip) => trip.clone(),
                None => old.clone(),
            };
            let rewritten = rewrite_refs(tx, kind, &scope, &old, Some(&new))?;

            ctx.record_change(
                kind,
                &old,
                EventType::RecordPromoted,
                Some(old.to_string()),
                Some(new.to_string()),
            );
            Ok(rewritten)
        })?;

        tracing::info!(
            kind = %kind,
            local_id,
            remote_id,
            rewritten,
            "promoted record"
        );

        Ok(Record {
            key: new,
            local_id: Some(local_id),
            is_synced: true,
            fields: fields.clone(),
        })
    }

    // ==================
    // Pending deletions
    // ==================

    /// Queue a remote delete for retry, counting the attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn queue_deletion(
        &mut self,
        kind: EntityKind,
        remote_id: &str,
        error: Option<&str>,
        actor: &str,
    ) -> Result<()> {
        self.mutate("queue_deletion", actor, |tx, ctx| {
            tx.execute(
                "INSERT INTO pending_deletions (kind, remote_id, queued_at, attempts, last_error)
                 VALUES (?1, ?2, ?3, 1, ?4)
                 ON CONFLICT(kind, remote_id) DO UPDATE SET
                    attempts = attempts + 1,
                    last_error = excluded.last_error",
                rusqlite::params![kind.as_str(), remote_id, now_ms(), error],
            )?;
            ctx.record_note(
                kind,
                &Key::remote(remote_id),
                EventType::DeleteDiverged,
                error.unwrap_or("remote unreachable"),
            );
            Ok(())
        })
    }

    /// Forget a queued remote delete.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn clear_deletion(&mut self, kind: EntityKind, remote_id: &str, actor: &str) -> Result<()> {
        self.mutate("clear_deletion", actor, |tx, ctx| {
            let cleared = tx.execute(
                "DELETE FROM pending_deletions WHERE kind = ?1 AND remote_id = ?2",
                rusqlite::params![kind.as_str(), remote_id],
            )?;
            if cleared > 0 {
                ctx.record_note(
                    kind,
                    &Key::remote(remote_id),
                    EventType::RecordDeleted,
                    "queued remote delete applied",
                );
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Expense, ItineraryItem, PackingItem, Place, Traveler};
    use crate::storage::events::{get_events, recent_events};

    fn storage() -> SqliteStorage {
        SqliteStorage::open_memory().unwrap()
    }

    #[test]
    fn test_open_memory() {
        let storage = storage();
        assert!(storage.list_trips().unwrap().is_empty());
    }

    #[test]
    fn test_open_file_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        {
            let mut storage = SqliteStorage::open(&path).unwrap();
            storage.insert_local(&Trip::new("Lima", "alice"), "t").unwrap();
        }
        let storage = SqliteStorage::open(&path).unwrap();
        assert_eq!(storage.list_trips().unwrap().len(), 1);
    }

    #[test]
    fn test_local_crud() {
        let mut storage = storage();
        let trip = storage.insert_local(&Trip::new("Lima", "alice"), "t").unwrap();
        assert_eq!(trip.key, Key::Local(1));
        assert!(!trip.is_synced);

        let item = storage
            .insert_local(&PackingItem::new(trip.key.clone(), "Socks", 0), "t")
            .unwrap();
        let mut fields = item.fields.clone();
        fields.completed = true;
        storage
            .save_fields(item.local_id.unwrap(), &fields, false, "t")
            .unwrap();

        let got: Record<PackingItem> = storage.get(&item.key).unwrap().unwrap();
        assert!(got.fields.completed);

        let children: Vec<Record<PackingItem>> = storage.list_children(&trip.key).unwrap();
        assert_eq!(children.len(), 1);

        assert!(storage.delete(EntityKind::Trip, &trip.key, "t").unwrap());
        let children: Vec<Record<PackingItem>> = storage.list_children(&trip.key).unwrap();
        assert!(children.is_empty());
        assert!(!storage.delete(EntityKind::Trip, &trip.key, "t").unwrap());
    }

    #[test]
    fn test_promotion_rewrites_children() {
        let mut storage = storage();
        let trip = storage.insert_local(&Trip::new("A", "alice"), "t").unwrap();
        assert_eq!(trip.key, Key::Local(1));
        for (i, title) in ["Socks", "Charger"].into_iter().enumerate() {
            storage
                .insert_local(&PackingItem::new(Key::Local(1), title, i as i64), "t")
                .unwrap();
        }

        let promoted = storage
            .promote(1, "R9", &trip.fields, "t")
            .unwrap();
        assert_eq!(promoted.key, Key::remote("R9"));

        let under_remote: Vec<Record<PackingItem>> =
            storage.list_children(&Key::remote("R9")).unwrap();
        assert_eq!(under_remote.len(), 2);
        assert!(under_remote.iter().all(|p| p.fields.trip_id == Key::remote("R9")));

        let under_local: Vec<Record<PackingItem>> =
            storage.list_children(&Key::Local(1)).unwrap();
        assert!(under_local.is_empty());

        let stale: usize = storage
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM packing WHERE trip_local_id = 1 OR data LIKE '%\"local\":1}%'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(stale, 0);

        assert_eq!(
            storage.canonical_key(EntityKind::Trip, &Key::Local(1)).unwrap(),
            Some(Key::remote("R9"))
        );
    }

    #[test]
    fn test_promotion_rewrites_traveler_refs() {
        let mut storage = storage();
        let trip = Key::remote("T1");
        let payer = storage
            .insert_local(&Traveler::new(trip.clone(), "Ana"), "t")
            .unwrap();
        let mut expense = Expense::new(trip.clone(), "Dinner", 30.0);
        expense.payer_id = Some(payer.key.clone());
        expense.charged_to = vec![payer.key.clone()];
        let expense = storage.insert_local(&expense, "t").unwrap();

        storage
            .promote(payer.local_id.unwrap(), "P1", &payer.fields, "t")
            .unwrap();

        let got: Record<Expense> = storage.get(&expense.key).unwrap().unwrap();
        assert_eq!(got.fields.payer_id, Some(Key::remote("P1")));
        assert_eq!(got.fields.charged_to, vec![Key::remote("P1")]);
        assert!(!got.is_synced);
    }

    #[test]
    fn test_itinerary_orders_by_day_then_position() {
        let mut storage = storage();
        let trip = Key::remote("T1");
        for (day, title, order) in [(1, "Train", 0), (0, "Late", 2_000_000), (0, "Early", 3)] {
            storage
                .insert_local(&ItineraryItem::new(trip.clone(), day, title, order), "t")
                .unwrap();
        }

        let items: Vec<Record<ItineraryItem>> = storage.list_children(&trip).unwrap();
        let titles: Vec<_> = items.iter().map(|r| r.fields.title.as_str()).collect();
        assert_eq!(titles, vec!["Early", "Late", "Train"]);
    }

    #[test]
    fn test_delete_scrubs_references() {
        let mut storage = storage();
        let trip = Key::remote("T1");
        let place = storage
            .put_synced("PL1", &Place::new(trip.clone(), "Louvre"))
            .unwrap();
        let mut item = ItineraryItem::new(trip.clone(), 0, "Museum", 0);
        item.place_id = Some(place.key.clone());
        let item = storage.put_synced("I1", &item).unwrap();

        assert!(storage.delete(EntityKind::Place, &place.key, "t").unwrap());

        let got: Record<ItineraryItem> = storage.get(&item.key).unwrap().unwrap();
        assert_eq!(got.fields.place_id, None);
        assert!(!got.is_synced);
    }

    #[test]
    fn test_put_synced_is_audited() {
        let mut storage = storage();
        let first = storage.put_synced("T1", &Trip::new("Rome", "alice")).unwrap();
        let again = storage.put_synced("T1", &Trip::new("Roma", "alice")).unwrap();
        assert_eq!(first.local_id, again.local_id);

        let events = get_events(storage.conn(), "trip", "remote:T1", None).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.event_type == EventType::RecordUpdated));
        assert_eq!(events[0].actor, "cache");
    }

    #[test]
    fn test_refresh_children_keeps_local_only_rows() {
        let mut storage = storage();
        let trip = Key::remote("T1");
        storage
            .put_synced("P-old", &PackingItem::new(trip.clone(), "Old", 0))
            .unwrap();
        let local = storage
            .insert_local(&PackingItem::new(trip.clone(), "Offline", 5), "t")
            .unwrap();

        let fresh = vec![("P-new".to_string(), PackingItem::new(trip.clone(), "New", 1))];
        let records = storage.refresh_children(&trip, &fresh).unwrap();
        assert_eq!(records.len(), 1);

        let cached: Vec<Record<PackingItem>> = storage.list_children(&trip).unwrap();
        let titles: Vec<_> = cached.iter().map(|r| r.fields.title.as_str()).collect();
        assert_eq!(titles, vec!["New", "Offline"]);
        assert!(storage.get::<PackingItem>(&local.key).unwrap().is_some());
    }

    #[test]
    fn test_replace_trip_children_is_total() {
        let mut storage = storage();
        let trip = Key::remote("T1");
        storage.put_synced("T1", &Trip::new("Rome", "alice")).unwrap();
        storage
            .put_synced("P1", &PackingItem::new(trip.clone(), "Old", 0))
            .unwrap();
        storage
            .insert_local(&Traveler::new(trip.clone(), "Draft"), "t")
            .unwrap();

        let rows = vec![
            CacheRow::synced("P2", &PackingItem::new(trip.clone(), "New", 0)).unwrap(),
            CacheRow::synced("V1", &Traveler::new(trip.clone(), "Ana")).unwrap(),
        ];
        let stats = storage.replace_trip_children("T1", &rows, "t").unwrap();
        assert_eq!(stats.removed, 2);
        assert_eq!(stats.discarded_unsynced, 1);
        assert_eq!(stats.inserted, 2);

        let packing: Vec<Record<PackingItem>> = storage.list_children(&trip).unwrap();
        assert_eq!(packing.len(), 1);
        assert_eq!(packing[0].key, Key::remote("P2"));
        assert!(packing[0].is_synced);

        let events = recent_events(storage.conn(), 1).unwrap();
        assert_eq!(events[0].event_type, EventType::TripReconciled);
    }

    #[test]
    fn test_replace_rolls_back_on_failure() {
        let mut storage = storage();
        let trip = Key::remote("T1");
        storage
            .put_synced("P1", &PackingItem::new(trip.clone(), "Keep", 0))
            .unwrap();

        let dup = CacheRow::synced("P2", &PackingItem::new(trip.clone(), "Dup", 0)).unwrap();
        let result = storage.replace_trip_children("T1", &[dup.clone(), dup], "t");
        assert!(result.is_err());

        let packing: Vec<Record<PackingItem>> = storage.list_children(&trip).unwrap();
        assert_eq!(packing.len(), 1);
        assert_eq!(packing[0].fields.title, "Keep");
    }

    #[test]
    fn test_apply_trip_metadata() {
        let mut storage = storage();
        let mut trip = Trip::new("Rome", "alice");
        trip.shared_with = vec!["bob".into()];
        storage.put_synced("T1", &trip).unwrap();

        let mut meta = trip.metadata();
        meta.shared_with.clear();
        let updated = storage
            .apply_trip_metadata("T1", &meta, "t")
            .unwrap()
            .unwrap();
        assert_eq!(updated.fields.title, "Rome");
        assert!(updated.fields.shared_with.is_empty());

        assert!(storage.apply_trip_metadata("T404", &meta, "t").unwrap().is_none());
    }

    #[test]
    fn test_pending_deletions_queue() {
        let mut storage = storage();
        storage
            .queue_deletion(EntityKind::Expense, "E1", Some("timeout"), "t")
            .unwrap();
        storage
            .queue_deletion(EntityKind::Expense, "E1", None, "t")
            .unwrap();

        let pending = storage.pending_deletions().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 2);

        storage.clear_deletion(EntityKind::Expense, "E1", "t").unwrap();
        assert!(storage.pending_deletions().unwrap().is_empty());

        let events = recent_events(storage.conn(), 1).unwrap();
        assert_eq!(events[0].event_type, EventType::RecordDeleted);
        assert_eq!(events[0].entity_id, "remote:E1");
        assert_eq!(events[0].comment.as_deref(), Some("queued remote delete applied"));
    }

    #[test]
    fn test_counts() {
        let mut storage = storage();
        storage.put_synced("T1", &Trip::new("Rome", "alice")).unwrap();
        storage.insert_local(&Trip::new("Oslo", "alice"), "t").unwrap();
        assert_eq!(storage.counts(EntityKind::Trip).unwrap(), (2, 1));
    }
}
