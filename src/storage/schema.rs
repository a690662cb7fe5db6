//! Local cache schema.
//!
//! Every entity kind gets its own table shaped like an indexed object
//! store: an auto-incrementing local key, a nullable unique remote key, the
//! sync flag, the owning-trip reference split by key space, a sort position
//! and the entity document as JSON.

use rusqlite::{Connection, Result};

/// Current schema version for migration tracking.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema for the tripsync cache.
///
/// Timestamps are stored as INTEGER (Unix milliseconds).
pub const SCHEMA_SQL: &str = r"
-- ====================
-- Schema Version Tracking
-- ====================

CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- ====================
-- Entity Tables
-- ====================

CREATE TABLE IF NOT EXISTS trips (
    local_id INTEGER PRIMARY KEY AUTOINCREMENT,
    remote_id TEXT UNIQUE,
    is_synced INTEGER NOT NULL DEFAULT 0,
    sort_order INTEGER NOT NULL DEFAULT 0,
    data TEXT NOT NULL,
    cached_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_trips_synced ON trips(is_synced);

CREATE TABLE IF NOT EXISTS places (
    local_id INTEGER PRIMARY KEY AUTOINCREMENT,
    remote_id TEXT UNIQUE,
    is_synced INTEGER NOT NULL DEFAULT 0,
    trip_local_id INTEGER,
    trip_remote_id TEXT,
    sort_order INTEGER NOT NULL DEFAULT 0,
    data TEXT NOT NULL,
    cached_at INTEGER NOT NULL,
    CHECK ((trip_local_id IS NULL) != (trip_remote_id IS NULL))
);

CREATE INDEX IF NOT EXISTS idx_places_trip_local ON places(trip_local_id);
CREATE INDEX IF NOT EXISTS idx_places_trip_remote ON places(trip_remote_id);
CREATE INDEX IF NOT EXISTS idx_places_synced ON places(is_synced);

CREATE TABLE IF NOT EXISTS itinerary (
    local_id INTEGER PRIMARY KEY AUTOINCREMENT,
    remote_id TEXT UNIQUE,
    is_synced INTEGER NOT NULL DEFAULT 0,
    trip_local_id INTEGER,
    trip_remote_id TEXT,
    sort_order INTEGER NOT NULL DEFAULT 0,
    data TEXT NOT NULL,
    cached_at INTEGER NOT NULL,
    CHECK ((trip_local_id IS NULL) != (trip_remote_id IS NULL))
);

CREATE INDEX IF NOT EXISTS idx_itinerary_trip_local ON itinerary(trip_local_id);
CREATE INDEX IF NOT EXISTS idx_itinerary_trip_remote ON itinerary(trip_remote_id);
CREATE INDEX IF NOT EXISTS idx_itinerary_synced ON itinerary(is_synced);

CREATE TABLE IF NOT EXISTS packing (
    local_id INTEGER PRIMARY KEY AUTOINCREMENT,
    remote_id TEXT UNIQUE,
    is_synced INTEGER NOT NULL DEFAULT 0,
    trip_local_id INTEGER,
    trip_remote_id TEXT,
    sort_order INTEGER NOT NULL DEFAULT 0,
    data TEXT NOT NULL,
    cached_at INTEGER NOT NULL,
    CHECK ((trip_local_id IS NULL) != (trip_remote_id IS NULL))
);

CREATE INDEX IF NOT EXISTS idx_packing_trip_local ON packing(trip_local_id);
CREATE INDEX IF NOT EXISTS idx_packing_trip_remote ON packing(trip_remote_id);
CREATE INDEX IF NOT EXISTS idx_packing_synced ON packing(is_synced);

CREATE TABLE IF NOT EXISTS travelers (
    local_id INTEGER PRIMARY KEY AUTOINCREMENT,
    remote_id TEXT UNIQUE,
    is_synced INTEGER NOT NULL DEFAULT 0,
    trip_local_id INTEGER,
    trip_remote_id TEXT,
    sort_order INTEGER NOT NULL DEFAULT 0,
    data TEXT NOT NULL,
    cached_at INTEGER NOT NULL,
    CHECK ((trip_local_id IS NULL) != (trip_remote_id IS NULL))
);

CREATE INDEX IF NOT EXISTS idx_travelers_trip_local ON travelers(trip_local_id);
CREATE INDEX IF NOT EXISTS idx_travelers_trip_remote ON travelers(trip_remote_id);
CREATE INDEX IF NOT EXISTS idx_travelers_synced ON travelers(is_synced);

CREATE TABLE IF NOT EXISTS expenses (
    local_id INTEGER PRIMARY KEY AUTOINCREMENT,
    remote_id TEXT UNIQUE,
    is_synced INTEGER NOT NULL DEFAULT 0,
    trip_local_id INTEGER,
    trip_remote_id TEXT,
    sort_order INTEGER NOT NULL DEFAULT 0,
    data TEXT NOT NULL,
    cached_at INTEGER NOT NULL,
    CHECK ((trip_local_id IS NULL) != (trip_remote_id IS NULL))
);

CREATE INDEX IF NOT EXISTS idx_expenses_trip_local ON expenses(trip_local_id);
CREATE INDEX IF NOT EXISTS idx_expenses_trip_remote ON expenses(trip_remote_id);
CREATE INDEX IF NOT EXISTS idx_expenses_synced ON expenses(is_synced);

-- ====================
-- Sync Bookkeeping
-- ====================

-- Remote deletes that could not be applied yet
CREATE TABLE IF NOT EXISTS pending_deletions (
    kind TEXT NOT NULL,
    remote_id TEXT NOT NULL,
    queued_at INTEGER NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    PRIMARY KEY (kind, remote_id)
);

-- ====================
-- Audit Events
-- ====================

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    actor TEXT NOT NULL,
    old_value TEXT,
    new_value TEXT,
    comment TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);
CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type);
CREATE INDEX IF NOT EXISTS idx_events_created ON events(created_at DESC);
";

/// Apply the schema to the database.
///
/// Idempotent: every statement uses `IF NOT EXISTS`, and migrations track
/// what they have already applied.
///
/// # Errors
///
/// Returns an error if the SQL execution fails or pragmas cannot be set.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    conn.execute_batch(SCHEMA_SQL)?;

    super::migrations::run_migrations(conn)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![
            format!("v{CURRENT_SCHEMA_VERSION}"),
            chrono::Utc::now().timestamp_millis()
        ],
    )?;

    Ok(())
}
