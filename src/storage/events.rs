//! Audit event storage and retrieval.
//!
//! Every cache mutation records what happened to which record, so a
//! divergent delete or an unexpected promotion can be traced afterwards.

use rusqlite::{Connection, Result};

/// Event types for audit logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    RecordCreated,
    RecordUpdated,
    RecordDeleted,
    /// A local-only record received its remote key.
    RecordPromoted,
    TripReconciled,
    MetadataSynced,
    /// Only one of the remote and local deletes went through.
    DeleteDiverged,
    GraphImported,
}

impl EventType {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RecordCreated => "record_created",
            Self::RecordUpdated => "record_updated",
            Self::RecordDeleted => "record_deleted",
            Self::RecordPromoted => "record_promoted",
            Self::TripReconciled => "trip_reconciled",
            Self::MetadataSynced => "metadata_synced",
            Self::DeleteDiverged => "delete_diverged",
            Self::GraphImported => "graph_imported",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "record_created" => Self::RecordCreated,
            "record_updated" => Self::RecordUpdated,
            "record_deleted" => Self::RecordDeleted,
            "record_promoted" => Self::RecordPromoted,
            "trip_reconciled" => Self::TripReconciled,
            "metadata_synced" => Self::MetadataSynced,
            "delete_diverged" => Self::DeleteDiverged,
            "graph_imported" => Self::GraphImported,
            _ => return None,
        })
    }
}

/// An audit event record.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub event_type: EventType,
    pub actor: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub comment: Option<String>,
    pub created_at: i64,
}

impl Event {
    /// Create a new event (id will be assigned by database).
    #[must_use]
    pub fn new(entity_type: &str, entity_id: &str, event_type: EventType, actor: &str) -> Self {
        Self {
            id: 0,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            event_type,
            actor: actor.to_string(),
            old_value: None,
            new_value: None,
            comment: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Add old/new values for field change tracking.
    #[must_use]
    pub fn with_values(mut self, old: Option<String>, new: Option<String>) -> Self {
        self.old_value = old;
        self.new_value = new;
        self
    }

    #[must_use]
    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }
}

/// Insert an event into the database.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_event(conn: &Connection, event: &Event) -> Result<i64> {
    conn.execute(
        "INSERT INTO events (entity_type, entity_id, event_type, actor, old_value, new_value, comment, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            event.entity_type,
            event.entity_id,
            event.event_type.as_str(),
            event.actor,
            event.old_value,
            event.new_value,
            event.comment,
            event.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Get events for an entity, newest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_events(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
    limit: Option<u32>,
) -> Result<Vec<Event>> {
    query_events(
        conn,
        "SELECT id, entity_type, entity_id, event_type, actor, old_value, new_value, comment, created_at
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id DESC
         LIMIT ?3",
        rusqlite::params![entity_type, entity_id, limit.unwrap_or(100)],
    )
}

/// Most recent events of any entity, newest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn recent_events(conn: &Connection, limit: u32) -> Result<Vec<Event>> {
    query_events(
        conn,
        "SELECT id, entity_type, entity_id, event_type, actor, old_value, new_value, comment, created_at
         FROM events
         ORDER BY id DESC
         LIMIT ?1",
        rusqlite::params![limit],
    )
}

fn query_events(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| {
        let raw: String = row.get(3)?;
        let event_type = EventType::parse(&raw).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                format!("unknown event type: {raw}").into(),
            )
        })?;
        Ok(Event {
            id: row.get(0)?,
            entity_type: row.get(1)?,
            entity_id: row.get(2)?,
            event_type,
            actor: row.get(4)?,
            old_value: row.get(5)?,
            new_value: row.get(6)?,
            comment: row.get(7)?,
            created_at: row.get(8)?,
        })
    })?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::apply_schema;

    #[test]
    fn test_event_insert_and_get() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let event = Event::new("packing", "local:3", EventType::RecordPromoted, "tester")
            .with_values(Some("local:3".into()), Some("remote:R9".into()));
        let id = insert_event(&conn, &event).unwrap();
        assert!(id > 0);

        let events = get_events(&conn, "packing", "local:3", Some(10)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::RecordPromoted);
        assert_eq!(events[0].new_value.as_deref(), Some("remote:R9"));
    }

    #[test]
    fn test_recent_events_newest_first() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        insert_event(&conn, &Event::new("trip", "remote:T1", EventType::MetadataSynced, "a")).unwrap();
        insert_event(
            &conn,
            &Event::new("trip", "remote:T1", EventType::TripReconciled, "a").with_comment("5 collections"),
        )
        .unwrap();

        let events = recent_events(&conn, 10).unwrap();
        assert_eq!(events[0].event_type, EventType::TripReconciled);
        assert_eq!(events[1].event_type, EventType::MetadataSynced);
    }
}
