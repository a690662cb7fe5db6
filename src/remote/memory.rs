//! In-process remote store.
//!
//! Behaves like the REST store closely enough to drive the engine without a
//! server: ids are issued on insert, trip deletes cascade, list queries
//! honor the same filters and ordering. Clones share state, so a test can
//! keep a handle while the engine owns another.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use super::{Filter, RemoteError, RemoteResult, RemoteStore, Row};
use crate::model::{EntityKind, TRIP_REF};

#[derive(Debug, Default)]
struct Inner {
    collections: HashMap<EntityKind, Vec<Row>>,
    failures: HashMap<EntityKind, RemoteError>,
    next_ids: VecDeque<String>,
    calls: usize,
}

impl Inner {
    fn issue_id(&mut self) -> String {
        self.next_ids
            .pop_front()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }

    fn enter(&mut self, kind: EntityKind) -> RemoteResult<&mut Vec<Row>> {
        self.calls += 1;
        if let Some(err) = self.failures.get(&kind) {
            return Err(err.clone());
        }
        Ok(self.collections.entry(kind).or_default())
    }
}

/// Remote store held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemoteStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ids handed out, in order, by the next inserts.
    pub fn queue_ids<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().next_ids.extend(ids.into_iter().map(Into::into));
    }

    /// Make every call touching `kind` fail with `err`.
    pub fn fail(&self, kind: EntityKind, err: RemoteError) {
        self.lock().failures.insert(kind, err);
    }

    /// Make every call fail with `err`.
    pub fn fail_all(&self, err: &RemoteError) {
        let mut inner = self.lock();
        for kind in EntityKind::ALL {
            inner.failures.insert(kind, err.clone());
        }
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Store a row directly, bypassing failure injection. Returns its id.
    pub fn seed(&self, kind: EntityKind, mut row: Row) -> String {
        let mut inner = self.lock();
        let id = match row.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => inner.issue_id(),
        };
        row.insert("id".to_string(), Value::String(id.clone()));
        inner.collections.entry(kind).or_default().push(row);
        id
    }

    /// Overwrite fields of a stored row, as another client would.
    pub fn patch(&self, kind: EntityKind, id: &str, fields: Row) -> bool {
        let mut inner = self.lock();
        let Some(row) = inner
            .collections
            .get_mut(&kind)
            .and_then(|rows| rows.iter_mut().find(|r| row_id(r) == Some(id)))
        else {
            return false;
        };
        row.extend(fields);
        true
    }

    /// Remove a row directly, as another client would.
    pub fn remove(&self, kind: EntityKind, id: &str) {
        let mut inner = self.lock();
        remove_cascading(&mut inner.collections, kind, id);
    }

    #[must_use]
    pub fn row(&self, kind: EntityKind, id: &str) -> Option<Row> {
        self.lock()
            .collections
            .get(&kind)
            .and_then(|rows| rows.iter().find(|r| row_id(r) == Some(id)).cloned())
    }

    #[must_use]
    pub fn rows(&self, kind: EntityKind) -> Vec<Row> {
        self.lock()
            .collections
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of store calls made so far, failed ones included.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.lock().calls
    }
}

fn row_id(row: &Row) -> Option<&str> {
    row.get("id").and_then(Value::as_str)
}

fn remove_cascading(collections: &mut HashMap<EntityKind, Vec<Row>>, kind: EntityKind, id: &str) {
    if let Some(rows) = collections.get_mut(&kind) {
        rows.retain(|r| row_id(r) != Some(id));
    }
    if kind == EntityKind::Trip {
        for child in EntityKind::CHILDREN {
            if let Some(rows) = collections.get_mut(&child) {
                rows.retain(|r| r.get(TRIP_REF).and_then(Value::as_str) != Some(id));
            }
        }
    }
}

fn matches(row: &Row, filter: &Filter) -> bool {
    match filter {
        Filter::Trip(trip_id) => {
            row.get(TRIP_REF).and_then(Value::as_str) == Some(trip_id.as_str())
        }
        Filter::VisibleTo(user) => {
            let owner = row.get("owner_id").and_then(Value::as_str) == Some(user.as_str());
            let shared = row
                .get("shared_with")
                .and_then(Value::as_array)
                .is_some_and(|list| list.iter().any(|u| u.as_str() == Some(user.as_str())));
            owner || shared
        }
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (None | Some(Value::Null), Some(Value::Null) | None) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Greater,
        (_, None | Some(Value::Null)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

fn project(row: &Row, columns: Option<&[&str]>) -> Row {
    match columns {
        None => row.clone(),
        Some(cols) => row
            .iter()
            .filter(|(k, _)| cols.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    }
}

impl RemoteStore for MemoryRemoteStore {
    async fn get(
        &self,
        kind: EntityKind,
        id: &str,
        columns: Option<&'static [&'static str]>,
    ) -> RemoteResult<Option<Row>> {
        let mut inner = self.lock();
        let rows = inner.enter(kind)?;
        Ok(rows
            .iter()
            .find(|r| row_id(r) == Some(id))
            .map(|r| project(r, columns)))
    }

    async fn list(&self, kind: EntityKind, filter: &Filter) -> RemoteResult<Vec<Row>> {
        let mut inner = self.lock();
        let rows = inner.enter(kind)?;
        let mut out: Vec<Row> = rows.iter().filter(|r| matches(r, filter)).cloned().collect();
        // Stable sort keeps insertion order among equal keys.
        out.sort_by(|a, b| {
            kind.order_by()
                .iter()
                .map(|col| compare_values(a.get(*col), b.get(*col)))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        });
        Ok(out)
    }

    async fn insert(&self, kind: EntityKind, mut row: Row) -> RemoteResult<Row> {
        let mut inner = self.lock();
        inner.enter(kind)?;
        let id = inner.issue_id();
        row.insert("id".to_string(), Value::String(id));
        inner.collections.entry(kind).or_default().push(row.clone());
        Ok(row)
    }

    async fn update(&self, kind: EntityKind, id: &str, row: Row) -> RemoteResult<Row> {
        let mut inner = self.lock();
        let rows = inner.enter(kind)?;
        let Some(stored) = rows.iter_mut().find(|r| row_id(r) == Some(id)) else {
            return Err(RemoteError::status(404, format!("{kind} {id} not found")));
        };
        for (k, v) in row {
            if k != "id" {
                stored.insert(k, v);
            }
        }
        Ok(stored.clone())
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> RemoteResult<()> {
        let mut inner = self.lock();
        inner.enter(kind)?;
        remove_cascading(&mut inner.collections, kind, id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_insert_issues_queued_ids() {
        let store = MemoryRemoteStore::new();
        store.queue_ids(["T1"]);
        let stored = store
            .insert(EntityKind::Trip, row(json!({"title": "Rome"})))
            .await
            .unwrap();
        assert_eq!(stored["id"], json!("T1"));

        let generated = store
            .insert(EntityKind::Trip, row(json!({"title": "Oslo"})))
            .await
            .unwrap();
        assert_ne!(generated["id"], json!("T1"));
    }

    #[tokio::test]
    async fn test_list_filters_and_orders() {
        let store = MemoryRemoteStore::new();
        store.seed(EntityKind::Packing, row(json!({"id": "b", "trip_id": "T1", "order": 2})));
        store.seed(EntityKind::Packing, row(json!({"id": "a", "trip_id": "T1", "order": 1})));
        store.seed(EntityKind::Packing, row(json!({"id": "c", "trip_id": "T2", "order": 0})));

        let rows = store
            .list(EntityKind::Packing, &Filter::Trip("T1".into()))
            .await
            .unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!("a"), json!("b")]);
    }

    #[tokio::test]
    async fn test_visible_to_owner_or_shared() {
        let store = MemoryRemoteStore::new();
        store.seed(EntityKind::Trip, row(json!({"id": "T1", "owner_id": "alice", "shared_with": []})));
        store.seed(EntityKind::Trip, row(json!({"id": "T2", "owner_id": "carol", "shared_with": ["alice"]})));
        store.seed(EntityKind::Trip, row(json!({"id": "T3", "owner_id": "carol", "shared_with": []})));

        let rows = store
            .list(EntityKind::Trip, &Filter::VisibleTo("alice".into()))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_trip_delete_cascades() {
        let store = MemoryRemoteStore::new();
        store.seed(EntityKind::Trip, row(json!({"id": "T1"})));
        store.seed(EntityKind::Expense, row(json!({"id": "E1", "trip_id": "T1"})));
        store.delete(EntityKind::Trip, "T1").await.unwrap();
        assert!(store.rows(EntityKind::Expense).is_empty());
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemoryRemoteStore::new();
        store.fail(EntityKind::Expense, RemoteError::Transport("reset".into()));
        let err = store
            .list(EntityKind::Expense, &Filter::Trip("T1".into()))
            .await
            .unwrap_err();
        assert!(err.is_transport());
        assert!(store.list(EntityKind::Packing, &Filter::Trip("T1".into())).await.is_ok());
        assert_eq!(store.call_count(), 2);
    }

    #[tokio::test]
    async fn test_get_projects_columns() {
        let store = MemoryRemoteStore::new();
        store.seed(EntityKind::Trip, row(json!({"id": "T1", "title": "Rome", "owner_id": "a"})));
        let got = store
            .get(EntityKind::Trip, "T1", Some(&["id", "owner_id"]))
            .await
            .unwrap()
            .unwrap();
        assert!(got.get("title").is_none());
        assert_eq!(got["owner_id"], json!("a"));
    }
}
