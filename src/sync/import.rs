//! Portable trip import.
//!
//! Every imported record gets a fresh local key. Within one trip graph,
//! places and travelers are inserted first and their document tokens
//! mapped to the new keys; itinerary items, packing items and expenses are
//! then inserted with their references rewritten through that map. A
//! reference to a token the graph does not define is dropped.
//!
//! The whole document is written in one transaction: a malformed entity
//! anywhere leaves the cache untouched.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::Transaction;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::connectivity::Connectivity;
use crate::error::{Error, Result};
use crate::model::{
    wire, ChildEntity, EntityKind, Expense, Identity, ItineraryItem, Key, PackingItem, Place,
    Traveler, Trip, TRIP_REF,
};
use crate::remote::RemoteStore;
use crate::storage::events::EventType;
use crate::storage::{insert_row, CacheRow, MutationContext};
use crate::sync::engine::SyncEngine;
use crate::sync::export::{ExportDocument, ExportPayload, PortableEntity, TripGraph, FORMAT_VERSION};
use crate::sync::hash::content_hash;
use crate::sync::remap::{remap_refs, IdMap};
use crate::sync::types::ImportStats;

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidDocument(message.into())
}

/// Parse and validate an export document.
///
/// Accepts `data` as a single trip graph or an array of them. A `checksum`,
/// when present, must match the payload.
///
/// # Errors
///
/// Returns `InvalidDocument` describing the first problem found.
pub fn parse_document(text: &str) -> Result<ExportDocument> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| invalid(format!("not valid JSON: {e}")))?;
    let Value::Object(mut root) = value else {
        return Err(invalid("expected a JSON object at the top level"));
    };

    let version = root
        .get("version")
        .ok_or_else(|| invalid("missing version"))?
        .as_u64()
        .ok_or_else(|| invalid("version must be a positive integer"))?;
    if version == 0 || version > u64::from(FORMAT_VERSION) {
        return Err(invalid(format!(
            "unsupported version {version} (this build reads up to {FORMAT_VERSION})"
        )));
    }

    let exported_at = match root.get("exported_at") {
        None | Some(Value::Null) => Utc::now(),
        Some(raw) => serde_json::from_value::<DateTime<Utc>>(raw.clone())
            .map_err(|e| invalid(format!("exported_at: {e}")))?,
    };

    let data = root.remove("data").ok_or_else(|| invalid("missing data"))?;

    let checksum = match root.get("checksum") {
        None | Some(Value::Null) => None,
        Some(Value::String(expected)) => {
            let actual = content_hash(&data)?;
            if actual != *expected {
                return Err(invalid("checksum does not match data"));
            }
            Some(actual)
        }
        Some(_) => return Err(invalid("checksum must be a string")),
    };

    let data = match data {
        Value::Array(items) => ExportPayload::Many(
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| {
                    serde_json::from_value::<TripGraph>(item)
                        .map_err(|e| invalid(format!("data[{i}]: {e}")))
                })
                .collect::<Result<_>>()?,
        ),
        Value::Object(_) => ExportPayload::One(Box::new(
            serde_json::from_value(data).map_err(|e| invalid(format!("data: {e}")))?,
        )),
        _ => return Err(invalid("data must be a trip graph or an array of trip graphs")),
    };

    Ok(ExportDocument {
        version: FORMAT_VERSION,
        exported_at,
        checksum,
        data,
    })
}

/// Insert one child entity under `trip`, remapping its references.
fn import_child<T: ChildEntity>(
    tx: &Transaction,
    ctx: &mut MutationContext,
    entity: &PortableEntity,
    trip: &Key,
    ids: &IdMap,
    stats: &mut ImportStats,
) -> Result<Key> {
    let mut doc = entity.fields.clone();
    doc.remove(TRIP_REF);
    stats.dangling_dropped += remap_refs(T::KIND, &mut doc, ids);
    doc.insert(TRIP_REF.to_string(), trip.to_json());

    let fields: T = wire::from_document(doc)
        .map_err(|e| invalid(format!("{} {}: {e}", T::KIND, entity.id)))?;
    let key = Key::Local(insert_row(tx, &CacheRow::local(&fields)?)?);
    ctx.record_event(T::KIND, &key, EventType::RecordCreated);
    stats.created.bump(T::KIND);
    Ok(key)
}

/// Insert one trip graph. Returns the created keys in push order.
fn import_graph(
    tx: &Transaction,
    ctx: &mut MutationContext,
    graph: &TripGraph,
    owner: &Identity,
    stats: &mut ImportStats,
) -> Result<Vec<(EntityKind, Key)>> {
    let mut trip: Trip = wire::from_document(graph.trip.fields.clone())
        .map_err(|e| invalid(format!("trip {}: {e}", graph.trip.id)))?;
    trip.owner_id.clone_from(&owner.user_id);

    let trip_key = Key::Local(insert_row(tx, &CacheRow::local(&trip)?)?);
    ctx.record_event(EntityKind::Trip, &trip_key, EventType::RecordCreated);
    stats.created.bump(EntityKind::Trip);

    let mut ids = IdMap::new();
    let mut created = vec![(EntityKind::Trip, trip_key.clone())];

    // Places and travelers reference nothing but the trip.
    for place in &graph.places {
        let key = import_child::<Place>(tx, ctx, place, &trip_key, &ids, stats)?;
        ids.insert(EntityKind::Place, place.id.clone(), key.clone());
        created.push((EntityKind::Place, key));
    }
    for traveler in &graph.travelers {
        let key = import_child::<Traveler>(tx, ctx, traveler, &trip_key, &ids, stats)?;
        ids.insert(EntityKind::Traveler, traveler.id.clone(), key.clone());
        created.push((EntityKind::Traveler, key));
    }

    for item in &graph.itinerary {
        let key = import_child::<ItineraryItem>(tx, ctx, item, &trip_key, &ids, stats)?;
        created.push((EntityKind::Itinerary, key));
    }
    for item in &graph.packing {
        let key = import_child::<PackingItem>(tx, ctx, item, &trip_key, &ids, stats)?;
        created.push((EntityKind::Packing, key));
    }
    for expense in &graph.expenses {
        let key = import_child::<Expense>(tx, ctx, expense, &trip_key, &ids, stats)?;
        created.push((EntityKind::Expense, key));
    }

    ctx.record_note(
        EntityKind::Trip,
        &trip_key,
        EventType::GraphImported,
        &format!("from {}", graph.trip.id),
    );
    Ok(created)
}

impl<R: RemoteStore, C: Connectivity> SyncEngine<R, C> {
    /// Import a parsed document on behalf of `owner`, who becomes the owner
    /// of every imported trip.
    ///
    /// The graph is written locally first. With `push` set and the remote
    /// store reachable, the new records are then pushed; a failed push
    /// leaves them local and unsynced.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDocument` for an entity that does not decode, or a
    /// cache error. Nothing is written in either case.
    pub async fn import_document(
        &mut self,
        document: ExportDocument,
        owner: &Identity,
        push: bool,
    ) -> Result<ImportStats> {
        let graphs = document.data.into_graphs();
        let mut stats = ImportStats::default();

        let actor = self.actor.clone();
        let created = self.storage.mutate("import", &actor, |tx, ctx| {
            let mut created = Vec::new();
            for graph in &graphs {
                created.extend(import_graph(tx, ctx, graph, owner, &mut stats)?);
            }
            Ok(created)
        })?;

        info!(
            trips = stats.created.trips,
            records = stats.created.total(),
            dangling_dropped = stats.dangling_dropped,
            "imported trips"
        );

        if push && self.is_online().await {
            for (kind, key) in &created {
                match self.push_any(*kind, key).await {
                    Ok(true) => stats.pushed += 1,
                    Ok(false) => stats.unsynced += 1,
                    Err(e) => {
                        warn!(kind = %kind, key = %key, error = %e, "push after import failed");
                        stats.unsynced += 1;
                    }
                }
            }
        } else {
            debug!("import left local only");
            stats.unsynced = created.len();
        }

        Ok(stats)
    }

    /// Read, validate and import a document file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error, `InvalidDocument`, or a cache error.
    pub async fn import_file(
        &mut self,
        path: &Path,
        owner: &Identity,
        push: bool,
    ) -> Result<ImportStats> {
        let text = std::fs::read_to_string(path)?;
        let document = parse_document(&text)?;
        self.import_document(document, owner, push).await
    }

    /// Push one record of any kind. Returns whether it is now synced.
    async fn push_any(&mut self, kind: EntityKind, key: &Key) -> Result<bool> {
        Ok(match kind {
            EntityKind::Trip => self.repo::<Trip>().push(key).await?.is_synced,
            EntityKind::Place => self.repo::<Place>().push(key).await?.is_synced,
            EntityKind::Traveler => self.repo::<Traveler>().push(key).await?.is_synced,
            EntityKind::Itinerary => self.repo::<ItineraryItem>().push(key).await?.is_synced,
            EntityKind::Packing => self.repo::<PackingItem>().push(key).await?.is_synced,
            EntityKind::Expense => self.repo::<Expense>().push(key).await?.is_synced,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::ManualConnectivity;
    use crate::model::Record;
    use crate::remote::MemoryRemoteStore;
    use crate::storage::SqliteStorage;
    use crate::sync::export::Exporter;
    use serde_json::json;

    fn engine(online: bool) -> (
        SyncEngine<MemoryRemoteStore, ManualConnectivity>,
        MemoryRemoteStore,
    ) {
        let remote = MemoryRemoteStore::new();
        let engine = SyncEngine::new(
            remote.clone(),
            ManualConnectivity::new(online),
            SqliteStorage::open_memory().unwrap(),
        );
        (engine, remote)
    }

    fn doc(data: &Value) -> String {
        json!({"version": 1, "exported_at": "2026-05-01T10:00:00Z", "data": data}).to_string()
    }

    fn trip_json() -> Value {
        json!({"id": "t", "title": "Rome", "owner_id": "someone", "updated_at": "2026-05-01T00:00:00Z"})
    }

    #[test]
    fn test_parse_rejects_malformed_documents() {
        let cases = [
            ("[]", "top level"),
            ("{\"data\": {}}", "missing version"),
            ("{\"version\": \"1\", \"data\": {}}", "positive integer"),
            ("{\"version\": 9, \"data\": {}}", "unsupported version"),
            ("{\"version\": 1}", "missing data"),
            ("{\"version\": 1, \"data\": 3}", "trip graph"),
            ("{\"version\": 1, \"data\": {\"places\": []}}", "data:"),
            ("not json", "not valid JSON"),
        ];
        for (text, needle) in cases {
            let err = parse_document(text).unwrap_err();
            assert!(
                matches!(&err, Error::InvalidDocument(m) if m.contains(needle)),
                "{text}: {err}"
            );
        }
    }

    #[test]
    fn test_parse_accepts_single_and_array() {
        let single = parse_document(&doc(&json!({"trip": trip_json()}))).unwrap();
        assert_eq!(single.data.into_graphs().len(), 1);

        let many =
            parse_document(&doc(&json!([{"trip": trip_json()}, {"trip": trip_json()}]))).unwrap();
        assert_eq!(many.data.into_graphs().len(), 2);
    }

    #[test]
    fn test_parse_checks_checksum() {
        let data = json!({"trip": trip_json()});
        let good = json!({"version": 1, "checksum": content_hash(&data).unwrap(), "data": data});
        assert!(parse_document(&good.to_string()).is_ok());

        let bad = json!({"version": 1, "checksum": "00", "data": data});
        let err = parse_document(&bad.to_string()).unwrap_err();
        assert!(matches!(err, Error::InvalidDocument(m) if m.contains("checksum")));
    }

    #[tokio::test]
    async fn test_dangling_payer_is_dropped() {
        let (mut engine, _) = engine(false);
        let text = doc(&json!({
            "trip": trip_json(),
            "travelers": [{"id": "v1", "name": "Ana"}],
            "expenses": [{
                "id": "e1",
                "title": "Dinner",
                "amount": 50.0,
                "payer_id": "v-missing",
                "charged_to": ["v1", "v-missing"],
            }],
        }));

        let stats = engine
            .import_document(parse_document(&text).unwrap(), &Identity::new("alice"), true)
            .await
            .unwrap();
        assert_eq!(stats.created.total(), 3);
        assert_eq!(stats.dangling_dropped, 2);
        assert_eq!(stats.unsynced, 3);

        let trip = engine.storage().list_trips().unwrap().remove(0);
        assert_eq!(trip.fields.owner_id, "alice");
        let contents = engine.cached_contents(&trip.key).unwrap();
        let expense = &contents.expenses[0].fields;
        assert_eq!(expense.payer_id, None);
        assert_eq!(expense.charged_to, vec![contents.travelers[0].key.clone()]);
    }

    #[tokio::test]
    async fn test_invalid_entity_writes_nothing() {
        let (mut engine, _) = engine(false);
        let text = doc(&json!([
            {"trip": trip_json(), "packing": [{"id": "p", "title": "Hat", "order": 0}]},
            {"trip": trip_json(), "packing": [{"id": "p", "order": 0}]},
        ]));
        let err = engine
            .import_document(parse_document(&text).unwrap(), &Identity::new("alice"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidDocument(m) if m.contains("packing p")));
        assert!(engine.storage().list_trips().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_round_trip_reproduces_graph() {
        let (mut source, _) = engine(false);
        let alice = Identity::new("alice");
        let trip = source.trips().create(Trip::new("Lisbon", "alice")).await.unwrap();
        let place = source
            .places()
            .add(&trip.key, Place::new(Key::Local(0), "Belém Tower"))
            .await
            .unwrap();
        let mut visit = ItineraryItem::new(Key::Local(0), 1, "Tower visit", 0);
        visit.place_id = Some(place.key.clone());
        source.itinerary().add(&trip.key, visit).await.unwrap();
        let ana = source
            .travelers()
            .add(&trip.key, Traveler::new(Key::Local(0), "Ana"))
            .await
            .unwrap();
        let ben = source
            .travelers()
            .add(&trip.key, Traveler::new(Key::Local(0), "Ben"))
            .await
            .unwrap();
        let mut dinner = Expense::new(Key::Local(0), "Dinner", 64.5);
        dinner.payer_id = Some(ben.key.clone());
        dinner.charged_to = vec![ana.key.clone(), ben.key.clone()];
        source.expenses().add(&trip.key, dinner).await.unwrap();

        let (document, _) = Exporter::new(source.storage()).export(&[trip.key.clone()]).unwrap();
        let text = serde_json::to_string(&document).unwrap();

        let (mut target, _) = engine(false);
        target
            .import_document(parse_document(&text).unwrap(), &alice, false)
            .await
            .unwrap();

        let imported: Record<Trip> = target.storage().list_trips().unwrap().remove(0);
        assert_eq!(imported.fields, trip.fields);

        let got = target.cached_contents(&imported.key).unwrap();
        assert_eq!(got.places[0].fields.name, "Belém Tower");
        assert_eq!(got.itinerary[0].fields.place_id, Some(got.places[0].key.clone()));

        let by_name = |name: &str| {
            got.travelers
                .iter()
                .find(|t| t.fields.name == name)
                .map(|t| t.key.clone())
                .unwrap()
        };
        let expense = &got.expenses[0].fields;
        assert_eq!(expense.amount, 64.5);
        assert_eq!(expense.payer_id, Some(by_name("Ben")));
        assert_eq!(expense.charged_to, vec![by_name("Ana"), by_name("Ben")]);
        assert!(got.expenses.iter().all(|e| e.fields.trip_id == imported.key));
    }

    #[tokio::test]
    async fn test_import_pushes_when_online() {
        let (mut engine, remote) = engine(true);
        remote.queue_ids(["T1", "V1", "E1"]);
        let text = doc(&json!({
            "trip": trip_json(),
            "travelers": [{"id": "v1", "name": "Ana"}],
            "expenses": [{"id": "e1", "title": "Taxi", "amount": 9.0, "payer_id": "v1"}],
        }));

        let stats = engine
            .import_file_text(&text, &Identity::new("alice"))
            .await;
        assert_eq!(stats.pushed, 3);
        assert_eq!(stats.unsynced, 0);
        assert_eq!(
            remote.row(EntityKind::Expense, "E1").unwrap()["payer_id"],
            json!("V1")
        );
        assert_eq!(
            remote.row(EntityKind::Trip, "T1").unwrap()["owner_id"],
            json!("alice")
        );
    }

    impl SyncEngine<MemoryRemoteStore, ManualConnectivity> {
        async fn import_file_text(&mut self, text: &str, owner: &Identity) -> ImportStats {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("import.json");
            std::fs::write(&path, text).unwrap();
            self.import_file(&path, owner, true).await.unwrap()
        }
    }
}
