//! Portable trip export.
//!
//! # Document format
//!
//! ```json
//! {
//!   "version": 1,
//!   "exported_at": "2026-05-01T10:00:00Z",
//!   "checksum": "<sha256 of data>",
//!   "data": { "trip": {...}, "places": [...], "itinerary": [...],
//!             "packing": [...], "travelers": [...], "expenses": [...] }
//! }
//! ```
//!
//! `data` is a single trip graph or an array of them. Every entity carries
//! an opaque `id` token that is only meaningful inside the document; cross
//! references (`place_id`, `payer_id`, `charged_to`) hold those tokens. The
//! owning trip is implied by nesting, so children carry no `trip_id`.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::error::{Error, Result};
use crate::model::{
    map_refs, wire, Entity, Expense, ItineraryItem, Key, PackingItem, Place, Record, Traveler,
    Trip, TRIP_REF,
};
use crate::storage::SqliteStorage;
use crate::sync::file::atomic_write;
use crate::sync::hash::content_hash;
use crate::sync::types::ExportStats;

/// Current document format version.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDocument {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    pub data: ExportPayload,
}

/// One trip graph or several.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExportPayload {
    Many(Vec<TripGraph>),
    One(Box<TripGraph>),
}

impl ExportPayload {
    #[must_use]
    pub fn into_graphs(self) -> Vec<TripGraph> {
        match self {
            Self::Many(graphs) => graphs,
            Self::One(graph) => vec![*graph],
        }
    }
}

/// A trip with all of its children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripGraph {
    pub trip: PortableEntity,
    #[serde(default)]
    pub places: Vec<PortableEntity>,
    #[serde(default)]
    pub itinerary: Vec<PortableEntity>,
    #[serde(default)]
    pub packing: Vec<PortableEntity>,
    #[serde(default)]
    pub travelers: Vec<PortableEntity>,
    #[serde(default)]
    pub expenses: Vec<PortableEntity>,
}

/// An entity's semantic fields plus its document-local token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortableEntity {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

fn portable<T: Entity>(record: &Record<T>) -> Result<PortableEntity> {
    let mut fields = wire::to_document(&record.fields)?;
    fields.remove(TRIP_REF);
    map_refs(T::KIND, &mut fields, |_, value| {
        Key::from_json(&value).map(|key| Value::String(key.to_string()))
    });
    Ok(PortableEntity {
        id: record.key.to_string(),
        fields,
    })
}

/// Checksum of a payload as it reads back from JSON.
///
/// # Errors
///
/// Returns an error if the payload cannot be serialized.
pub fn payload_checksum(data: &ExportPayload) -> Result<String> {
    Ok(content_hash(&serde_json::to_value(data)?)?)
}

fn portable_all<T: Entity>(records: &[Record<T>]) -> Result<Vec<PortableEntity>> {
    records.iter().map(portable).collect()
}

/// Exporter for trip graphs held in the local cache.
pub struct Exporter<'a> {
    storage: &'a SqliteStorage,
}

impl<'a> Exporter<'a> {
    #[must_use]
    pub fn new(storage: &'a SqliteStorage) -> Self {
        Self { storage }
    }

    /// Build the graph of one cached trip.
    ///
    /// # Errors
    ///
    /// Returns `TripNotFound` if the trip is not cached.
    pub fn graph(&self, trip: &Key) -> Result<(TripGraph, ExportStats)> {
        let record = self
            .storage
            .get::<Trip>(trip)?
            .ok_or_else(|| Error::TripNotFound {
                key: trip.to_string(),
            })?;
        let key = &record.key;

        let places: Vec<Record<Place>> = self.storage.list_children(key)?;
        let itinerary: Vec<Record<ItineraryItem>> = self.storage.list_children(key)?;
        let packing: Vec<Record<PackingItem>> = self.storage.list_children(key)?;
        let travelers: Vec<Record<Traveler>> = self.storage.list_children(key)?;
        let expenses: Vec<Record<Expense>> = self.storage.list_children(key)?;

        let mut stats = ExportStats::default();
        stats.exported.trips = 1;
        stats.exported.places = places.len();
        stats.exported.itinerary = itinerary.len();
        stats.exported.packing = packing.len();
        stats.exported.travelers = travelers.len();
        stats.exported.expenses = expenses.len();

        let graph = TripGraph {
            trip: portable(&record)?,
            places: portable_all(&places)?,
            itinerary: portable_all(&itinerary)?,
            packing: portable_all(&packing)?,
            travelers: portable_all(&travelers)?,
            expenses: portable_all(&expenses)?,
        };
        Ok((graph, stats))
    }

    /// Export the given trips, or every cached trip if `trips` is empty.
    ///
    /// A single requested trip is exported as a single graph, anything else
    /// as an array.
    ///
    /// # Errors
    ///
    /// Returns `TripNotFound` for a trip that is not cached.
    pub fn export(&self, trips: &[Key]) -> Result<(ExportDocument, ExportStats)> {
        let keys: Vec<Key> = if trips.is_empty() {
            self.storage
                .list_trips()?
                .into_iter()
                .map(|t| t.key)
                .collect()
        } else {
            trips.to_vec()
        };

        let mut stats = ExportStats::default();
        let mut graphs = Vec::with_capacity(keys.len());
        for key in &keys {
            let (graph, graph_stats) = self.graph(key)?;
            for kind in crate::model::EntityKind::ALL {
                stats
                    .exported
                    .set(kind, stats.exported.get(kind) + graph_stats.exported.get(kind));
            }
            graphs.push(graph);
        }

        let data = if trips.len() == 1 && graphs.len() == 1 {
            ExportPayload::One(Box::new(graphs.remove(0)))
        } else {
            ExportPayload::Many(graphs)
        };
        let checksum = payload_checksum(&data)?;
        stats.checksum.clone_from(&checksum);

        Ok((
            ExportDocument {
                version: FORMAT_VERSION,
                exported_at: Utc::now(),
                checksum: Some(checksum),
                data,
            },
            stats,
        ))
    }

    /// Export to a file, replacing it atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if a trip is missing or the file cannot be written.
    pub fn export_to(&self, trips: &[Key], path: &Path) -> Result<ExportStats> {
        let (document, stats) = self.export(trips)?;
        let json = serde_json::to_string_pretty(&document)?;
        atomic_write(path, &json)?;
        info!(
            path = %path.display(),
            trips = stats.exported.trips,
            records = stats.exported.total(),
            "exported trips"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded() -> (SqliteStorage, Key) {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let trip = storage.insert_local(&Trip::new("Lisbon", "alice"), "t").unwrap();
        let ana = storage
            .insert_local(&Traveler::new(trip.key.clone(), "Ana"), "t")
            .unwrap();
        let mut expense = Expense::new(trip.key.clone(), "Tram", 3.0);
        expense.payer_id = Some(ana.key.clone());
        expense.charged_to = vec![ana.key.clone()];
        storage.insert_local(&expense, "t").unwrap();
        storage
            .insert_local(&PackingItem::new(trip.key.clone(), "Sunscreen", 0), "t")
            .unwrap();
        (storage, trip.key)
    }

    #[test]
    fn test_export_single_trip_strips_internal_keys() {
        let (storage, trip) = seeded();
        let (doc, stats) = Exporter::new(&storage).export(&[trip]).unwrap();
        assert_eq!(doc.version, FORMAT_VERSION);
        assert_eq!(stats.exported.total(), 4);

        let ExportPayload::One(graph) = &doc.data else {
            panic!("expected a single graph");
        };
        assert_eq!(graph.trip.fields["title"], json!("Lisbon"));
        assert!(!graph.packing[0].fields.contains_key("trip_id"));

        let traveler = &graph.travelers[0].id;
        let expense = &graph.expenses[0].fields;
        assert_eq!(&expense["payer_id"], &json!(traveler));
        assert_eq!(expense["charged_to"], json!([traveler]));
    }

    #[test]
    fn test_export_all_is_array_with_checksum() {
        let (mut storage, _) = seeded();
        storage.insert_local(&Trip::new("Porto", "alice"), "t").unwrap();

        let (doc, stats) = Exporter::new(&storage).export(&[]).unwrap();
        let ExportPayload::Many(graphs) = &doc.data else {
            panic!("expected an array");
        };
        assert_eq!(graphs.len(), 2);
        assert_eq!(stats.exported.trips, 2);
        assert_eq!(doc.checksum.as_deref(), Some(payload_checksum(&doc.data).unwrap().as_str()));
    }

    #[test]
    fn test_export_missing_trip() {
        let (storage, _) = seeded();
        let err = Exporter::new(&storage).export(&[Key::remote("nope")]).unwrap_err();
        assert!(matches!(err, Error::TripNotFound { .. }));
    }

    #[test]
    fn test_export_to_file() {
        let (storage, trip) = seeded();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lisbon.json");

        let stats = Exporter::new(&storage).export_to(&[trip], &path).unwrap();
        let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["version"], json!(1));
        assert_eq!(written["checksum"], json!(stats.checksum));
    }
}
