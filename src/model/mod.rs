//! Data model for tripsync.
//!
//! - [`Key`] - tagged local/remote identity
//! - [`EntityKind`] - the six record kinds and their reference fields
//! - [`Record`] - an entity plus its identity and sync flag
//! - Entities: [`Trip`], [`Place`], [`ItineraryItem`], [`PackingItem`], [`Traveler`], [`Expense`]

mod expense;
mod itinerary;
mod key;
mod kind;
mod packing;
mod place;
mod traveler;
mod trip;
pub mod wire;

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use expense::Expense;
pub use itinerary::ItineraryItem;
pub use key::Key;
pub use kind::{map_refs, Arity, EntityKind, RefField, TRIP_REF};
pub use packing::PackingItem;
pub use place::Place;
pub use traveler::Traveler;
pub use trip::{Identity, Trip, TripMeta};

/// A record kind the engine can cache, sync and export.
pub trait Entity: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static {
    const KIND: EntityKind;

    /// Owning trip, `None` for trips themselves.
    fn trip_id(&self) -> Option<&Key>;

    /// Caller-maintained position within its list. Cached lists break ties
    /// on the document's `order` field.
    fn sort_order(&self) -> i64 {
        0
    }
}

/// An entity that belongs to a trip.
pub trait ChildEntity: Entity {
    fn set_trip_id(&mut self, trip: Key);
}

/// An entity together with its identity and sync state.
///
/// `key` is the remote key once one has been issued, the local key before
/// that. `local_id` is the cache row handle; it is `None` only for a remote
/// result that could not be written to the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<T> {
    pub key: Key,
    pub local_id: Option<i64>,
    pub is_synced: bool,
    #[serde(flatten)]
    pub fields: T,
}

impl<T> Record<T> {
    /// The remote key, if this record has been promoted.
    #[must_use]
    pub fn remote_id(&self) -> Option<&str> {
        self.key.remote_id()
    }
}
