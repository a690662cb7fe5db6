use serde::{Deserialize, Serialize};

use super::{ChildEntity, Entity, EntityKind, Key};

/// A saved location that itinerary items can point at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub trip_id: Key,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

impl Place {
    pub fn new(trip_id: Key, name: impl Into<String>) -> Self {
        Self {
            trip_id,
            name: name.into(),
            address: None,
            lat: None,
            lng: None,
        }
    }
}

impl Entity for Place {
    const KIND: EntityKind = EntityKind::Place;

    fn trip_id(&self) -> Option<&Key> {
        Some(&self.trip_id)
    }
}

impl ChildEntity for Place {
    fn set_trip_id(&mut self, trip: Key) {
        self.trip_id = trip;
    }
}
