use serde::{Deserialize, Serialize};

use super::{ChildEntity, Entity, EntityKind, Key};

/// A packing checklist entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackingItem {
    pub trip_id: Key,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub order: i64,
}

impl PackingItem {
    pub fn new(trip_id: Key, title: impl Into<String>, order: i64) -> Self {
        Self {
            trip_id,
            title: title.into(),
            completed: false,
            color: None,
            order,
        }
    }
}

impl Entity for PackingItem {
    const KIND: EntityKind = EntityKind::Packing;

    fn trip_id(&self) -> Option<&Key> {
        Some(&self.trip_id)
    }

    fn sort_order(&self) -> i64 {
        self.order
    }
}

impl ChildEntity for PackingItem {
    fn set_trip_id(&mut self, trip: Key) {
        self.trip_id = trip;
    }
}
