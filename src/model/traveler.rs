use serde::{Deserialize, Serialize};

use super::{ChildEntity, Entity, EntityKind, Key};

/// Someone travelling on the trip. Expenses are paid by and charged to travelers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Traveler {
    pub trip_id: Key,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

impl Traveler {
    pub fn new(trip_id: Key, name: impl Into<String>) -> Self {
        Self {
            trip_id,
            name: name.into(),
            email: None,
            icon: None,
        }
    }
}

impl Entity for Traveler {
    const KIND: EntityKind = EntityKind::Traveler;

    fn trip_id(&self) -> Option<&Key> {
        Some(&self.trip_id)
    }
}

impl ChildEntity for Traveler {
    fn set_trip_id(&mut self, trip: Key) {
        self.trip_id = trip;
    }
}
