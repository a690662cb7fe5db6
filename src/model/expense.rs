use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ChildEntity, Entity, EntityKind, Key};

/// A shared cost, paid by one traveler and charged to a set of travelers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub trip_id: Key,
    pub title: String,
    pub amount: f64,
    #[serde(default)]
    pub payer_id: Option<Key>,
    #[serde(default)]
    pub charged_to: Vec<Key>,
    #[serde(default)]
    pub datetime: Option<DateTime<Utc>>,
}

impl Expense {
    pub fn new(trip_id: Key, title: impl Into<String>, amount: f64) -> Self {
        Self {
            trip_id,
            title: title.into(),
            amount,
            payer_id: None,
            charged_to: Vec::new(),
            datetime: None,
        }
    }
}

impl Entity for Expense {
    const KIND: EntityKind = EntityKind::Expense;

    fn trip_id(&self) -> Option<&Key> {
        Some(&self.trip_id)
    }
}

impl ChildEntity for Expense {
    fn set_trip_id(&mut self, trip: Key) {
        self.trip_id = trip;
    }
}
