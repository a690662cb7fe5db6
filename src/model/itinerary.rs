use serde::{Deserialize, Serialize};

use super::{ChildEntity, Entity, EntityKind, Key};

/// One stop on a day of the trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItineraryItem {
    pub trip_id: Key,
    /// Zero-based day within the trip.
    pub day_index: i32,
    pub title: String,
    /// Wall-clock time as entered, e.g. `09:30`.
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(default)]
    pub map_link: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub place_name: Option<String>,
    #[serde(default)]
    pub place_id: Option<Key>,
    #[serde(default)]
    pub order: i64,
}

impl ItineraryItem {
    pub fn new(trip_id: Key, day_index: i32, title: impl Into<String>, order: i64) -> Self {
        Self {
            trip_id,
            day_index,
            title: title.into(),
            time: None,
            url: None,
            remark: None,
            map_link: None,
            lat: None,
            lng: None,
            place_name: None,
            place_id: None,
            order,
        }
    }
}

impl Entity for ItineraryItem {
    const KIND: EntityKind = EntityKind::Itinerary;

    fn trip_id(&self) -> Option<&Key> {
        Some(&self.trip_id)
    }

    // Position within the day breaks ties through the cached `order` field.
    fn sort_order(&self) -> i64 {
        i64::from(self.day_index)
    }
}

impl ChildEntity for ItineraryItem {
    fn set_trip_id(&mut self, trip: Key) {
        self.trip_id = trip;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_order_groups_by_day() {
        let late_day_one = ItineraryItem::new(Key::Local(1), 0, "Museum", 5_000_000);
        let early_day_two = ItineraryItem::new(Key::Local(1), 1, "Train", 0);
        assert!(late_day_one.sort_order() < early_day_two.sort_order());
    }
}
