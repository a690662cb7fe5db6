//! Entity kinds and their reference fields.
//!
//! Each kind declares which of its fields point at other records. Wire
//! conversion, export tokens, import remapping, promotion rewrites and
//! reference scrubbing all walk this one table.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the owning-trip reference on every child entity.
pub const TRIP_REF: &str = "trip_id";

/// The six record kinds the engine manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Trip,
    Place,
    Itinerary,
    Packing,
    Traveler,
    Expense,
}

/// How many targets a reference field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly one key, never null.
    Required,
    /// A key or null.
    Optional,
    /// An array of keys.
    Many,
}

/// A field holding a reference to another record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefField {
    pub name: &'static str,
    pub target: EntityKind,
    pub arity: Arity,
}

const TRIP_FIELD: RefField = RefField {
    name: TRIP_REF,
    target: EntityKind::Trip,
    arity: Arity::Required,
};

impl EntityKind {
    /// Every kind, parents first.
    pub const ALL: [Self; 6] = [
        Self::Trip,
        Self::Place,
        Self::Traveler,
        Self::Itinerary,
        Self::Packing,
        Self::Expense,
    ];

    /// Child kinds in dependency order: places and travelers have no
    /// intra-trip references, itinerary and expenses point at them.
    pub const CHILDREN: [Self; 5] = [
        Self::Place,
        Self::Traveler,
        Self::Itinerary,
        Self::Packing,
        Self::Expense,
    ];

    /// Local cache table name.
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::Trip => "trips",
            Self::Place => "places",
            Self::Itinerary => "itinerary",
            Self::Packing => "packing",
            Self::Traveler => "travelers",
            Self::Expense => "expenses",
        }
    }

    /// Remote collection name.
    #[must_use]
    pub const fn collection(self) -> &'static str {
        self.table()
    }

    /// Reference fields declared by this kind.
    #[must_use]
    pub const fn ref_fields(self) -> &'static [RefField] {
        match self {
            Self::Trip => &[],
            Self::Place | Self::Packing | Self::Traveler => &[TRIP_FIELD],
            Self::Itinerary => &[
                TRIP_FIELD,
                RefField {
                    name: "place_id",
                    target: Self::Place,
                    arity: Arity::Optional,
                },
            ],
            Self::Expense => &[
                TRIP_FIELD,
                RefField {
                    name: "payer_id",
                    target: Self::Traveler,
                    arity: Arity::Optional,
                },
                RefField {
                    name: "charged_to",
                    target: Self::Traveler,
                    arity: Arity::Many,
                },
            ],
        }
    }

    /// Remote ordering columns for list queries.
    #[must_use]
    pub const fn order_by(self) -> &'static [&'static str] {
        match self {
            Self::Itinerary => &["day_index", "order"],
            Self::Packing => &["order"],
            Self::Trip => &["start_date"],
            Self::Place | Self::Traveler | Self::Expense => &[],
        }
    }

    #[must_use]
    pub const fn is_child(self) -> bool {
        !matches!(self, Self::Trip)
    }

    /// Kinds holding a non-trip reference to this kind.
    #[must_use]
    pub const fn referenced_by(self) -> &'static [Self] {
        match self {
            Self::Place => &[Self::Itinerary],
            Self::Traveler => &[Self::Expense],
            Self::Trip => &[
                Self::Place,
                Self::Traveler,
                Self::Itinerary,
                Self::Packing,
                Self::Expense,
            ],
            Self::Itinerary | Self::Packing | Self::Expense => &[],
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trip => "trip",
            Self::Place => "place",
            Self::Itinerary => "itinerary",
            Self::Packing => "packing",
            Self::Traveler => "traveler",
            Self::Expense => "expense",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trip" | "trips" => Ok(Self::Trip),
            "place" | "places" => Ok(Self::Place),
            "itinerary" => Ok(Self::Itinerary),
            "packing" => Ok(Self::Packing),
            "traveler" | "travelers" => Ok(Self::Traveler),
            "expense" | "expenses" => Ok(Self::Expense),
            _ => Err(format!("Unknown entity kind: {s}")),
        }
    }
}

/// Rewrite every reference in a serialized entity document.
///
/// `f` receives the field descriptor and the current value and returns the
/// replacement. Returning `None` drops the reference: optional fields become
/// null and the element is removed from arrays. Null optional references are
/// not passed to `f`.
pub fn map_refs<F>(kind: EntityKind, doc: &mut Map<String, Value>, mut f: F)
where
    F: FnMut(&RefField, Value) -> Option<Value>,
{
    for field in kind.ref_fields() {
        let Some(slot) = doc.get_mut(field.name) else {
            continue;
        };
        match field.arity {
            Arity::Many => {
                *slot = match slot.take() {
                    Value::Array(items) => {
                        Value::Array(items.into_iter().filter_map(|v| f(field, v)).collect())
                    }
                    Value::Null => Value::Array(Vec::new()),
                    other => other,
                };
            }
            Arity::Required | Arity::Optional => {
                if slot.is_null() {
                    continue;
                }
                let current = slot.take();
                *slot = f(field, current).unwrap_or(Value::Null);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_map_refs_drops_and_rewrites() {
        let mut doc = json!({
            "trip_id": {"local": 1},
            "title": "Dinner",
            "payer_id": {"local": 5},
            "charged_to": [{"local": 5}, {"local": 6}],
        })
        .as_object()
        .cloned()
        .unwrap();

        map_refs(EntityKind::Expense, &mut doc, |field, value| {
            if field.target == EntityKind::Trip {
                return Some(json!({"remote": "T1"}));
            }
            (value == json!({"local": 6})).then(|| json!({"remote": "P6"}))
        });

        assert_eq!(doc["trip_id"], json!({"remote": "T1"}));
        assert_eq!(doc["payer_id"], Value::Null);
        assert_eq!(doc["charged_to"], json!([{"remote": "P6"}]));
        assert_eq!(doc["title"], json!("Dinner"));
    }

    #[test]
    fn test_map_refs_skips_null_optional() {
        let mut doc = json!({"trip_id": {"local": 1}, "place_id": null})
            .as_object()
            .cloned()
            .unwrap();
        let mut seen = Vec::new();
        map_refs(EntityKind::Itinerary, &mut doc, |field, value| {
            seen.push(field.name);
            Some(value)
        });
        assert_eq!(seen, vec![TRIP_REF]);
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
            assert_eq!(kind.table().parse::<EntityKind>().unwrap(), kind);
        }
        assert!(EntityKind::Packing.is_child());
        assert!(!EntityKind::Trip.is_child());
    }
}
