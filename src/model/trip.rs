//! Trips, their sharing metadata, and caller identity.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::{Entity, EntityKind, Key};

/// Nullable remote columns read as their empty value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A planned trip. Root of the entity graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub title: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_public: bool,
    pub owner_id: String,
    /// User ids the owner shared this trip with.
    #[serde(default, deserialize_with = "null_as_default")]
    pub shared_with: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    /// Create a private trip owned by `owner_id`.
    pub fn new(title: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            start_date: None,
            end_date: None,
            is_public: false,
            owner_id: owner_id.into(),
            shared_with: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Whether `user_id` owns this trip or appears in its share list.
    #[must_use]
    pub fn is_accessible_by(&self, user_id: &str) -> bool {
        self.owner_id == user_id || self.shared_with.iter().any(|u| u == user_id)
    }

    #[must_use]
    pub fn metadata(&self) -> TripMeta {
        TripMeta {
            owner_id: self.owner_id.clone(),
            shared_with: self.shared_with.clone(),
            is_public: self.is_public,
            updated_at: self.updated_at,
        }
    }

    /// Overwrite ownership, sharing and timestamp fields, keeping the rest.
    pub fn apply_metadata(&mut self, meta: TripMeta) {
        self.owner_id = meta.owner_id;
        self.shared_with = meta.shared_with;
        self.is_public = meta.is_public;
        self.updated_at = meta.updated_at;
    }
}

impl Entity for Trip {
    const KIND: EntityKind = EntityKind::Trip;

    fn trip_id(&self) -> Option<&Key> {
        None
    }
}

/// Ownership, sharing and timestamp fields of a trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripMeta {
    pub owner_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub shared_with: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_public: bool,
    pub updated_at: DateTime<Utc>,
}

impl TripMeta {
    /// Remote columns selected by a metadata-only fetch.
    pub const COLUMNS: &'static [&'static str] =
        &["id", "owner_id", "shared_with", "is_public", "updated_at"];
}

/// The caller on whose behalf an operation runs.
///
/// Passed explicitly into access checks and trip listing; never read from
/// ambient state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}
