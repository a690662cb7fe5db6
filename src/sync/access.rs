//! Access gate.
//!
//! Decides whether a caller may open a trip. The decision is always taken
//! on sharing metadata refreshed from the remote store in the same call;
//! the cached copy is only consulted when the remote store cannot be
//! reached.

use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use crate::connectivity::Connectivity;
use crate::error::{Error, Result};
use crate::model::{EntityKind, Identity, Key, Record, Trip};
use crate::remote::RemoteStore;
use crate::sync::engine::SyncEngine;

/// Where a denied caller is sent.
pub const DEFAULT_REDIRECT: &str = "/trips";

/// Why access was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// The caller neither owns the trip nor appears in its share list.
    NotShared,
    /// No such trip, remotely or in the cache.
    NotFound,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotShared => f.write_str("trip is not shared with you"),
            Self::NotFound => f.write_str("trip not found"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum AccessDecision {
    Allow {
        trip: Record<Trip>,
        /// False when the decision fell back to cached sharing data.
        fresh: bool,
    },
    Deny {
        redirect: String,
        reason: DenyReason,
    },
}

impl AccessDecision {
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }
}

#[derive(Debug, Clone)]
pub struct AccessGate {
    redirect: String,
}

impl Default for AccessGate {
    fn default() -> Self {
        Self::new(DEFAULT_REDIRECT)
    }
}

impl AccessGate {
    pub fn new(redirect: impl Into<String>) -> Self {
        Self {
            redirect: redirect.into(),
        }
    }

    fn deny(&self, reason: DenyReason) -> AccessDecision {
        AccessDecision::Deny {
            redirect: self.redirect.clone(),
            reason,
        }
    }

    /// Check `identity` against the owner and share list of `trip`.
    ///
    /// Sharing metadata of a remote trip is synchronized first. Offline,
    /// the cached metadata decides and the result is marked not fresh.
    ///
    /// # Errors
    ///
    /// Returns the remote store's rejection of the metadata fetch, or a
    /// cache error.
    pub async fn check<R: RemoteStore, C: Connectivity>(
        &self,
        engine: &mut SyncEngine<R, C>,
        identity: &Identity,
        trip: &Key,
    ) -> Result<AccessDecision> {
        let Some(key) = engine.storage.canonical_key(EntityKind::Trip, trip)? else {
            return Ok(self.deny(DenyReason::NotFound));
        };

        let (record, fresh) = match &key {
            Key::Local(_) => (engine.storage.get::<Trip>(&key)?, true),
            Key::Remote(id) => match engine.sync_metadata(id).await {
                Ok(record) => (record, true),
                Err(Error::Offline) => (engine.storage.get::<Trip>(&key)?, false),
                Err(Error::Remote(e)) if e.is_transport() => {
                    warn!(trip_id = %id, error = %e, "metadata sync failed, using cached sharing data");
                    (engine.storage.get::<Trip>(&key)?, false)
                }
                Err(e) => return Err(e),
            },
        };

        let Some(record) = record else {
            return Ok(self.deny(DenyReason::NotFound));
        };

        if record.fields.is_accessible_by(&identity.user_id) {
            Ok(AccessDecision::Allow {
                trip: record,
                fresh,
            })
        } else {
            info!(trip = %key, user = %identity.user_id, fresh, "access denied");
            Ok(self.deny(DenyReason::NotShared))
        }
    }
}
