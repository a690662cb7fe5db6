//! Trip metadata synchronizer.
//!
//! Refreshes only the ownership, sharing and timestamp fields of one trip.
//! Runs before any access decision so that a revoked share is seen before
//! cached content is shown.

use tracing::{debug, info};

use crate::connectivity::Connectivity;
use crate::error::{Error, Result};
use crate::model::{wire, EntityKind, Record, Trip, TripMeta};
use crate::remote::{RemoteError, RemoteStore};
use crate::sync::engine::SyncEngine;

impl<R: RemoteStore, C: Connectivity> SyncEngine<R, C> {
    /// Pull the sharing metadata of one trip into the cache.
    ///
    /// Other cached trip fields are left alone. A trip that is not cached
    /// yet is fetched whole. Returns `None` when the remote store no longer
    /// has the trip; the cached copy is evicted in that case.
    ///
    /// # Errors
    ///
    /// Returns `Offline` when the remote store is unreachable, or the remote
    /// store's error. The cache is untouched on error.
    pub async fn sync_metadata(&mut self, trip_id: &str) -> Result<Option<Record<Trip>>> {
        if !self.is_online().await {
            return Err(Error::Offline);
        }

        let Some(mut row) = self
            .remote
            .get(EntityKind::Trip, trip_id, Some(TripMeta::COLUMNS))
            .await?
        else {
            debug!(trip_id, "trip gone remotely, evicting");
            self.storage.evict(EntityKind::Trip, trip_id)?;
            return Ok(None);
        };

        row.remove("id");
        let meta: TripMeta = serde_json::from_value(row.into())
            .map_err(|e| RemoteError::Decode(format!("trip metadata: {e}")))?;

        if let Some(record) = self
            .storage
            .apply_trip_metadata(trip_id, &meta, &self.actor)?
        {
            debug!(trip_id, shared = record.fields.shared_with.len(), "metadata synced");
            return Ok(Some(record));
        }

        let Some(full) = self.remote.get(EntityKind::Trip, trip_id, None).await? else {
            return Ok(None);
        };
        let (remote_id, trip) = wire::from_remote_row::<Trip>(full)?;
        let record = self.storage.put_synced(&remote_id, &trip)?;
        info!(trip_id, "cached trip on first metadata sync");
        Ok(Some(record))
    }
}
