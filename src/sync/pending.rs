//! Pending write flush.
//!
//! Retries queued remote deletes, then pushes every unsynced cached record,
//! parents before children so each promotion rewrites its dependents before
//! they are pushed.

use tracing::{debug, info, warn};

use crate::connectivity::Connectivity;
use crate::error::{Error, Result};
use crate::model::{Entity, Expense, ItineraryItem, PackingItem, Place, Traveler, Trip};
use crate::remote::{RemoteError, RemoteStore};
use crate::sync::engine::SyncEngine;
use crate::sync::types::FlushStats;

impl<R: RemoteStore, C: Connectivity> SyncEngine<R, C> {
    /// Push everything the cache holds that the remote store has not seen.
    ///
    /// # Errors
    ///
    /// Returns `Offline` when the remote store is unreachable, or a cache
    /// error. Per-record remote failures are counted, not returned.
    pub async fn flush_pending(&mut self) -> Result<FlushStats> {
        if !self.is_online().await {
            return Err(Error::Offline);
        }

        let mut stats = FlushStats::default();
        self.flush_deletions(&mut stats).await?;

        self.flush_kind::<Trip>(&mut stats).await?;
        self.flush_kind::<Place>(&mut stats).await?;
        self.flush_kind::<Traveler>(&mut stats).await?;
        self.flush_kind::<ItineraryItem>(&mut stats).await?;
        self.flush_kind::<PackingItem>(&mut stats).await?;
        self.flush_kind::<Expense>(&mut stats).await?;

        info!(
            pushed = stats.pushed(),
            deferred = stats.deferred.total(),
            failed = stats.failed.total(),
            deletes_applied = stats.deletes_applied,
            deletes_remaining = stats.deletes_remaining,
            "flushed pending writes"
        );
        Ok(stats)
    }

    async fn flush_deletions(&mut self, stats: &mut FlushStats) -> Result<()> {
        for pending in self.storage.pending_deletions()? {
            let result = self.remote.delete(pending.kind, &pending.remote_id).await;
            match result {
                Ok(()) | Err(RemoteError::Status { status: 404, .. }) => {
                    self.storage
                        .clear_deletion(pending.kind, &pending.remote_id, &self.actor)?;
                    // The local side may have failed alongside.
                    self.storage.evict(pending.kind, &pending.remote_id)?;
                    stats.deletes_applied += 1;
                }
                Err(e) => {
                    warn!(
                        kind = %pending.kind,
                        remote_id = %pending.remote_id,
                        attempts = pending.attempts + 1,
                        error = %e,
                        "queued delete still failing"
                    );
                    let message = e.to_string();
                    self.storage.queue_deletion(
                        pending.kind,
                        &pending.remote_id,
                        Some(&message),
                        &self.actor,
                    )?;
                    stats.deletes_remaining += 1;
                }
            }
        }
        Ok(())
    }

    async fn flush_kind<T: Entity>(&mut self, stats: &mut FlushStats) -> Result<()> {
        for record in self.storage.list_unsynced::<T>()? {
            let promoting = !record.key.is_remote();
            match self.repo::<T>().push(&record.key).await {
                Ok(pushed) if pushed.is_synced => {
                    if promoting {
                        stats.promoted.bump(T::KIND);
                    } else {
                        stats.updated.bump(T::KIND);
                    }
                }
                Ok(_) | Err(Error::Offline) => {
                    debug!(kind = %T::KIND, key = %record.key, "left unsynced");
                    stats.deferred.bump(T::KIND);
                }
                Err(Error::Remote(e)) => {
                    warn!(kind = %T::KIND, key = %record.key, error = %e, "remote rejected record");
                    stats.failed.bump(T::KIND);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
