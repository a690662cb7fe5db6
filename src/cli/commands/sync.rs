//! Sync command implementations.
//!
//! `flush` pushes everything written while offline. `trip` and `metadata`
//! pull one trip's remote state into the cache.

use colored::Colorize;

use super::{print_json, runtime, Context};
use crate::cli::SyncCommands;
use crate::error::{Error, Result};
use crate::sync::count_lines;

/// Execute sync commands.
///
/// # Errors
///
/// Returns `Offline` if the remote store is unreachable, or the error of
/// the failed sync step.
pub fn execute(command: &SyncCommands, ctx: &Context, json: bool) -> Result<()> {
    match command {
        SyncCommands::Flush => flush(ctx, json),
        SyncCommands::Trip { trip } => reconcile(ctx, trip, json),
        SyncCommands::Metadata { trip } => metadata(ctx, trip, json),
    }
}

/// Strip an optional `remote:` prefix; local keys cannot be synced.
fn remote_trip_id(value: &str) -> Result<&str> {
    if value.starts_with("local:") {
        return Err(Error::InvalidArgument(format!(
            "{value} has not been pushed yet; run `tripsync sync flush` first"
        )));
    }
    let id = value.strip_prefix("remote:").unwrap_or(value).trim();
    if id.is_empty() {
        return Err(Error::InvalidArgument("trip id cannot be empty".into()));
    }
    Ok(id)
}

fn flush(ctx: &Context, json: bool) -> Result<()> {
    let mut engine = ctx.engine()?;
    let rt = runtime()?;
    let stats = rt.block_on(async { engine.flush_pending().await })?;

    if json {
        return print_json(&serde_json::json!({
            "success": stats.is_clean(),
            "stats": stats,
        }));
    }

    if stats.pushed() == 0 && stats.deletes_applied == 0 && stats.is_clean() {
        println!("Nothing to push.");
        return Ok(());
    }

    println!("Flush complete");
    println!();
    if stats.promoted.total() > 0 {
        println!("{}", "Created remotely:".green().bold());
        for line in count_lines(&stats.promoted) {
            println!("{line}");
        }
    }
    if stats.updated.total() > 0 {
        println!("{}", "Updated remotely:".green().bold());
        for line in count_lines(&stats.updated) {
            println!("{line}");
        }
    }
    if stats.deletes_applied > 0 {
        println!("  Deletes applied: {}", stats.deletes_applied);
    }

    if !stats.is_clean() {
        println!();
        if stats.deferred.total() > 0 {
            println!("{}", "Deferred:".yellow().bold());
            for line in count_lines(&stats.deferred) {
                println!("{line}");
            }
        }
        if stats.failed.total() > 0 {
            println!("{}", "Rejected by remote:".red().bold());
            for line in count_lines(&stats.failed) {
                println!("{line}");
            }
        }
        if stats.deletes_remaining > 0 {
            println!("  Deletes still queued: {}", stats.deletes_remaining);
        }
        println!("{}", "Run `tripsync -v sync flush` for details.".dimmed());
    }
    Ok(())
}

fn reconcile(ctx: &Context, trip: &str, json: bool) -> Result<()> {
    let trip_id = remote_trip_id(trip)?;
    let mut engine = ctx.engine()?;
    let rt = runtime()?;
    let stats = rt.block_on(async { engine.sync_trip(trip_id).await })?;

    if json {
        return print_json(&stats);
    }

    println!("Synced trip {}", stats.trip_id.cyan());
    for line in count_lines(&stats.fetched) {
        println!("{line}");
    }
    if stats.skipped_pending_deletes > 0 {
        println!(
            "  {} record(s) skipped: delete pending",
            stats.skipped_pending_deletes
        );
    }
    if stats.discarded_unsynced > 0 {
        println!(
            "  {}",
            format!(
                "{} unpushed local record(s) were replaced by the remote snapshot",
                stats.discarded_unsynced
            )
            .yellow()
        );
    }
    Ok(())
}

fn metadata(ctx: &Context, trip: &str, json: bool) -> Result<()> {
    let trip_id = remote_trip_id(trip)?;
    let mut engine = ctx.engine()?;
    let rt = runtime()?;
    let record = rt.block_on(async { engine.sync_metadata(trip_id).await })?;

    if json {
        return print_json(&serde_json::json!({
            "trip_id": trip_id,
            "found": record.is_some(),
            "trip": record,
        }));
    }

    match record {
        Some(record) => {
            println!("Refreshed sharing for {}", record.fields.title.bold());
            println!("  Owner:       {}", record.fields.owner_id);
            if record.fields.shared_with.is_empty() {
                println!("  Shared with: {}", "nobody".dimmed());
            } else {
                println!("  Shared with: {}", record.fields.shared_with.join(", "));
            }
        }
        None => {
            println!("Trip {trip_id} no longer exists remotely; removed from cache.");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_trip_id() {
        assert_eq!(remote_trip_id("remote:abc").unwrap(), "abc");
        assert_eq!(remote_trip_id("abc").unwrap(), "abc");
        assert!(matches!(
            remote_trip_id("local:3"),
            Err(Error::InvalidArgument(_))
        ));
        assert!(remote_trip_id("remote:").is_err());
    }
}
