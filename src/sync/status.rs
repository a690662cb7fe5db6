//! Sync status display.

use chrono::{TimeZone, Utc};
use colored::Colorize;

use crate::model::EntityKind;
use crate::sync::types::{KindCounts, SyncStatus};

fn label(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Trip => "Trips",
        EntityKind::Place => "Places",
        EntityKind::Itinerary => "Itinerary",
        EntityKind::Packing => "Packing",
        EntityKind::Traveler => "Travelers",
        EntityKind::Expense => "Expenses",
    }
}

/// Non-zero per-kind lines, aligned.
pub(crate) fn count_lines(counts: &KindCounts) -> Vec<String> {
    EntityKind::ALL
        .iter()
        .filter(|kind| counts.get(**kind) > 0)
        .map(|kind| {
            let name = format!("{}:", label(*kind));
            format!("  {name:<11}{}", counts.get(*kind))
        })
        .collect()
}

fn format_time(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map_or_else(|| ms.to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string())
}

/// Print sync status to stdout in a human-readable format.
pub fn print_status(status: &SyncStatus) {
    println!("{}", "Sync Status".bold().underline());
    println!();

    let remote = if status.online {
        "reachable".green()
    } else {
        "unreachable".red()
    };
    println!("Remote store: {remote}");
    println!();

    if status.totals.total() > 0 {
        println!("{}", "Cached Data:".blue().bold());
        for line in count_lines(&status.totals) {
            println!("{line}");
        }
    } else {
        println!("{}", "Nothing cached yet.".dimmed());
    }
    println!();

    if !status.has_pending() {
        println!("{}", "Everything is synced.".green());
        return;
    }

    if status.unsynced.total() > 0 {
        println!("{}", "Not Yet Pushed:".yellow().bold());
        for line in count_lines(&status.unsynced) {
            println!("{line}");
        }
        println!("  {}: {}", "Total".bold(), status.unsynced.total());
        println!();
    }

    if !status.pending_deletions.is_empty() {
        println!("{}", "Queued Remote Deletes:".yellow().bold());
        for pending in &status.pending_deletions {
            let error = pending.last_error.as_deref().unwrap_or("offline");
            println!(
                "  {} {} (queued {}, {} attempt(s): {})",
                pending.kind,
                pending.remote_id.cyan(),
                format_time(pending.queued_at),
                pending.attempts,
                error.dimmed()
            );
        }
        println!();
    }

    if status.online {
        println!(
            "Run {} to push pending changes.",
            "tripsync sync flush".cyan()
        );
    } else {
        println!(
            "{}",
            "Pending changes will be pushed once the remote store is reachable.".dimmed()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_lines_skip_empty_kinds() {
        let mut counts = KindCounts::default();
        counts.set(EntityKind::Trip, 2);
        counts.set(EntityKind::Expense, 5);
        let lines = count_lines(&counts);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("  Trips:"));
        assert!(lines[1].ends_with('5'));
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0), "1970-01-01 00:00");
    }
}
