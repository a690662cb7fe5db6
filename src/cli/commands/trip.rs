//! Trip command implementations.

use colored::Colorize;
use serde::Serialize;

use super::{parse_key, print_json, runtime, Context};
use crate::cli::TripCommands;
use crate::error::{Error, Result};
use crate::model::{Record, Trip};
use crate::sync::{DeleteOutcome, RemoteDelete, TripContents};

#[derive(Serialize)]
struct ShowOutput<'a> {
    trip: &'a Record<Trip>,
    contents: &'a TripContents,
}

/// Execute trip commands.
///
/// # Errors
///
/// Returns an error if the cache cannot be opened, no identity is
/// configured where one is needed, or the operation fails.
pub fn execute(command: &TripCommands, ctx: &Context, json: bool) -> Result<()> {
    match command {
        TripCommands::List => list(ctx, json),
        TripCommands::Create { title, start, end } => {
            create(ctx, title, *start, *end, json)
        }
        TripCommands::Show { trip } => show(ctx, trip, json),
        TripCommands::Delete { trip } => delete(ctx, trip, json),
        TripCommands::Push { trip } => push(ctx, trip, json),
    }
}

fn list(ctx: &Context, json: bool) -> Result<()> {
    let identity = ctx.settings.identity()?;
    let mut engine = ctx.engine()?;
    let rt = runtime()?;
    let trips = rt.block_on(async { engine.trips().list_visible(&identity).await })?;

    if json {
        return print_json(&trips);
    }

    if trips.is_empty() {
        println!("No trips.");
        return Ok(());
    }

    println!("Trips visible to {} ({}):", identity.user_id.cyan(), trips.len());
    println!();
    for trip in &trips {
        println!("{}", trip_line(trip));
    }
    Ok(())
}

fn create(
    ctx: &Context,
    title: &str,
    start: Option<chrono::NaiveDate>,
    end: Option<chrono::NaiveDate>,
    json: bool,
) -> Result<()> {
    if title.trim().is_empty() {
        return Err(Error::InvalidArgument("trip title cannot be empty".into()));
    }
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(Error::InvalidArgument(format!(
                "end date {end} is before start date {start}"
            )));
        }
    }

    let identity = ctx.settings.identity()?;
    let mut trip = Trip::new(title.trim(), identity.user_id);
    trip.start_date = start;
    trip.end_date = end;

    let mut engine = ctx.engine()?;
    let rt = runtime()?;
    let record = rt.block_on(async { engine.trips().create(trip).await })?;

    if json {
        return print_json(&record);
    }

    println!("Created trip: {} [{}]", record.fields.title, record.key);
    if !record.is_synced {
        println!(
            "  {}",
            "Saved locally; it will be pushed once the remote store is reachable.".dimmed()
        );
    }
    Ok(())
}

fn show(ctx: &Context, trip: &str, json: bool) -> Result<()> {
    let key = parse_key(trip)?;
    let mut engine = ctx.engine()?;
    let rt = runtime()?;
    let record = rt
        .block_on(async { engine.trips().get(&key).await })?
        .ok_or_else(|| Error::TripNotFound {
            key: key.to_string(),
        })?;
    let contents = engine.cached_contents(&record.key)?;

    if json {
        return print_json(&ShowOutput {
            trip: &record,
            contents: &contents,
        });
    }

    println!("{}", trip_line(&record));
    print_contents(&contents);
    Ok(())
}

fn delete(ctx: &Context, trip: &str, json: bool) -> Result<()> {
    let key = parse_key(trip)?;
    let mut engine = ctx.engine()?;
    let rt = runtime()?;
    let outcome: DeleteOutcome = rt.block_on(async { engine.trips().delete(&key).await })?;

    if json {
        return print_json(&outcome);
    }

    match outcome.remote {
        RemoteDelete::Deleted => println!("Deleted trip {key}"),
        RemoteDelete::NotApplicable => println!("Deleted local trip {key}"),
        RemoteDelete::Queued => {
            println!("Deleted trip {key} locally");
            println!(
                "  {}",
                "Remote delete queued; run `tripsync sync flush` to retry.".yellow()
            );
        }
    }
    if outcome.remote == RemoteDelete::Deleted && !outcome.local {
        println!("  {}", "The local copy could not be removed.".yellow());
    }
    Ok(())
}

fn push(ctx: &Context, trip: &str, json: bool) -> Result<()> {
    let key = parse_key(trip)?;
    let mut engine = ctx.engine()?;
    let rt = runtime()?;
    let record = rt.block_on(async { engine.trips().push(&key).await })?;

    if json {
        return print_json(&record);
    }

    if record.is_synced {
        println!("Pushed trip {} [{}]", record.fields.title, record.key);
    } else {
        println!(
            "Trip {} is still local: {}",
            record.key,
            "the remote store did not accept it yet".yellow()
        );
    }
    Ok(())
}

/// One-line trip summary with dates and sync marker.
pub(crate) fn trip_line(trip: &Record<Trip>) -> String {
    let dates = match (trip.fields.start_date, trip.fields.end_date) {
        (Some(start), Some(end)) => format!(" {start} → {end}"),
        (Some(start), None) => format!(" from {start}"),
        (None, Some(end)) => format!(" until {end}"),
        (None, None) => String::new(),
    };
    let shared = if trip.fields.shared_with.is_empty() {
        String::new()
    } else {
        format!(" shared with {}", trip.fields.shared_with.join(", "))
    };
    let marker = if trip.is_synced {
        "●".green()
    } else {
        "○".yellow()
    };
    format!(
        "{marker} {} [{}]{}{}",
        trip.fields.title.bold(),
        trip.key.to_string().dimmed(),
        dates,
        shared.dimmed()
    )
}

/// Print a trip's cached children grouped by kind.
pub(crate) fn print_contents(contents: &TripContents) {
    if !contents.places.is_empty() {
        println!();
        println!("{}", "Places:".blue().bold());
        for place in &contents.places {
            let address = place.fields.address.as_deref().unwrap_or_default();
            println!("  {} {}", place.fields.name, address.dimmed());
        }
    }

    if !contents.itinerary.is_empty() {
        println!();
        println!("{}", "Itinerary:".blue().bold());
        for item in &contents.itinerary {
            let time = item.fields.time.as_deref().unwrap_or("--:--");
            println!(
                "  Day {} {} {}",
                item.fields.day_index + 1,
                time.dimmed(),
                item.fields.title
            );
        }
    }

    if !contents.packing.is_empty() {
        println!();
        println!("{}", "Packing:".blue().bold());
        for item in &contents.packing {
            let check = if item.fields.completed { "[x]" } else { "[ ]" };
            println!("  {check} {}", item.fields.title);
        }
    }

    if !contents.travelers.is_empty() {
        println!();
        println!("{}", "Travelers:".blue().bold());
        for traveler in &contents.travelers {
            println!("  {}", traveler.fields.name);
        }
    }

    if !contents.expenses.is_empty() {
        println!();
        println!("{}", "Expenses:".blue().bold());
        let total: f64 = contents.expenses.iter().map(|e| e.fields.amount).sum();
        for expense in &contents.expenses {
            println!("  {:>10.2} {}", expense.fields.amount, expense.fields.title);
        }
        println!("  {:>10.2} {}", total, "total".bold());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Key;

    #[test]
    fn test_trip_line_shows_dates_and_key() {
        colored::control::set_override(false);
        let mut trip = Trip::new("Lisbon", "alice");
        trip.start_date = chrono::NaiveDate::from_ymd_opt(2026, 5, 1);
        trip.shared_with = vec!["bob".into()];
        let record = Record {
            key: Key::Local(4),
            local_id: Some(4),
            is_synced: false,
            fields: trip,
        };
        let line = trip_line(&record);
        assert!(line.contains("Lisbon [local:4] from 2026-05-01"));
        assert!(line.contains("shared with bob"));
    }
}
