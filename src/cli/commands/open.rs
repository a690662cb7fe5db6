//! Open command: access check, pending flush, reconcile, display.

use colored::Colorize;
use serde_json::json;

use super::trip::{print_contents, trip_line};
use super::{parse_key, print_json, runtime, Context};
use crate::error::Result;
use crate::sync::{AccessGate, OpenOutcome, ReconcileState};

/// Execute the open command.
///
/// A denied open is not an error: the redirect target is printed and the
/// command exits successfully.
///
/// # Errors
///
/// Returns an error if no identity is configured or the access check fails.
pub fn execute(ctx: &Context, trip: &str, json: bool) -> Result<()> {
    let key = parse_key(trip)?;
    let identity = ctx.settings.identity()?;
    let gate = ctx
        .settings
        .redirect
        .as_deref()
        .map_or_else(AccessGate::default, AccessGate::new);

    let mut engine = ctx.engine()?;
    let rt = runtime()?;
    let outcome = rt.block_on(async { engine.open_trip(&gate, &identity, &key).await })?;

    match outcome {
        OpenOutcome::Denied { redirect, reason } => {
            if json {
                return print_json(&json!({
                    "allowed": false,
                    "redirect": redirect,
                    "reason": reason,
                }));
            }
            println!("{} {reason}", "Access denied:".red().bold());
            println!("Redirecting to {}", redirect.cyan());
        }
        OpenOutcome::Opened(opened) => {
            if json {
                return print_json(&json!({
                    "allowed": true,
                    "trip": opened.trip,
                    "fresh": opened.fresh,
                    "reconcile": opened.reconcile,
                    "contents": opened.contents,
                }));
            }

            println!("{}", trip_line(&opened.trip));
            if !opened.fresh {
                println!(
                    "  {}",
                    "Sharing data could not be confirmed; showing cached access.".yellow()
                );
            }
            match &opened.reconcile {
                ReconcileState::Reconciled(stats) => {
                    println!(
                        "  {}",
                        format!("Synced {} record(s) from remote", stats.fetched.total()).dimmed()
                    );
                }
                ReconcileState::Skipped => {
                    println!("  {}", "Showing cached data.".dimmed());
                }
                ReconcileState::Failed { message } => {
                    println!("  {} {message}", "Sync failed, showing cached data:".yellow());
                }
            }
            print_contents(&opened.contents);
        }
    }
    Ok(())
}
