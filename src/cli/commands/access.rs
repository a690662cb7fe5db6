//! Access command implementation.

use colored::Colorize;
use serde_json::json;

use super::{parse_key, print_json, runtime, Context};
use crate::error::Result;
use crate::sync::{AccessDecision, AccessGate};

/// Check whether the configured user may open a trip.
///
/// # Errors
///
/// Returns an error if no identity is configured or the check fails.
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
    let decision = rt.block_on(async { gate.check(&mut engine, &identity, &key).await })?;

    match decision {
        AccessDecision::Allow { trip, fresh } => {
            if json {
                return print_json(&json!({
                    "allowed": true,
                    "trip": trip.key,
                    "user": identity.user_id,
                    "fresh": fresh,
                }));
            }
            println!(
                "{} {} may open {}",
                "Allowed:".green().bold(),
                identity.user_id,
                trip.fields.title
            );
            if !fresh {
                println!("  {}", "Based on cached sharing data.".yellow());
            }
        }
        AccessDecision::Deny { redirect, reason } => {
            if json {
                return print_json(&json!({
                    "allowed": false,
                    "user": identity.user_id,
                    "reason": reason,
                    "redirect": redirect,
                }));
            }
            println!("{} {reason}", "Denied:".red().bold());
            println!("  Redirect: {redirect}");
        }
    }
    Ok(())
}
