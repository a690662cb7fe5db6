//! Import command implementation.

use std::path::Path;

use colored::Colorize;

use super::{print_json, runtime, Context};
use crate::error::Result;
use crate::sync::count_lines;

/// Import a portable document as new trips owned by the current user.
///
/// # Errors
///
/// Returns `InvalidDocument` if the file is malformed (nothing is written),
/// `NoIdentity` if no user is configured, or a cache error.
pub fn execute(ctx: &Context, file: &Path, no_push: bool, json: bool) -> Result<()> {
    let owner = ctx.settings.identity()?;
    let mut engine = ctx.engine()?;
    let rt = runtime()?;
    let stats = rt.block_on(async { engine.import_file(file, &owner, !no_push).await })?;

    if json {
        return print_json(&serde_json::json!({
            "success": true,
            "path": file.display().to_string(),
            "stats": stats,
        }));
    }

    println!("Imported {}", file.display());
    println!();
    for line in count_lines(&stats.created) {
        println!("{line}");
    }
    if stats.dangling_dropped > 0 {
        println!(
            "  {}",
            format!(
                "{} reference(s) pointed outside the document and were dropped",
                stats.dangling_dropped
            )
            .yellow()
        );
    }
    println!();
    if stats.pushed > 0 {
        println!("  Pushed:     {}", stats.pushed);
    }
    if stats.unsynced > 0 {
        println!(
            "  Local only: {} {}",
            stats.unsynced,
            "(run `tripsync sync flush` when online)".dimmed()
        );
    }
    Ok(())
}
