//! Export command implementation.

use std::path::Path;

use super::{parse_key, print_json, Context};
use crate::error::Result;
use crate::model::Key;
use crate::sync::{count_lines, Exporter};

/// Export trips from the local cache.
///
/// Export reads the cache only; run `tripsync open` or `sync trip` first
/// to pull the latest remote state.
///
/// # Errors
///
/// Returns an error if a key is malformed, a requested trip is not
/// cached, or the file cannot be written.
pub fn execute(ctx: &Context, trips: &[String], output: &Path, json: bool) -> Result<()> {
    let keys = trips
        .iter()
        .map(|t| parse_key(t))
        .collect::<Result<Vec<Key>>>()?;

    let storage = ctx.open_storage()?;
    let stats = Exporter::new(&storage).export_to(&keys, output)?;

    if json {
        return print_json(&serde_json::json!({
            "success": true,
            "path": output.display().to_string(),
            "stats": stats,
        }));
    }

    if stats.exported.total() == 0 {
        println!("No trips to export.");
        return Ok(());
    }

    println!("Exported to {}", output.display());
    println!();
    for line in count_lines(&stats.exported) {
        println!("{line}");
    }
    println!();
    println!("  Checksum: {}", stats.checksum);
    Ok(())
}
