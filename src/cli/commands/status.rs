//! Status command implementation.

use super::{print_json, runtime, Context};
use crate::error::{Error, Result};
use crate::sync::print_status;

/// Execute status command.
///
/// Reports cached record counts, records not yet pushed, queued remote
/// deletes, and whether the remote store answers right now.
///
/// # Errors
///
/// Returns `NotInitialized` if the local database does not exist yet.
pub fn execute(ctx: &Context, json: bool) -> Result<()> {
    if !ctx.db_path.exists() {
        return Err(Error::NotInitialized);
    }

    let engine = ctx.engine()?;
    let rt = runtime()?;
    let status = rt.block_on(async { engine.status().await })?;

    if json {
        return print_json(&status);
    }

    print_status(&status);
    Ok(())
}
