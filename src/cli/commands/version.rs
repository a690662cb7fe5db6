//! Version command implementation.

use crate::error::Result;
use serde::Serialize;

#[derive(Serialize)]
struct VersionOutput<'a> {
    version: &'a str,
    build: &'a str,
    export_format: u32,
}

/// Execute the version command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    let build = if cfg!(debug_assertions) {
        "dev"
    } else {
        "release"
    };

    if json {
        let output = VersionOutput {
            version,
            build,
            export_format: crate::sync::FORMAT_VERSION,
        };
        return super::print_json(&output);
    }

    println!(
        "tripsync version {version} ({build}, export format v{})",
        crate::sync::FORMAT_VERSION
    );
    Ok(())
}
