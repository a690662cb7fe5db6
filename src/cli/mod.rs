//! CLI definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for list/query commands.
#[derive(ValueEnum, Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text (default)
    #[default]
    Table,
    /// JSON (same as --json)
    Json,
}

pub mod commands;

/// tripsync - offline-first trip planner sync
#[derive(Parser, Debug)]
#[command(name = "tripsync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.tripsync/data/tripsync.db)
    #[arg(long, global = true, env = "TRIPSYNC_DB")]
    pub db: Option<PathBuf>,

    /// Actor name for the audit trail
    #[arg(long, global = true, env = "TRIPSYNC_ACTOR")]
    pub actor: Option<String>,

    /// User to act as (overrides TRIPSYNC_USER and config)
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Remote store base URL (overrides TRIPSYNC_REMOTE_URL and config)
    #[arg(long, global = true)]
    pub remote_url: Option<String>,

    /// Never contact the remote store
    #[arg(long, global = true)]
    pub offline: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Output format (table, json)
    #[arg(long, value_enum, global = true, default_value_t)]
    pub format: OutputFormat,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print version information
    Version,

    /// Show cached record counts and pending changes
    Status,

    /// Trip management
    Trip {
        #[command(subcommand)]
        command: TripCommands,
    },

    /// Check access, push pending changes, reconcile and show a trip
    Open {
        /// Trip key (remote id, remote:<id> or local:<n>)
        trip: String,
    },

    /// Synchronize with the remote store
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },

    /// Export trips to a portable document
    Export {
        /// Trips to export (default: every cached trip)
        trips: Vec<String>,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Import trips from a portable document
    Import {
        /// Document to import
        file: PathBuf,

        /// Keep imported records local instead of pushing them
        #[arg(long)]
        no_push: bool,
    },

    /// Check whether the current user may open a trip
    Access {
        /// Trip key
        trip: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ============================================================================
// Trip Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum TripCommands {
    /// List trips owned by or shared with you
    List,

    /// Create a trip
    Create {
        /// Trip title
        title: String,

        /// First day (YYYY-MM-DD)
        #[arg(long)]
        start: Option<chrono::NaiveDate>,

        /// Last day (YYYY-MM-DD)
        #[arg(long)]
        end: Option<chrono::NaiveDate>,
    },

    /// Show one trip with its cached children
    Show {
        /// Trip key
        trip: String,
    },

    /// Delete a trip and its children
    Delete {
        /// Trip key
        trip: String,
    },

    /// Push a locally created or edited trip
    Push {
        /// Trip key
        trip: String,
    },
}

// ============================================================================
// Sync Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum SyncCommands {
    /// Push unsynced records and retry queued deletes
    Flush,

    /// Replace a trip's cached children with the remote snapshot
    Trip {
        /// Remote trip id
        trip: String,
    },

    /// Refresh a trip's ownership and sharing fields
    Metadata {
        /// Remote trip id
        trip: String,
    },
}
