//! Error types for tripsync.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 4=validation, 5=access, 6=sync, ...)
//! - Retryability flags
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers
//!
//! Transport failures against the remote store never show up here from
//! repository calls: they degrade to the local cache. What does surface is
//! a failure the caller has to decide about.

use thiserror::Error;

use crate::model::EntityKind;
use crate::remote::RemoteError;

/// Result type alias for tripsync operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    NotInitialized,
    DatabaseError,

    // Not Found (exit 3)
    RecordNotFound,
    TripNotFound,

    // Validation (exit 4)
    InvalidDocument,
    InvalidArgument,
    UnresolvedReference,

    // Access (exit 5)
    AccessDenied,
    NoIdentity,

    // Sync (exit 6)
    Offline,
    RemoteError,
    ReconcileFailed,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::RecordNotFound => "RECORD_NOT_FOUND",
            Self::TripNotFound => "TRIP_NOT_FOUND",
            Self::InvalidDocument => "INVALID_DOCUMENT",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::UnresolvedReference => "UNRESOLVED_REFERENCE",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::NoIdentity => "NO_IDENTITY",
            Self::Offline => "OFFLINE",
            Self::RemoteError => "REMOTE_ERROR",
            Self::ReconcileFailed => "RECONCILE_FAILED",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::DatabaseError => 2,
            Self::RecordNotFound | Self::TripNotFound => 3,
            Self::InvalidDocument | Self::InvalidArgument | Self::UnresolvedReference => 4,
            Self::AccessDenied | Self::NoIdentity => 5,
            Self::Offline | Self::RemoteError | Self::ReconcileFailed => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether running the same operation again later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Offline | Self::RemoteError | Self::ReconcileFailed | Self::DatabaseError
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in tripsync operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: no local database at the configured path")]
    NotInitialized,

    #[error("{kind} not found: {key}")]
    RecordNotFound { kind: EntityKind, key: String },

    #[error("Trip not found: {key}")]
    TripNotFound { key: String },

    #[error("Access to trip {trip} denied for {user}")]
    AccessDenied { trip: String, user: String },

    #[error("No identity: pass --user or set TRIPSYNC_USER")]
    NoIdentity,

    #[error("Remote store is unreachable")]
    Offline,

    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Reconciliation of trip {trip} aborted: {kind} fetch failed: {source}")]
    Reconcile {
        trip: String,
        kind: EntityKind,
        source: RemoteError,
    },

    #[error("Invalid import document: {0}")]
    InvalidDocument(String),

    #[error("{kind}.{field} still references a record without a remote key")]
    UnresolvedReference {
        kind: EntityKind,
        field: &'static str,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::RecordNotFound { .. } => ErrorCode::RecordNotFound,
            Self::TripNotFound { .. } => ErrorCode::TripNotFound,
            Self::AccessDenied { .. } => ErrorCode::AccessDenied,
            Self::NoIdentity => ErrorCode::NoIdentity,
            Self::Offline => ErrorCode::Offline,
            Self::Remote(_) => ErrorCode::RemoteError,
            Self::Reconcile { .. } => ErrorCode::ReconcileFailed,
            Self::InvalidDocument(_) => ErrorCode::InvalidDocument,
            Self::UnresolvedReference { .. } => ErrorCode::UnresolvedReference,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => {
                Some("Pass --db or set TRIPSYNC_DB to an existing database".to_string())
            }
            Self::NoIdentity => Some(
                "Set the acting user with --user <id>, TRIPSYNC_USER, or user_id in ~/.tripsync/config.json"
                    .to_string(),
            ),
            Self::Offline => Some(
                "Local changes are kept and pushed by `tripsync sync flush` once the remote is reachable"
                    .to_string(),
            ),
            Self::Reconcile { .. } => Some(
                "Local data for this trip was left untouched. Retry `tripsync sync trip <id>`."
                    .to_string(),
            ),
            Self::TripNotFound { .. } => {
                Some("Use `tripsync trip list` to see trips visible to you.".to_string())
            }
            Self::UnresolvedReference { .. } => Some(
                "Push the referenced record first, or run `tripsync sync flush`".to_string(),
            ),
            Self::InvalidDocument(_) => Some(
                "Expected {\"version\": 1, \"exported_at\": ..., \"data\": <trip graph or array of graphs>}"
                    .to_string(),
            ),
            Self::Config(_) => Some("Check ~/.tripsync/config.json".to_string()),
            Self::Remote(e) if e.is_transport() => Some(
                "The remote store could not be reached; cached data remains usable".to_string(),
            ),
            Self::RecordNotFound { .. }
            | Self::AccessDenied { .. }
            | Self::Remote(_)
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::InvalidArgument(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
