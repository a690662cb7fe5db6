//! Remote Store Client.
//!
//! The remote store is the authoritative, multi-tenant relational store.
//! Rows are JSON objects keyed by a server-issued string `id`; references
//! to other rows are plain remote ids.
//!
//! - [`RemoteStore`] - keyed CRUD over the named collections
//! - [`HttpRemoteStore`] - PostgREST-style REST client
//! - [`MemoryRemoteStore`] - in-process store for tests and local runs

mod http;
mod memory;

use std::future::Future;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::EntityKind;

pub use http::HttpRemoteStore;
pub use memory::MemoryRemoteStore;

/// One remote row.
pub type Row = Map<String, Value>;

/// Result type for remote calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Failures reported by a remote store call.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// The request never produced a response (connect, timeout, reset).
    #[error("transport failure: {0}")]
    Transport(String),

    /// The store answered with a non-success status.
    #[error("remote returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The response could not be interpreted.
    #[error("unexpected remote payload: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Whether this failure means "the store could not be reached" and the
    /// caller should fall back to the local cache.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => matches!(*status, 408 | 425 | 429 | 500..=599),
            Self::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::status(status.as_u16(), err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Row selection for list queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Rows whose `trip_id` equals the given remote id.
    Trip(String),
    /// Trips owned by, or shared with, the given user.
    VisibleTo(String),
}

/// Keyed CRUD against the authoritative store.
///
/// Every method may suspend; none of them is cancelled mid-flight by the
/// engine.
pub trait RemoteStore: Send + Sync {
    /// Fetch one row. `columns` restricts the returned fields.
    fn get(
        &self,
        kind: EntityKind,
        id: &str,
        columns: Option<&'static [&'static str]>,
    ) -> impl Future<Output = RemoteResult<Option<Row>>> + Send;

    /// List rows matching `filter`, ordered by [`EntityKind::order_by`].
    fn list(
        &self,
        kind: EntityKind,
        filter: &Filter,
    ) -> impl Future<Output = RemoteResult<Vec<Row>>> + Send;

    /// Insert a row and return it as stored, including its new `id`.
    fn insert(&self, kind: EntityKind, row: Row)
    -> impl Future<Output = RemoteResult<Row>> + Send;

    /// Update a row by id and return it as stored.
    fn update(
        &self,
        kind: EntityKind,
        id: &str,
        row: Row,
    ) -> impl Future<Output = RemoteResult<Row>> + Send;

    /// Delete a row by id. Deleting a trip removes its children.
    fn delete(&self, kind: EntityKind, id: &str) -> impl Future<Output = RemoteResult<()>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(RemoteError::Transport("reset".into()).is_transport());
        assert!(RemoteError::status(503, "down").is_transport());
        assert!(RemoteError::status(429, "slow down").is_transport());
        assert!(!RemoteError::status(403, "rls").is_transport());
        assert!(!RemoteError::Decode("bad json".into()).is_transport());
    }
}
