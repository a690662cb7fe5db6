//! Command implementations.

pub mod access;
pub mod completions;
pub mod export;
pub mod import;
pub mod open;
pub mod status;
pub mod sync;
pub mod trip;
pub mod version;

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{load_config, resolve_db_path, Overrides, Settings};
use crate::connectivity::HttpProbe;
use crate::error::{Error, Result};
use crate::model::Key;
use crate::remote::HttpRemoteStore;
use crate::storage::SqliteStorage;
use crate::sync::SyncEngine;

/// The engine every command runs against.
pub type Engine = SyncEngine<HttpRemoteStore, HttpProbe>;

/// Resolved settings shared by all commands.
#[derive(Debug, Clone)]
pub struct Context {
    pub settings: Settings,
    pub db_path: PathBuf,
    pub actor: String,
}

impl Context {
    /// Load the config file and layer env and flags over it.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the config file is unreadable or no database
    /// location can be determined.
    pub fn load(db: Option<&Path>, actor: String, overrides: &Overrides) -> Result<Self> {
        let settings = Settings::resolve(load_config()?, overrides);
        let db_path = resolve_db_path(db)
            .ok_or_else(|| Error::Config("Could not determine home directory".into()))?;
        Ok(Self {
            settings,
            db_path,
            actor,
        })
    }

    /// Open the local cache, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database directory or file cannot be created.
    pub fn open_storage(&self) -> Result<SqliteStorage> {
        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        SqliteStorage::open(&self.db_path)
    }

    /// Build the sync engine.
    ///
    /// Without a remote URL, or in offline mode, the probe never reports the
    /// remote as reachable and every operation stays on the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the local cache cannot be opened.
    pub fn engine(&self) -> Result<Engine> {
        let storage = self.open_storage()?;
        let settings = &self.settings;

        let mut remote = HttpRemoteStore::new(
            settings.remote_url.clone().unwrap_or_default(),
            settings.api_key.clone().unwrap_or_default(),
        );
        if let Some(token) = &settings.access_token {
            remote = remote.with_access_token(token.clone());
        }

        let probe = match (&settings.probe_url, settings.offline) {
            (Some(url), false) if settings.remote_url.is_some() => HttpProbe::new(url.clone()),
            _ => {
                debug!("no reachable remote configured, running offline");
                HttpProbe::offline()
            }
        };

        Ok(SyncEngine::new(remote, probe, storage).with_actor(self.actor.clone()))
    }
}

/// Create the async runtime commands block on.
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))
}

/// Parse a record key argument.
pub(crate) fn parse_key(value: &str) -> Result<Key> {
    value
        .parse()
        .map_err(|e| Error::InvalidArgument(format!("invalid key '{value}': {e}")))
}

/// Print a value as one line of JSON.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
