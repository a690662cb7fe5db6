//! Configuration management.
//!
//! Settings come from three layers, later ones winning:
//! 1. `~/.tripsync/config.json`
//! 2. Environment variables (`TRIPSYNC_*`)
//! 3. Command-line flags
//!
//! The local cache lives at `~/.tripsync/data/tripsync.db` unless
//! overridden.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::Identity;

/// Remote store connection settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSettings {
    pub url: Option<String>,
    pub api_key: Option<String>,
    /// Bearer token of the signed-in user; the API key is used if absent.
    pub access_token: Option<String>,
}

/// Contents of `~/.tripsync/config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripsyncConfig {
    #[serde(default)]
    pub remote: RemoteSettings,
    /// Health URL for the connectivity probe. Defaults to the remote URL.
    pub probe_url: Option<String>,
    pub user_id: Option<String>,
    /// Where a denied access check sends the caller.
    pub redirect: Option<String>,
    /// Never contact the remote store.
    #[serde(default)]
    pub offline: bool,
}

/// Overrides taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub remote_url: Option<String>,
    pub user_id: Option<String>,
    pub offline: bool,
}

/// Effective settings after all layers are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub remote_url: Option<String>,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub probe_url: Option<String>,
    pub user_id: Option<String>,
    pub redirect: Option<String>,
    pub offline: bool,
}

impl Settings {
    /// Layer environment variables and flags over a loaded config.
    #[must_use]
    pub fn resolve(config: TripsyncConfig, overrides: &Overrides) -> Self {
        Self::resolve_with(config, overrides, |name| std::env::var(name).ok())
    }

    fn resolve_with<F>(config: TripsyncConfig, overrides: &Overrides, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |name: &str| env(name).filter(|v| !v.trim().is_empty());

        let remote_url = overrides
            .remote_url
            .clone()
            .or_else(|| env("TRIPSYNC_REMOTE_URL"))
            .or(config.remote.url);
        let probe_url = config.probe_url.or_else(|| {
            remote_url
                .as_deref()
                .map(|url| format!("{}/rest/v1/", url.trim_end_matches('/')))
        });

        Self {
            api_key: env("TRIPSYNC_API_KEY").or(config.remote.api_key),
            access_token: config.remote.access_token,
            user_id: overrides
                .user_id
                .clone()
                .or_else(|| env("TRIPSYNC_USER"))
                .or(config.user_id),
            redirect: config.redirect,
            offline: overrides.offline
                || env("TRIPSYNC_OFFLINE").is_some_and(|v| is_truthy(&v))
                || config.offline,
            remote_url,
            probe_url,
        }
    }

    /// The identity commands act for.
    ///
    /// # Errors
    ///
    /// Returns `NoIdentity` if no user is configured.
    pub fn identity(&self) -> Result<Identity> {
        self.user_id
            .as_deref()
            .map(Identity::new)
            .ok_or(Error::NoIdentity)
    }
}

fn is_truthy(value: &str) -> bool {
    !matches!(value.trim().to_lowercase().as_str(), "" | "0" | "false" | "no" | "off")
}

/// Get the global tripsync directory, `~/.tripsync/`.
#[must_use]
pub fn global_tripsync_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".tripsync"))
}

fn config_path() -> Result<PathBuf> {
    global_tripsync_dir()
        .map(|dir| dir.join("config.json"))
        .ok_or_else(|| Error::Config("Could not determine home directory".into()))
}

/// Load `~/.tripsync/config.json`, or defaults if it does not exist.
///
/// # Errors
///
/// Returns `Config` if the file exists but cannot be read or parsed.
pub fn load_config() -> Result<TripsyncConfig> {
    load_config_from(&config_path()?)
}

/// Load a config file, or defaults if it does not exist.
///
/// # Errors
///
/// Returns `Config` if the file exists but cannot be read or parsed.
pub fn load_config_from(path: &Path) -> Result<TripsyncConfig> {
    if !path.exists() {
        return Ok(TripsyncConfig::default());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config file: {e}")))
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `TRIPSYNC_DB` environment variable
/// 3. Global location: `~/.tripsync/data/tripsync.db`
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Ok(db_path) = std::env::var("TRIPSYNC_DB") {
        if !db_path.trim().is_empty() {
            return Some(PathBuf::from(db_path));
        }
    }

    global_tripsync_dir().map(|dir| dir.join("data").join("tripsync.db"))
}

/// Get the default actor name for audit events.
///
/// Priority:
/// 1. `TRIPSYNC_ACTOR` environment variable
/// 2. System username
/// 3. "tripsync"
#[must_use]
pub fn default_actor() -> String {
    ["TRIPSYNC_ACTOR", "USER"]
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| crate::sync::DEFAULT_ACTOR.to_string())
}
