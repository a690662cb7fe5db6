//! Connectivity Oracle.
//!
//! Answers "is the remote store reachable right now?". Every remote call is
//! preceded by a fresh query; results are never cached. A wrong answer is
//! harmless: transport failures on the real call still degrade to the
//! local cache.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Reachability of the remote store.
pub trait Connectivity: Send + Sync {
    /// Whether the remote store can be reached. Never fails.
    fn is_reachable(&self) -> impl Future<Output = bool> + Send;
}

/// Probes a URL over HTTP.
///
/// Any response below 500 counts as reachable. A probe without a URL always
/// reports offline.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: Option<String>,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: Some(url.into()),
        }
    }

    /// A probe that never reaches anything.
    #[must_use]
    pub fn offline() -> Self {
        Self {
            client: reqwest::Client::new(),
            url: None,
        }
    }
}

impl Connectivity for HttpProbe {
    async fn is_reachable(&self) -> bool {
        let Some(url) = &self.url else {
            return false;
        };
        match self.client.head(url).timeout(PROBE_TIMEOUT).send().await {
            Ok(response) => !response.status().is_server_error(),
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "connectivity probe failed");
                false
            }
        }
    }
}

/// Connectivity flag set by hand. Clones share the flag.
#[derive(Debug, Clone)]
pub struct ManualConnectivity {
    online: Arc<AtomicBool>,
}

impl ManualConnectivity {
    #[must_use]
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Default for ManualConnectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for ManualConnectivity {
    async fn is_reachable(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_flag_is_shared() {
        let net = ManualConnectivity::new(true);
        let handle = net.clone();
        assert!(net.is_reachable().await);
        handle.set_online(false);
        assert!(!net.is_reachable().await);
    }

    #[tokio::test]
    async fn test_probe_without_url_is_offline() {
        assert!(!HttpProbe::offline().is_reachable().await);
    }
}
