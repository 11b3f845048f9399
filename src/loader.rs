//! Remote artifact fetching and the session load caches.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

use crate::error::FederationError;
use crate::types::{RemoteManifest, RemoteModule};

/// Retrieves remote-entry manifests and built module chunks.
///
/// The default implementation is HTTP-backed; tests substitute in-memory
/// fetchers.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch_manifest(&self, url: &str) -> anyhow::Result<RemoteManifest>;
    async fn fetch_module(&self, url: &str) -> anyhow::Result<Vec<u8>>;
}

/// Fetcher backed by a reqwest HTTP client.
#[derive(Debug, Default, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch_manifest(&self, url: &str) -> anyhow::Result<RemoteManifest> {
        let manifest = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<RemoteManifest>()
            .await?;
        Ok(manifest)
    }

    async fn fetch_module(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        let bytes = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}

pub(crate) type ManifestCell = Arc<OnceCell<Result<Arc<RemoteManifest>, FederationError>>>;
pub(crate) type ModuleCell = Arc<OnceCell<Result<Arc<RemoteModule>, FederationError>>>;

/// Session caches for manifests and loaded modules.
///
/// Each key maps to a `OnceCell`, so the first caller installs the
/// in-flight operation and every concurrent caller awaits the same
/// outcome: at most one fetch per key, success or failure alike cached
/// for the lifetime of the session.
#[derive(Default)]
pub(crate) struct LoadCache {
    manifests: Mutex<HashMap<String, ManifestCell>>,
    modules: Mutex<HashMap<(String, String), ModuleCell>>,
}

impl LoadCache {
    pub fn manifest_cell(&self, bundle: &str) -> ManifestCell {
        let mut manifests = self.manifests.lock().unwrap();
        manifests.entry(bundle.to_string()).or_default().clone()
    }

    pub fn module_cell(&self, bundle: &str, key: &str) -> ModuleCell {
        let mut modules = self.modules.lock().unwrap();
        modules
            .entry((bundle.to_string(), key.to_string()))
            .or_default()
            .clone()
    }

    /// Drop the cached entry for a key, and the bundle's manifest entry if
    /// it holds a failure, so the next load starts over. Retry is a
    /// deliberate action; failures are never cleared automatically.
    pub fn evict(&self, bundle: &str, key: &str) {
        self.modules
            .lock()
            .unwrap()
            .remove(&(bundle.to_string(), key.to_string()));
        let mut manifests = self.manifests.lock().unwrap();
        let failed = manifests
            .get(bundle)
            .is_some_and(|cell| matches!(cell.get(), Some(Err(_))));
        if failed {
            manifests.remove(bundle);
        }
    }
}
