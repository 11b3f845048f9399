//! The federation session: initialization, shared-dependency
//! registration, and remote module loading.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::FederationError;
use crate::loader::{HttpFetcher, LoadCache, RemoteFetcher};
use crate::resolver::{SharedResolver, exposed_specifier, join_url};
use crate::types::{ImportMap, RemoteManifest, RemoteModule};

/// Remote fetches that take longer than this fail with `LoadTimeout`
/// rather than stalling the caller indefinitely.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// One federation session: owns the merged import map, the load caches,
/// and the remote configuration.
///
/// Sessions are independent; nothing is process-global, so separate
/// instances (e.g. in tests) never leak state into one another.
pub struct Federation {
    host: RemoteManifest,
    host_base_url: String,
    remotes: HashMap<String, String>,
    fetcher: Arc<dyn RemoteFetcher>,
    fetch_timeout: Duration,
    resolver: Mutex<SharedResolver>,
    cache: LoadCache,
    initialized: AtomicBool,
}

impl Federation {
    /// Create a FederationBuilder seeded with the host's own manifest.
    pub fn builder(host: RemoteManifest) -> FederationBuilder {
        FederationBuilder::new(host)
    }

    /// Register the host's shared dependencies, so the host always
    /// resolves before any remote. Must run before any load; running it
    /// again with the same manifest leaves the import map unchanged.
    pub fn init(&self) -> Result<(), FederationError> {
        {
            let mut resolver = self.resolver.lock().unwrap();
            resolver.register(&self.host.name, &self.host, &self.host_base_url)?;
        }
        self.initialized.store(true, Ordering::Release);
        info!(
            host = %self.host.name,
            remotes = self.remotes.len(),
            "federation initialized"
        );
        Ok(())
    }

    /// Snapshot of the merged import map as resolved so far.
    pub fn import_map(&self) -> ImportMap {
        self.resolver.lock().unwrap().import_map().clone()
    }

    /// Load an exposed module from a remote, fetching its manifest and
    /// resolving shared dependencies on first use. At most one fetch is in
    /// flight per (bundle, key); all concurrent callers receive the same
    /// resolved module or the same error, cached for the session.
    pub async fn load_remote_module(
        &self,
        bundle: &str,
        key: &str,
    ) -> Result<Arc<RemoteModule>, FederationError> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(FederationError::NotInitialized);
        }
        let manifest = self.manifest(bundle).await?;
        self.module(bundle, key, manifest.as_ref()).await
    }

    /// Drop the cached outcome for (bundle, key) and load again. This is
    /// the only way to retry a failed load; failures are never retried
    /// automatically.
    pub async fn force_reload(
        &self,
        bundle: &str,
        key: &str,
    ) -> Result<Arc<RemoteModule>, FederationError> {
        self.cache.evict(bundle, key);
        self.load_remote_module(bundle, key).await
    }

    async fn manifest(&self, bundle: &str) -> Result<Arc<RemoteManifest>, FederationError> {
        let cell = self.cache.manifest_cell(bundle);
        cell.get_or_init(|| async {
            let Some(url) = self.remotes.get(bundle) else {
                return Err(FederationError::UnknownRemote {
                    bundle: bundle.to_string(),
                });
            };
            debug!(bundle, url = %url, "fetching remote manifest");
            let manifest = match timeout(self.fetch_timeout, self.fetcher.fetch_manifest(url))
                .await
            {
                Ok(Ok(manifest)) => manifest,
                Ok(Err(e)) => {
                    return Err(FederationError::ManifestFetch {
                        bundle: bundle.to_string(),
                        url: url.clone(),
                        reason: e.to_string(),
                    });
                }
                Err(_) => {
                    return Err(FederationError::LoadTimeout {
                        bundle: bundle.to_string(),
                        target: "remote entry manifest".to_string(),
                        millis: self.fetch_timeout.as_millis() as u64,
                    });
                }
            };
            let mut resolver = self.resolver.lock().unwrap();
            resolver.register(bundle, &manifest, url)?;
            Ok(Arc::new(manifest))
        })
        .await
        .clone()
    }

    async fn module(
        &self,
        bundle: &str,
        key: &str,
        manifest: &RemoteManifest,
    ) -> Result<Arc<RemoteModule>, FederationError> {
        let cell = self.cache.module_cell(bundle, key);
        cell.get_or_init(|| async {
            let Some(exposed) = manifest.exposed(key) else {
                return Err(FederationError::ModuleNotExposed {
                    bundle: bundle.to_string(),
                    key: key.to_string(),
                });
            };
            // The exposed path resolves through the reconciled import map;
            // joining against the remote-entry URL is the fallback for
            // manifests merged without one.
            let specifier = exposed_specifier(bundle, &exposed.key);
            let url = {
                let resolver = self.resolver.lock().unwrap();
                resolver.import_map().get(&specifier).cloned()
            }
            .unwrap_or_else(|| {
                let base = self.remotes.get(bundle).cloned().unwrap_or_default();
                join_url(&base, &exposed.out_file_name)
            });
            debug!(bundle, key, url = %url, "loading remote module");
            let bytes = match timeout(self.fetch_timeout, self.fetcher.fetch_module(&url)).await {
                Ok(Ok(bytes)) => bytes,
                Ok(Err(e)) => {
                    return Err(FederationError::ModuleFetch {
                        bundle: bundle.to_string(),
                        key: key.to_string(),
                        url,
                        reason: e.to_string(),
                    });
                }
                Err(_) => {
                    return Err(FederationError::LoadTimeout {
                        bundle: bundle.to_string(),
                        target: key.to_string(),
                        millis: self.fetch_timeout.as_millis() as u64,
                    });
                }
            };
            Ok(Arc::new(RemoteModule {
                bundle: bundle.to_string(),
                key: exposed.key.clone(),
                url,
                bytes,
            }))
        })
        .await
        .clone()
    }
}

/// Builder for a federation session.
pub struct FederationBuilder {
    host: RemoteManifest,
    host_base_url: String,
    remotes: HashMap<String, String>,
    fetcher: Option<Arc<dyn RemoteFetcher>>,
    fetch_timeout: Duration,
}

impl FederationBuilder {
    fn new(host: RemoteManifest) -> Self {
        Self {
            host,
            host_base_url: "./remoteEntry.json".to_string(),
            remotes: HashMap::new(),
            fetcher: None,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// URL the host's own artifacts resolve against.
    pub fn host_base_url(mut self, url: impl Into<String>) -> Self {
        self.host_base_url = url.into();
        self
    }

    /// Map a remote bundle name to its remote-entry URL.
    pub fn remote(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.remotes.insert(name.into(), url.into());
        self
    }

    pub fn remotes(mut self, remotes: HashMap<String, String>) -> Self {
        self.remotes.extend(remotes);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Build the session without initializing it; loads fail with
    /// `NotInitialized` until `init()` runs.
    pub fn build(self) -> Federation {
        Federation {
            host: self.host,
            host_base_url: self.host_base_url,
            remotes: self.remotes,
            fetcher: self
                .fetcher
                .unwrap_or_else(|| Arc::new(HttpFetcher::new())),
            fetch_timeout: self.fetch_timeout,
            resolver: Mutex::new(SharedResolver::new()),
            cache: LoadCache::default(),
            initialized: AtomicBool::new(false),
        }
    }

    /// Build and initialize in one step.
    pub fn init(self) -> Result<Federation, FederationError> {
        let federation = self.build();
        federation.init()?;
        Ok(federation)
    }
}
