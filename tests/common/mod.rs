#![allow(dead_code)]

use async_trait::async_trait;
use federation_runtime::{ExposedModule, RemoteFetcher, RemoteManifest, SharedDescriptor};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Temporary bundle workspace: sources, package.json, node_modules.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_file(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.root().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn write_package_json(&self, dependencies: &[(&str, &str)]) {
        let deps: HashMap<&str, &str> = dependencies.iter().copied().collect();
        let json = serde_json::json!({
            "name": "test-workspace",
            "dependencies": deps,
        });
        self.write_file("package.json", &serde_json::to_string_pretty(&json).unwrap());
    }

    /// Place a package in node_modules with the given installed version.
    pub fn install_package(&self, name: &str, version: &str, entry_source: &str) {
        let json = serde_json::json!({
            "name": name,
            "version": version,
            "main": "index.js",
        });
        self.write_file(
            &format!("node_modules/{name}/package.json"),
            &serde_json::to_string_pretty(&json).unwrap(),
        );
        self.write_file(&format!("node_modules/{name}/index.js"), entry_source);
    }

    pub fn config_file(&self, content: &str) -> PathBuf {
        self.write_file("federation.toml", content)
    }
}

pub fn shared_desc(
    package: &str,
    version: &str,
    singleton: bool,
    strict_version: bool,
) -> SharedDescriptor {
    SharedDescriptor {
        package_name: package.to_string(),
        version: Some(version.to_string()),
        singleton,
        strict_version,
        required_version: Some(format!("^{version}")),
        out_file_name: Some(format!("{package}.js")),
    }
}

pub fn manifest(
    name: &str,
    exposes: &[(&str, &str)],
    shared: Vec<SharedDescriptor>,
) -> RemoteManifest {
    RemoteManifest {
        name: name.to_string(),
        exposes: exposes
            .iter()
            .map(|(key, out_file_name)| ExposedModule {
                key: key.to_string(),
                out_file_name: out_file_name.to_string(),
            })
            .collect(),
        shared,
    }
}

/// In-memory fetcher serving fixed manifests and module bytes while
/// counting every fetch, so tests can assert de-duplication.
#[derive(Default)]
pub struct StaticFetcher {
    manifests: HashMap<String, RemoteManifest>,
    modules: HashMap<String, Vec<u8>>,
    delay: Option<Duration>,
    pub manifest_fetches: AtomicUsize,
    pub module_fetches: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_manifest(mut self, url: &str, manifest: RemoteManifest) -> Self {
        self.manifests.insert(url.to_string(), manifest);
        self
    }

    pub fn with_module(mut self, url: &str, bytes: &[u8]) -> Self {
        self.modules.insert(url.to_string(), bytes.to_vec());
        self
    }

    /// Delay every fetch, to hold loads in flight.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl RemoteFetcher for StaticFetcher {
    async fn fetch_manifest(&self, url: &str) -> anyhow::Result<RemoteManifest> {
        self.manifest_fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.manifests
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no manifest served at {url}"))
    }

    async fn fetch_module(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        self.module_fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.modules
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no module served at {url}"))
    }
}

/// Fetcher whose module fetches fail a given number of times before the
/// underlying StaticFetcher takes over.
pub struct FlakyFetcher {
    pub inner: StaticFetcher,
    remaining_failures: AtomicUsize,
}

impl FlakyFetcher {
    pub fn new(inner: StaticFetcher, failures: usize) -> Self {
        Self {
            inner,
            remaining_failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl RemoteFetcher for FlakyFetcher {
    async fn fetch_manifest(&self, url: &str) -> anyhow::Result<RemoteManifest> {
        self.inner.fetch_manifest(url).await
    }

    async fn fetch_module(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        let remaining = self.remaining_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_failures
                .store(remaining - 1, Ordering::SeqCst);
            self.inner.module_fetches.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("simulated network failure");
        }
        self.inner.fetch_module(url).await
    }
}
