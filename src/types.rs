//! Core type definitions shared across the crate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sharing policy and resolution data for a single third-party package.
///
/// In a remote-entry manifest, `version` carries the version the bundle was
/// actually built against and `required_version` a semver range other
/// bundles must satisfy. In build configuration, `required_version` may be
/// `"auto"`, which the builder substitutes with a caret range of the
/// resolved version.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SharedDescriptor {
    pub package_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub singleton: bool,
    #[serde(default)]
    pub strict_version: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_version: Option<String>,
    /// Output chunk holding this package's code, relative to the manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_file_name: Option<String>,
}

/// A module a bundle makes available for dynamic loading.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExposedModule {
    /// Exposed path as consumers request it, e.g. "./Button".
    pub key: String,
    /// Built chunk filename, relative to the manifest's directory.
    pub out_file_name: String,
}

/// Remote-entry manifest, served by each bundle at a well-known URL
/// and immutable after parsing.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RemoteManifest {
    pub name: String,
    #[serde(default)]
    pub exposes: Vec<ExposedModule>,
    #[serde(default)]
    pub shared: Vec<SharedDescriptor>,
}

impl RemoteManifest {
    /// Look up an exposed module, tolerating a missing "./" prefix.
    pub fn exposed(&self, key: &str) -> Option<&ExposedModule> {
        let wanted = key.trim_start_matches("./");
        self.exposes
            .iter()
            .find(|m| m.key.trim_start_matches("./") == wanted)
    }
}

/// Mapping from bare module specifiers to concrete URLs, consumed by the
/// browser's native module-resolution mechanism.
///
/// Keys are unique and ordered so serialization is deterministic.
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
pub struct ImportMap {
    pub imports: BTreeMap<String, String>,
}

impl ImportMap {
    pub fn get(&self, specifier: &str) -> Option<&String> {
        self.imports.get(specifier)
    }

    /// Add an entry unless the specifier is already resolved.
    /// Returns whether the entry was added.
    pub fn insert_if_absent(
        &mut self,
        specifier: impl Into<String>,
        url: impl Into<String>,
    ) -> bool {
        match self.imports.entry(specifier.into()) {
            std::collections::btree_map::Entry::Vacant(entry) => {
                entry.insert(url.into());
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }
}

/// Per-bundle build configuration (TOML).
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FederationConfig {
    pub name: String,
    /// Manifest artifact filename within the output directory.
    #[serde(default = "default_manifest_filename")]
    pub filename: String,
    /// Exposed path -> source file, relative to the workspace root.
    #[serde(default)]
    pub exposes: BTreeMap<String, String>,
    /// Package name -> sharing policy.
    #[serde(default)]
    pub shared: BTreeMap<String, SharedPolicy>,
    /// Packages excluded from sharing even when listed in `shared`.
    #[serde(default)]
    pub skip: Vec<String>,
}

pub fn default_manifest_filename() -> String {
    "remoteEntry.json".to_string()
}

/// Sharing policy as declared in build configuration.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SharedPolicy {
    #[serde(default)]
    pub singleton: bool,
    #[serde(default)]
    pub strict_version: bool,
    /// Semver range, or "auto" to adopt a caret range of the version
    /// resolved from the dependency tree at build time.
    #[serde(default = "default_required_version")]
    pub required_version: String,
}

fn default_required_version() -> String {
    "auto".to_string()
}

/// A loaded remote module: the concrete value handed to every caller of
/// `load_remote_module` for the same (bundle, key) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteModule {
    pub bundle: String,
    pub key: String,
    pub url: String,
    pub bytes: Vec<u8>,
}
