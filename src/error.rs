//! Error taxonomy for build-time and runtime federation failures.

use thiserror::Error;

/// Federation failures surfaced to callers.
///
/// The type is `Clone` because failed loads stay cached for the session:
/// every caller of the same (bundle, key) receives the same error until a
/// reload is explicitly forced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FederationError {
    #[error(
        "version conflict for shared package '{package}': bundle '{bundle_a}' declares {version_a}, bundle '{bundle_b}' declares {version_b}"
    )]
    BuildVersionConflict {
        package: String,
        bundle_a: String,
        version_a: String,
        bundle_b: String,
        version_b: String,
    },

    #[error(
        "version conflict for shared package '{package}': '{existing_bundle}' resolved {existing_version}, but '{incoming_bundle}' requires {incoming_version}"
    )]
    VersionConflict {
        package: String,
        existing_bundle: String,
        existing_version: String,
        incoming_bundle: String,
        incoming_version: String,
    },

    #[error("failed to fetch manifest for remote '{bundle}' from {url}: {reason}")]
    ManifestFetch {
        bundle: String,
        url: String,
        reason: String,
    },

    #[error("failed to fetch module '{key}' of remote '{bundle}' from {url}: {reason}")]
    ModuleFetch {
        bundle: String,
        key: String,
        url: String,
        reason: String,
    },

    #[error("remote '{bundle}' does not expose '{key}'")]
    ModuleNotExposed { bundle: String, key: String },

    #[error("loading '{target}' from remote '{bundle}' timed out after {millis}ms")]
    LoadTimeout {
        bundle: String,
        target: String,
        millis: u64,
    },

    #[error("remote '{bundle}' is not present in the federation's remote configuration")]
    UnknownRemote { bundle: String },

    #[error("federation is not initialized; call init() before loading remote modules")]
    NotInitialized,

    #[error("invalid version '{value}' for shared package '{package}': {reason}")]
    InvalidVersion {
        package: String,
        value: String,
        reason: String,
    },
}
