//! Federation Runtime
//!
//! A runtime for sharing modules and third-party dependencies across
//! independently built and deployed bundles. A build step emits one
//! remote-entry manifest and import map per bundle; at runtime a loader
//! fetches remote modules on demand, deduplicates concurrent fetches, and
//! enforces the shared-dependency policy (singleton, version
//! compatibility) across bundles.

pub use builder::{BuildArtifacts, BuildOptions, build_bundle, check_build_conflicts, load_config};
pub use error::FederationError;
pub use loader::{HttpFetcher, RemoteFetcher};
pub use resolver::{SharedResolver, exposed_specifier, join_url};
pub use runtime::{DEFAULT_FETCH_TIMEOUT, Federation, FederationBuilder};
pub use types::{
    ExposedModule, FederationConfig, ImportMap, RemoteManifest, RemoteModule, SharedDescriptor,
    SharedPolicy,
};

pub mod builder;
pub mod error;
pub mod loader;
pub mod resolver;
pub mod runtime;
pub mod types;
