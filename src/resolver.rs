//! Runtime dependency resolution: merges the shared-dependency
//! declarations of the host and every loaded remote into one import map.

use semver::{Version, VersionReq};
use std::collections::HashMap;
use tracing::debug;

use crate::error::FederationError;
use crate::types::{ImportMap, RemoteManifest, SharedDescriptor};

/// A shared package fixed to one URL for the session.
#[derive(Debug, Clone)]
struct ResolvedShared {
    bundle: String,
    version: Option<Version>,
    required: Option<VersionReq>,
    singleton: bool,
    strict_version: bool,
}

/// Reconciles shared-dependency declarations into a single import map.
///
/// Registration order is the order bundles are loaded: the host always
/// registers first, remotes in the order their loads were requested. The
/// first bundle to register a package wins; entries are appended, never
/// overwritten or removed, so the same registration sequence always
/// resolves identically.
#[derive(Debug, Default)]
pub struct SharedResolver {
    resolved: HashMap<String, ResolvedShared>,
    import_map: ImportMap,
}

impl SharedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn import_map(&self) -> &ImportMap {
        &self.import_map
    }

    /// Merge one bundle's manifest. `base_url` is the URL the manifest was
    /// fetched from; relative chunk names resolve against its directory.
    pub fn register(
        &mut self,
        bundle: &str,
        manifest: &RemoteManifest,
        base_url: &str,
    ) -> Result<(), FederationError> {
        for descriptor in &manifest.shared {
            self.register_shared(bundle, descriptor, base_url)?;
        }
        for exposed in &manifest.exposes {
            let specifier = exposed_specifier(bundle, &exposed.key);
            let url = join_url(base_url, &exposed.out_file_name);
            self.import_map.insert_if_absent(specifier, url);
        }
        Ok(())
    }

    fn register_shared(
        &mut self,
        bundle: &str,
        descriptor: &SharedDescriptor,
        base_url: &str,
    ) -> Result<(), FederationError> {
        let package = &descriptor.package_name;
        let version = parse_version(package, descriptor.version.as_deref())?;
        let required = required_range(
            package,
            version.as_ref(),
            descriptor.required_version.as_deref(),
        )?;

        let Some(existing) = self.resolved.get(package) else {
            if let Some(out) = &descriptor.out_file_name {
                self.import_map
                    .insert_if_absent(package.clone(), join_url(base_url, out));
            }
            debug!(package = %package, bundle, version = ?descriptor.version, "adopted shared package");
            self.resolved.insert(
                package.clone(),
                ResolvedShared {
                    bundle: bundle.to_string(),
                    version,
                    required,
                    singleton: descriptor.singleton,
                    strict_version: descriptor.strict_version,
                },
            );
            return Ok(());
        };

        // Re-registration of the identical descriptor (e.g. init run twice)
        // is a no-op.
        if existing.bundle == bundle && existing.version == version {
            return Ok(());
        }

        if (existing.strict_version || descriptor.strict_version)
            && !mutually_satisfied(
                existing.version.as_ref(),
                existing.required.as_ref(),
                version.as_ref(),
                required.as_ref(),
            )
        {
            return Err(FederationError::VersionConflict {
                package: package.clone(),
                existing_bundle: existing.bundle.clone(),
                existing_version: display_version(existing.version.as_ref()),
                incoming_bundle: bundle.to_string(),
                incoming_version: display_version(version.as_ref()),
            });
        }

        if existing.singleton || descriptor.singleton {
            // First writer wins: the newcomer's copy is discarded and its
            // imports of this specifier resolve to the existing URL.
            debug!(
                package = %package,
                bundle,
                kept = %existing.bundle,
                "singleton already resolved, discarding newcomer copy"
            );
            return Ok(());
        }

        // Not a singleton: the bare specifier keeps its first resolution,
        // but a diverging copy stays addressable under a version-qualified
        // specifier.
        if version != existing.version
            && let (Some(version), Some(out)) = (&version, &descriptor.out_file_name)
        {
            self.import_map
                .insert_if_absent(format!("{package}@{version}"), join_url(base_url, out));
        }
        Ok(())
    }
}

/// Import-map specifier under which a remote's exposed module is published,
/// e.g. ("remote", "./Button") -> "remote/Button".
pub fn exposed_specifier(bundle: &str, key: &str) -> String {
    format!("{bundle}/{}", key.trim_start_matches("./"))
}

/// Resolve a chunk name against the directory of the URL it was declared in.
/// Absolute and root-relative targets pass through unchanged.
pub fn join_url(base: &str, target: &str) -> String {
    if target.starts_with("http://") || target.starts_with("https://") || target.starts_with('/') {
        return target.to_string();
    }
    let target = target.strip_prefix("./").unwrap_or(target);
    let dir = match base.rsplit_once('/') {
        Some((dir, _)) if !dir.is_empty() && !dir.ends_with('/') && !dir.ends_with(':') => dir,
        _ => base.trim_end_matches('/'),
    };
    format!("{dir}/{target}")
}

/// Whether two shared declarations of the same package can coexist:
/// each side's version must satisfy the other side's required range.
pub(crate) fn descriptors_compatible(
    a: &SharedDescriptor,
    b: &SharedDescriptor,
) -> Result<bool, FederationError> {
    let a_version = parse_version(&a.package_name, a.version.as_deref())?;
    let a_required = required_range(
        &a.package_name,
        a_version.as_ref(),
        a.required_version.as_deref(),
    )?;
    let b_version = parse_version(&b.package_name, b.version.as_deref())?;
    let b_required = required_range(
        &b.package_name,
        b_version.as_ref(),
        b.required_version.as_deref(),
    )?;
    Ok(mutually_satisfied(
        a_version.as_ref(),
        a_required.as_ref(),
        b_version.as_ref(),
        b_required.as_ref(),
    ))
}

fn mutually_satisfied(
    a_version: Option<&Version>,
    a_required: Option<&VersionReq>,
    b_version: Option<&Version>,
    b_required: Option<&VersionReq>,
) -> bool {
    let a_satisfies_b = match (a_version, b_required) {
        (Some(version), Some(required)) => required.matches(version),
        _ => true,
    };
    let b_satisfies_a = match (b_version, a_required) {
        (Some(version), Some(required)) => required.matches(version),
        _ => true,
    };
    a_satisfies_b && b_satisfies_a
}

fn parse_version(
    package: &str,
    version: Option<&str>,
) -> Result<Option<Version>, FederationError> {
    match version {
        None => Ok(None),
        Some(value) => {
            Version::parse(value)
                .map(Some)
                .map_err(|e| FederationError::InvalidVersion {
                    package: package.to_string(),
                    value: value.to_string(),
                    reason: e.to_string(),
                })
        }
    }
}

fn required_range(
    package: &str,
    version: Option<&Version>,
    required: Option<&str>,
) -> Result<Option<VersionReq>, FederationError> {
    let range = match required {
        // "auto" survives to runtime only for manifests that were never
        // built; fall back to a caret range of the declared version.
        None | Some("auto") => match version {
            Some(version) => format!("^{version}"),
            None => return Ok(None),
        },
        Some(range) => range.to_string(),
    };
    VersionReq::parse(&range)
        .map(Some)
        .map_err(|e| FederationError::InvalidVersion {
            package: package.to_string(),
            value: range,
            reason: e.to_string(),
        })
}

fn display_version(version: Option<&Version>) -> String {
    version
        .map(|v| v.to_string())
        .unwrap_or_else(|| "unspecified".to_string())
}
