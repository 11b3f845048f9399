//! Build-time manifest and import-map generation.
//!
//! Turns a bundle's federation configuration into physical artifacts: one
//! content-hashed chunk per exposed module and per shared package, a
//! remote-entry manifest, and an import map rooted at the output
//! directory.

use anyhow::{Context, Result, bail};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::FederationError;
use crate::resolver::{descriptors_compatible, exposed_specifier};
use crate::types::{ExposedModule, FederationConfig, ImportMap, RemoteManifest, SharedDescriptor};

/// Where a bundle is read from and where its artifacts are written.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub workspace_root: PathBuf,
    pub out_dir: PathBuf,
}

/// Artifacts produced by building one bundle.
#[derive(Debug)]
pub struct BuildArtifacts {
    pub manifest: RemoteManifest,
    pub import_map: ImportMap,
    pub manifest_path: PathBuf,
    pub import_map_path: PathBuf,
}

/// Read and parse a federation configuration file (TOML).
pub fn load_config(path: &Path) -> Result<FederationConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read federation config {}", path.display()))?;
    let config: FederationConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse federation config {}", path.display()))?;
    Ok(config)
}

/// Build one bundle: emit exposed and shared chunks with content-hashed
/// filenames, rewrite cross-chunk imports, and write the remote-entry
/// manifest and import map. Only this bundle's output directory is
/// touched.
pub fn build_bundle(config: &FederationConfig, options: &BuildOptions) -> Result<BuildArtifacts> {
    fs::create_dir_all(&options.out_dir).with_context(|| {
        format!(
            "failed to create output directory {}",
            options.out_dir.display()
        )
    })?;

    // Hash all exposed sources first so cross-chunk rewrites can target
    // final filenames.
    let mut chunk_names = BTreeMap::new();
    let mut sources = BTreeMap::new();
    for (key, source) in &config.exposes {
        let path = options.workspace_root.join(source.trim_start_matches("./"));
        let content = fs::read_to_string(&path).with_context(|| {
            format!(
                "exposed module '{key}' of bundle '{}' cannot be resolved at {}",
                config.name,
                path.display()
            )
        })?;
        chunk_names.insert(source.clone(), hashed_file_name(source, &content));
        sources.insert(key.clone(), content);
    }

    let mut exposes = Vec::new();
    let mut import_map = ImportMap::default();
    for (key, source) in &config.exposes {
        let rewritten = rewrite_cross_chunk_imports(&sources[key], source, &chunk_names);
        let out_name = chunk_names[source].clone();
        fs::write(options.out_dir.join(&out_name), rewritten)?;
        import_map.insert_if_absent(
            exposed_specifier(&config.name, key),
            format!("./{out_name}"),
        );
        debug!(bundle = %config.name, key = %key, out = %out_name, "bundled exposed module");
        exposes.push(ExposedModule {
            key: key.clone(),
            out_file_name: out_name,
        });
    }

    let mut shared = Vec::new();
    for (package, policy) in &config.shared {
        if config.skip.contains(package) {
            debug!(bundle = %config.name, package = %package, "shared package skipped");
            continue;
        }
        let version = resolve_shared_version(&options.workspace_root, package)?;
        let required = if policy.required_version == "auto" {
            format!("^{version}")
        } else {
            policy.required_version.clone()
        };
        let entry = resolve_package_entry(&options.workspace_root, package)?;
        let content = fs::read_to_string(&entry).with_context(|| {
            format!(
                "failed to read entry file for shared package '{package}' at {}",
                entry.display()
            )
        })?;
        let out_name = hashed_file_name(&format!("{package}.js"), &content);
        fs::write(options.out_dir.join(&out_name), &content)?;
        import_map.insert_if_absent(package.clone(), format!("./{out_name}"));
        shared.push(SharedDescriptor {
            package_name: package.clone(),
            version: Some(version),
            singleton: policy.singleton,
            strict_version: policy.strict_version,
            required_version: Some(required),
            out_file_name: Some(out_name),
        });
    }

    let manifest = RemoteManifest {
        name: config.name.clone(),
        exposes,
        shared,
    };
    let manifest_path = options.out_dir.join(&config.filename);
    fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)?;
    let import_map_path = options.out_dir.join("importmap.json");
    fs::write(&import_map_path, serde_json::to_string_pretty(&import_map)?)?;
    info!(
        bundle = %config.name,
        exposes = manifest.exposes.len(),
        shared = manifest.shared.len(),
        out = %options.out_dir.display(),
        "bundle built"
    );

    Ok(BuildArtifacts {
        manifest,
        import_map,
        manifest_path,
        import_map_path,
    })
}

/// Cross-check the shared declarations of bundles built together: a
/// strict-version mismatch is a build failure, not something deferred to
/// runtime.
pub fn check_build_conflicts(artifacts: &[BuildArtifacts]) -> Result<(), FederationError> {
    for (i, a) in artifacts.iter().enumerate() {
        for b in &artifacts[i + 1..] {
            for da in &a.manifest.shared {
                for db in &b.manifest.shared {
                    if da.package_name != db.package_name {
                        continue;
                    }
                    if !(da.strict_version || db.strict_version) {
                        continue;
                    }
                    if !descriptors_compatible(da, db)? {
                        return Err(FederationError::BuildVersionConflict {
                            package: da.package_name.clone(),
                            bundle_a: a.manifest.name.clone(),
                            version_a: da.version.clone().unwrap_or_default(),
                            bundle_b: b.manifest.name.clone(),
                            version_b: db.version.clone().unwrap_or_default(),
                        });
                    }
                }
            }
        }
    }
    Ok(())
}

fn hashed_file_name(source: &str, content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let hash = &hex::encode(digest)[..8];
    let stem = Path::new(source)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("chunk");
    format!("{stem}-{hash}.js")
}

/// Rewrite relative imports of other exposed chunks to their hashed output
/// filenames. Bare specifiers stay untouched; the import map resolves them
/// at load time.
fn rewrite_cross_chunk_imports(
    content: &str,
    importer: &str,
    chunk_names: &BTreeMap<String, String>,
) -> String {
    let importer_dir = Path::new(importer.trim_start_matches("./"))
        .parent()
        .unwrap_or(Path::new(""))
        .to_path_buf();
    let mut rewritten = content.to_string();
    for (source, out_name) in chunk_names {
        if source == importer {
            continue;
        }
        let target = Path::new(source.trim_start_matches("./"));
        let spec = relative_specifier(&importer_dir, target);
        let mut candidates = vec![spec.clone()];
        if let Some(bare) = strip_extension(&spec) {
            candidates.push(bare);
        }
        for candidate in candidates {
            for quote in ['"', '\''] {
                let from = format!("{quote}{candidate}{quote}");
                let to = format!("{quote}./{out_name}{quote}");
                rewritten = rewritten.replace(&from, &to);
            }
        }
    }
    rewritten
}

/// Relative specifier from one chunk's directory to another source file,
/// in the "./" / "../" form ES imports use.
fn relative_specifier(importer_dir: &Path, target: &Path) -> String {
    let importer: Vec<&str> = importer_dir.iter().filter_map(|c| c.to_str()).collect();
    let mut target_parts: Vec<&str> = target.iter().filter_map(|c| c.to_str()).collect();
    let file = target_parts.pop().unwrap_or_default();

    let mut common = 0;
    while common < importer.len()
        && common < target_parts.len()
        && importer[common] == target_parts[common]
    {
        common += 1;
    }

    let mut parts: Vec<String> = Vec::new();
    if importer.len() == common {
        parts.push(".".to_string());
    } else {
        parts.extend((0..importer.len() - common).map(|_| "..".to_string()));
    }
    parts.extend(target_parts[common..].iter().map(|s| s.to_string()));
    parts.push(file.to_string());
    parts.join("/")
}

fn strip_extension(spec: &str) -> Option<String> {
    let dot = spec.rfind('.')?;
    if dot == 0 || spec.rfind('/').is_some_and(|slash| slash > dot) {
        return None;
    }
    Some(spec[..dot].to_string())
}

/// Actual resolved version for a shared package: the installed version
/// from the dependency tree when present, otherwise the range declared in
/// the workspace package.json with its operator trimmed.
fn resolve_shared_version(root: &Path, package: &str) -> Result<String> {
    let installed = root.join("node_modules").join(package).join("package.json");
    if installed.exists() {
        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&installed)?)
            .with_context(|| format!("malformed package.json at {}", installed.display()))?;
        if let Some(version) = json.get("version").and_then(|v| v.as_str()) {
            return Ok(version.to_string());
        }
    }

    let manifest = root.join("package.json");
    let content = fs::read_to_string(&manifest).with_context(|| {
        format!(
            "cannot resolve version for shared package '{package}': no package.json at {}",
            manifest.display()
        )
    })?;
    let json: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("malformed package.json at {}", manifest.display()))?;
    for table in ["dependencies", "devDependencies"] {
        if let Some(declared) = json
            .get(table)
            .and_then(|t| t.get(package))
            .and_then(|v| v.as_str())
        {
            return Ok(declared.trim_start_matches(['^', '~', '=', 'v']).to_string());
        }
    }
    bail!(
        "shared package '{package}' is not in the dependency tree under {}",
        root.display()
    )
}

fn resolve_package_entry(root: &Path, package: &str) -> Result<PathBuf> {
    let dir = root.join("node_modules").join(package);
    let manifest = dir.join("package.json");
    if manifest.exists() {
        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&manifest)?)
            .with_context(|| format!("malformed package.json at {}", manifest.display()))?;
        for field in ["module", "main"] {
            if let Some(entry) = json.get(field).and_then(|v| v.as_str()) {
                return Ok(dir.join(entry));
            }
        }
    }
    let index = dir.join("index.js");
    if index.exists() {
        return Ok(index);
    }
    bail!(
        "cannot resolve entry file for shared package '{package}' under {}",
        dir.display()
    )
}
