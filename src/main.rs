use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use federation_runtime::{
    BuildArtifacts, BuildOptions, RemoteManifest, SharedResolver, build_bundle,
    check_build_conflicts, load_config,
};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "federate")]
#[command(about = "Build and inspect federated bundle artifacts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build bundle artifacts from federation config files (.toml)
    Build {
        /// One config file per bundle; the bundle root is the config's directory
        #[arg(required = true)]
        configs: Vec<PathBuf>,

        /// Output directory name, created under each bundle's root
        #[arg(long, default_value = "dist")]
        out_dir: String,
    },
    /// Parse a remote-entry manifest and print a summary
    Inspect {
        /// Path to a remoteEntry.json file
        manifest: PathBuf,
    },
    /// Merge manifests offline in load order and print the import map
    Resolve {
        /// The host's manifest file; the host always resolves first
        host: PathBuf,

        /// Remote manifests as name=path pairs, merged in argument order
        remotes: Vec<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Build { configs, out_dir } => build(&configs, &out_dir),
        Commands::Inspect { manifest } => inspect(&manifest),
        Commands::Resolve { host, remotes } => resolve(&host, &remotes),
    }
}

fn build(configs: &[PathBuf], out_dir: &str) -> Result<()> {
    let mut artifacts: Vec<BuildArtifacts> = Vec::new();
    for config_path in configs {
        let config = load_config(config_path)?;
        let workspace_root = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let options = BuildOptions {
            out_dir: workspace_root.join(out_dir),
            workspace_root,
        };
        let built = build_bundle(&config, &options)?;
        println!(
            "Built bundle '{}': {} exposed, {} shared -> {}",
            built.manifest.name,
            built.manifest.exposes.len(),
            built.manifest.shared.len(),
            built.manifest_path.display()
        );
        artifacts.push(built);
    }
    check_build_conflicts(&artifacts)?;
    Ok(())
}

fn inspect(path: &PathBuf) -> Result<()> {
    let manifest = read_manifest(path)?;
    println!("Bundle: {}", manifest.name);
    println!("Exposes:");
    if manifest.exposes.is_empty() {
        println!("  (none)");
    }
    for exposed in &manifest.exposes {
        println!("  {} -> {}", exposed.key, exposed.out_file_name);
    }
    println!("Shared:");
    if manifest.shared.is_empty() {
        println!("  (none)");
    }
    for shared in &manifest.shared {
        println!(
            "  {} {} (singleton: {}, strictVersion: {}, requiredVersion: {})",
            shared.package_name,
            shared.version.as_deref().unwrap_or("unspecified"),
            shared.singleton,
            shared.strict_version,
            shared.required_version.as_deref().unwrap_or("auto"),
        );
    }
    Ok(())
}

fn resolve(host_path: &PathBuf, remotes: &[String]) -> Result<()> {
    let host = read_manifest(host_path)?;
    let mut resolver = SharedResolver::new();
    resolver.register(&host.name, &host, "./remoteEntry.json")?;

    for pair in remotes {
        let Some((name, path)) = pair.split_once('=') else {
            bail!("invalid remote '{pair}': expected name=path");
        };
        let manifest = read_manifest(&PathBuf::from(path))?;
        resolver.register(name, &manifest, &format!("./{name}/remoteEntry.json"))?;
    }

    println!("{}", serde_json::to_string_pretty(resolver.import_map())?);
    Ok(())
}

fn read_manifest(path: &PathBuf) -> Result<RemoteManifest> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    let manifest: RemoteManifest = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse manifest {}", path.display()))?;
    Ok(manifest)
}
