//! Pakorder CLI - synthesize modsettings.lsx from an installed mod list.
//!
//! The host mod manager normally drives the pakorder library directly;
//! this binary covers scripted and standalone use. It reads a JSON mod
//! list manifest (ordered by display priority, highest first), runs the
//! extraction pipeline against the given profile directory, and writes
//! the settings document there.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pakorder::{DivineInspector, ModEntry, ModState, Profile, SettingsGenerator};

#[derive(Debug, Parser)]
#[command(name = "pakorder", version, about = "Deterministic modsettings.lsx synthesis")]
struct Args {
    /// Path to the mod list manifest (JSON array, priority order).
    modlist: PathBuf,

    /// Profile directory receiving modsCache.json and modsettings.lsx.
    #[arg(long)]
    profile: PathBuf,

    /// Path to the Divine executable.
    #[arg(long)]
    divine: PathBuf,

    /// Game identifier passed to Divine.
    #[arg(long, default_value = "bg3")]
    game: String,

    /// Concurrent extraction workers (default: CPU count, capped at 4).
    #[arg(long)]
    workers: Option<usize>,

    /// Increase log verbosity (-v: debug, -vv: trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// One mod in the manifest file.
#[derive(Debug, Deserialize)]
struct ManifestEntry {
    name: String,
    pak_dir: PathBuf,
    #[serde(default = "default_true")]
    active: bool,
    #[serde(default = "default_true")]
    manages_order: bool,
}

fn default_true() -> bool {
    true
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pakorder={default_level}")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_modlist(path: &PathBuf) -> Result<Vec<ModEntry>, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read mod list {}: {e}", path.display()))?;
    let manifest: Vec<ManifestEntry> = serde_json::from_str(&raw)
        .map_err(|e| format!("invalid mod list {}: {e}", path.display()))?;

    Ok(manifest
        .into_iter()
        .map(|entry| {
            ModEntry::new(
                entry.name,
                entry.pak_dir,
                ModState::new(entry.active, entry.manages_order),
            )
        })
        .collect())
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mods = load_modlist(&args.modlist)?;
    info!(mods = mods.len(), profile = %args.profile.display(), "starting generation");

    let inspector = Arc::new(DivineInspector::new(&args.divine).with_game(&args.game));
    let profile = Profile::new(&args.profile);
    let generator = match args.workers {
        Some(workers) => SettingsGenerator::with_workers(inspector, profile, workers),
        None => SettingsGenerator::new(inspector, profile),
    };

    let generated = generator.run(&mods).await?;
    if generated.degraded() > 0 {
        info!(degraded = generated.degraded(), "some packages degraded to empty records");
    }
    println!("{}", generated.path.display());

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
