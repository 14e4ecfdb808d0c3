#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::path::PathBuf;

use catchment::controller::Catchment;
use clap::Parser;

/// SMTP capture server
#[derive(Parser, Debug)]
#[command(name = "catchment", version)]
struct Cli {
    /// Configuration file, overriding the usual search
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => find_config_file()?,
    };

    let catchment = Catchment::load(&config_path)?;
    catchment.run().await
}

/// Find the configuration file using the following precedence:
/// 1. `CATCHMENT_CONFIG` environment variable
/// 2. ./catchment.config.ron (current working directory)
/// 3. /etc/catchment/catchment.config.ron (system-wide config)
fn find_config_file() -> anyhow::Result<PathBuf> {
    if let Ok(env_path) = std::env::var("CATCHMENT_CONFIG") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "CATCHMENT_CONFIG points to non-existent file: {}",
            path.display()
        );
    }

    let default_paths = [
        PathBuf::from("./catchment.config.ron"),
        PathBuf::from("/etc/catchment/catchment.config.ron"),
    ];

    if let Some(path) = default_paths.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  \
         - CATCHMENT_CONFIG environment variable\n{paths_tried}"
    )
}
