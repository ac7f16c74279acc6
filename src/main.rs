// src/main.rs

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tuf_repo::{RepoConfig, RepoLayout, Repository};

#[derive(Parser)]
#[command(name = "tuf-repo")]
#[command(author, version, about = "Self-maintaining TUF update repository", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Repository directory (overrides storage.root)
    #[arg(short, long)]
    root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RepoConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => RepoConfig::default(),
    };
    if let Some(root) = cli.root {
        config.storage.root = root;
    }
    config.validate().context("Invalid configuration")?;

    let layout = RepoLayout::new(config.storage_root());
    info!("Opening repository at {}", layout.root().display());

    // Key derivation and signature checks are CPU-bound
    let open_config = config.clone();
    let repo = tokio::task::spawn_blocking(move || Repository::open(layout, open_config))
        .await
        .context("Repository open task panicked")?
        .context("Failed to open repository")?;

    tuf_repo::server::run_server(config, repo).await
}
