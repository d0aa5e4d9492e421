//! Frame randomizer server entry point

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use frame_randomizer_api_server::{start_server, ApiState};
use frame_randomizer_common::load_config;
use frame_randomizer_orchestrator::FrameRandomizer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "frame-randomizer")]
#[command(about = "Serves random frames from a show's episodes for guessing games")]
#[command(version)]
struct Args {
    /// Config file (TOML). Falls back to $FR_CONFIG, then ./frame-randomizer.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind address, overrides `bind_addr` from the config
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "frame_randomizer=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config_path = args
        .config
        .or_else(|| std::env::var_os("FR_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("frame-randomizer.toml"));
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    let addr = args.bind.unwrap_or_else(|| config.bind_addr.clone());

    let randomizer = Arc::new(
        FrameRandomizer::start(&config)
            .await
            .context("Failed to start frame randomizer")?,
    );

    tracing::info!("Starting frame randomizer server");
    let state = ApiState::new(Arc::clone(&randomizer));
    tokio::select! {
        result = start_server(&addr, state) => {
            result.with_context(|| format!("Server on {addr} failed"))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }
    randomizer.shutdown();

    Ok(())
}
