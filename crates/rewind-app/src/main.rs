use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rewind_app::App;
use rewind_core::emitter::Emitter;
use rewind_core::RewindConfig;

#[derive(Parser)]
#[command(name = "rewind", about = "Desktop memory agent pipeline", version)]
struct Args {
    /// Path to rewind.toml (default: platform config dir)
    #[arg(long)]
    config: Option<String>,

    /// Do not start the background pipeline, only serve queries.
    #[arg(long)]
    no_pipeline: bool,
}

/// Headless emitter: notifications become log lines. A desktop host
/// replaces this with its own bridge to the UI.
struct LogEmitter;

impl Emitter for LogEmitter {
    fn emit(&self, event: &str, payload: serde_json::Value) {
        info!(event, %payload, "notification");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = RewindConfig::load(args.config.as_deref()).context("loading config")?;

    let app = Arc::new(App::new(config, Arc::new(LogEmitter)).context("initialising app")?);
    info!(db = %app.db_path().display(), "rewind initialised");

    if !args.no_pipeline {
        match app.start_system().await {
            Ok(()) => info!("pipeline running"),
            Err(e) => warn!("pipeline not started: {e} (configure and select a model first)"),
        }
    }

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown signal received");

    // Idempotent: a second signal-driven call would be a no-op.
    app.stop_system().await;
    Ok(())
}
