//! ModSync RPC Server - JSON-RPC backend for the desktop UI.
//!
//! This binary provides a JSON-RPC 2.0 server that wraps the modsync-core
//! engine, plus a server-sent-event stream carrying sync and download events.

mod handlers;
mod server;
mod wrapper;

use anyhow::{Context, Result};
use clap::Parser;
use modsync_core::{ModSync, SyncOutcome};
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "modsync-rpc")]
#[command(about = "JSON-RPC server for the ModSync engine")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Data directory (defaults to the platform data directory)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Game install directory (defaults to Steam library detection)
    #[arg(long)]
    game_path: Option<PathBuf>,

    /// Do not start a catalog sync on startup
    #[arg(long)]
    no_auto_sync: bool,
}

fn init_logging(args: &Args) {
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_ascii_lowercase()));

    // stdout carries the RPC_PORT handshake, so logs go to stderr
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false);

    if args.json_logs {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

fn default_data_dir() -> Result<PathBuf> {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .map(|dir| dir.join(modsync_core::config::PathsConfig::DATA_DIR_NAME))
        .context("could not determine a data directory; pass --data-dir")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    info!("Starting ModSync RPC Server");

    let data_dir = match args.data_dir.clone() {
        Some(path) => path,
        None => default_data_dir()?,
    };
    info!("Data directory: {}", data_dir.display());

    let mut builder = ModSync::builder(&data_dir).auto_create_dirs(true);
    builder = match args.game_path.clone() {
        Some(path) => builder.game_path(path),
        None => builder.detect_game(true),
    };
    let engine = builder.build().await?;

    match engine.game_path() {
        Some(path) => info!("Game install: {}", path.display()),
        None => warn!("No game install found; install management is disabled"),
    }

    // Start the server
    let addr = server::start_server(engine.clone(), &args.host, args.port).await?;

    // Print port for the UI process to read (intentional stdout for IPC)
    println!("RPC_PORT={}", addr.port());

    info!("RPC server running on {}", addr);

    if !args.no_auto_sync && engine.needs_sync()? {
        info!("Catalog is stale; syncing in the background");
        let sync = engine.spawn_full_sync();
        tokio::spawn(async move {
            match sync.await {
                Ok(SyncOutcome::Finished { .. }) => info!("Startup sync finished"),
                Ok(SyncOutcome::AlreadyRunning) => {}
                Err(e) => warn!("Startup sync task failed: {}", e),
            }
        });
    }

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}
