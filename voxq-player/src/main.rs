//! voxq player - Main entry point
//!
//! Loads configuration, restores the saved queue, serves the control API
//! and saves state again on shutdown.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use voxq_common::config::{self, TomlConfig, ROOT_FOLDER_ENV};
use voxq_common::events::EventBus;
use voxq_player::api;
use voxq_player::gateway::StaticGateway;
use voxq_player::store::StateStore;
use voxq_player::{Error, MusicPlayer};

const DEFAULT_PORT: u16 = 5750;
const DEFAULT_LOG_FILTER: &str = "voxq_player=info,tower_http=info";

/// Command-line arguments for voxq-player
#[derive(Parser, Debug)]
#[command(name = "voxq-player")]
#[command(about = "Queue-driven voice channel music player")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "VOXQ_PORT")]
    port: Option<u16>,

    /// Root folder for saved state
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Config file (default: <config_dir>/voxq/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(config::default_config_path);
    let toml_config = config::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;

    init_tracing(&toml_config);

    let root_folder =
        config::resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV, &toml_config);
    tokio::fs::create_dir_all(&root_folder)
        .await
        .with_context(|| format!("Failed to create root folder {}", root_folder.display()))?;
    let port = args.port.or(toml_config.port).unwrap_or(DEFAULT_PORT);

    info!("Starting voxq player on port {}", port);
    info!("Root folder: {}", root_folder.display());

    let gateway = Arc::new(StaticGateway::new(toml_config.channels.clone()));
    let player = MusicPlayer::from_config(&toml_config, gateway, EventBus::default());

    let store = StateStore::new(&root_folder);
    if let Some(state) = store.load().await {
        if let Err(e) = player.restore_state(state).await {
            warn!("Failed to restore saved state: {}", e);
        }
    }

    let shutdown = CancellationToken::new();
    let autosave = tokio::spawn(autosave_loop(
        player.clone(),
        store.clone(),
        Duration::from_secs(toml_config.playback.autosave_secs),
        shutdown.clone(),
    ));

    let app = api::create_router(api::AppContext {
        player: player.clone(),
        root_folder: root_folder.to_string_lossy().to_string(),
        port,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    shutdown.cancel();
    if let Err(e) = autosave.await {
        warn!("Autosave task ended abnormally: {}", e);
    }

    match player.stop().await {
        Ok(()) | Err(Error::NotRunning) => {}
        Err(e) => warn!("Failed to stop scheduler: {}", e),
    }
    store
        .save(&player.snapshot_state().await)
        .await
        .context("Failed to save state")?;

    info!("Server shutdown complete");
    Ok(())
}

/// `RUST_LOG` wins, then the config `log_level`, then the built-in filter
fn init_tracing(toml_config: &TomlConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| match &toml_config.log_level {
            Some(level) => EnvFilter::try_new(level),
            None => EnvFilter::try_new(DEFAULT_LOG_FILTER),
        })
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Save state every `period` until shutdown; a zero period disables it
async fn autosave_loop(
    player: MusicPlayer,
    store: StateStore,
    period: Duration,
    shutdown: CancellationToken,
) {
    if period.is_zero() {
        return;
    }

    let mut ticker = tokio::time::interval(period);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {
                if let Err(e) = store.save(&player.snapshot_state().await).await {
                    error!("Autosave failed: {}", e);
                }
            }
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
