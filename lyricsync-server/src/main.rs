//! lyricsync-server - synchronized lyrics lookup service
//!
//! Subcommands:
//! - `serve` (default): HTTP API
//! - `lookup`: resolve one video id and print the JSON response
//! - `purge`: remove every cached entry for one video id

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lyricsync_common::config::resolve_root_folder;
use lyricsync_common::db::init_database;
use lyricsync_server::cache::FsBlobStore;
use lyricsync_server::config::ServiceConfig;
use lyricsync_server::metadata::NoopMetadataResolver;
use lyricsync_server::orchestrator::LyricsRequest;
use lyricsync_server::pending::PendingOps;
use lyricsync_server::services::MusixmatchSession;
use lyricsync_server::{build_cache, build_orchestrator, build_router, AppState};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for lyricsync-server
#[derive(Parser, Debug)]
#[command(name = "lyricsync-server")]
#[command(about = "Synchronized lyrics lookup service")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Root folder holding the database and blob store
    #[arg(short, long, global = true)]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind
        #[arg(long)]
        bind: Option<String>,
    },
    /// Resolve lyrics for one video id and print them
    Lookup {
        video_id: String,
        #[arg(long)]
        song: Option<String>,
        #[arg(long)]
        artist: Option<String>,
        #[arg(long)]
        album: Option<String>,
        /// Duration in seconds
        #[arg(long)]
        duration: Option<u32>,
        #[arg(long)]
        force_metadata_refetch: bool,
    },
    /// Remove every cached entry for one video id
    Purge { video_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ServiceConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config)?;

    info!("Starting lyricsync-server v{} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_HASH"));

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), config.root_folder.as_deref());
    std::fs::create_dir_all(&root_folder)
        .with_context(|| format!("Failed to create root folder {}", root_folder.display()))?;

    let command = args.command.unwrap_or(Command::Serve {
        port: None,
        bind: None,
    });
    if let Command::Serve { port, bind } = &command {
        if let Some(port) = port {
            config.server.port = *port;
        }
        if let Some(bind) = bind {
            config.server.bind_address = bind.clone();
        }
    }
    config.log_summary(&root_folder);

    let db_path = root_folder.join("lyricsync.db");
    info!("Database: {}", db_path.display());
    let pool = init_database(&db_path).await.context("Failed to open database")?;

    let blobs = Arc::new(FsBlobStore::new(root_folder.join("blobs")));
    let cache = build_cache(pool, blobs, &config);

    let session = Arc::new(MusixmatchSession::with_max_attempts(config.upstream.max_token_attempts));
    let orchestrator = Arc::new(
        build_orchestrator(&config, cache.clone(), session, Arc::new(NoopMetadataResolver))
            .context("Failed to build upstream clients")?,
    );

    match command {
        Command::Serve { .. } => serve(AppState::new(orchestrator, cache, config.server.clone())).await,
        Command::Lookup {
            video_id,
            song,
            artist,
            album,
            duration,
            force_metadata_refetch,
        } => {
            let request = LyricsRequest {
                video_id,
                song,
                artist,
                album,
                duration,
                force_metadata_refetch,
            };
            let pending = PendingOps::new();
            let response = orchestrator.get_lyrics(request, &pending).await;
            pending.drain().await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Command::Purge { video_id } => {
            let summary = cache.delete_all(&video_id).await.context("Purge failed")?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
    }
}

fn init_tracing(config: &ServiceConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "lyricsync_server={level},lyricsync_common={level},tower_http={level}",
            level = config.logging.level
        )
        .into()
    });

    let (stderr_layer, file_layer) = match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(Arc::new(file))
                .with_ansi(false);
            (None, Some(layer))
        }
        None => (Some(tracing_subscriber::fmt::layer()), None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

async fn serve(state: AppState) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.server.bind_address, state.server.port)
        .parse()
        .context("Invalid bind address")?;

    let app = build_router(state.clone());

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!(
        pending = state.background.len(),
        "Waiting for background operations"
    );
    state.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
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
