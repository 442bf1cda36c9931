//! mixtape-merge - audio queue merge service
//!
//! Accepts per-owner queues of audio references over HTTP, merges a queue into
//! one output file with ffmpeg and streams job progress over SSE.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mixtape_common::config::{find_config_file, load_toml_config, resolve_data_folder};
use mixtape_common::events::EventBus;
use mixtape_merge::config::{ConfigOverrides, DataPaths, MergeConfig, CONFIG_FILE_NAME};
use mixtape_merge::orchestrator::maintenance::{spawn_eviction_sweep, spawn_snapshot_writer};
use mixtape_merge::orchestrator::{OutboxSink, Orchestrator};
use mixtape_merge::quality::{FfprobeProber, QualityAnalyzer};
use mixtape_merge::session::SessionStore;
use mixtape_merge::source::{
    Classifier, PlatformDownloader, ResourceLedger, SourceResolver, WorkArea,
};
use mixtape_merge::transcode::MergeEngine;
use mixtape_merge::AppState;

/// Command-line arguments for mixtape-merge
#[derive(Parser, Debug)]
#[command(name = "mixtape-merge")]
#[command(about = "Merges queued audio sources into one file")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "MIXTAPE_CONFIG")]
    config: Option<PathBuf>,

    /// Shared local-storage root
    #[arg(short, long, env = "MIXTAPE_STORAGE_ROOT")]
    storage_root: Option<PathBuf>,

    /// Folder for the session snapshot, work files and outbox
    #[arg(short, long, env = "MIXTAPE_DATA_FOLDER")]
    data_folder: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "MIXTAPE_PORT")]
    port: Option<u16>,

    /// Transcoder thread count
    #[arg(short, long, env = "MIXTAPE_THREADS")]
    threads: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = find_config_file(args.config.as_deref(), CONFIG_FILE_NAME)?;
    let config: MergeConfig = load_toml_config(config_path.as_deref())?;
    let data_folder = resolve_data_folder(
        args.data_folder.as_deref(),
        "MIXTAPE_DATA_FOLDER",
        config.data_folder.as_deref(),
    );
    let config = config.with_overrides(ConfigOverrides {
        storage_root: args.storage_root,
        data_folder: Some(data_folder.clone()),
        port: args.port,
        threads: args.threads,
    });

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "mixtape_merge={level},mixtape_common={level},tower_http={level}",
                    level = config.logging.level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting mixtape-merge v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Config file: {}", path.display()),
        None => info!("No config file found, using defaults"),
    }

    config.validate()?;
    let storage_root = config
        .storage_root()?
        .canonicalize()
        .context("Storage root is not accessible")?;
    info!("Storage root: {}", storage_root.display());
    info!("Data folder: {}", data_folder.display());

    let paths = DataPaths::new(&data_folder);
    tokio::fs::create_dir_all(&paths.root)
        .await
        .context("Failed to create data folder")?;

    let ledger = Arc::new(ResourceLedger::new());
    let work = WorkArea::new(paths.work_dir(), Arc::clone(&ledger));
    work.reset().await.context("Failed to prepare work directory")?;

    let event_bus = EventBus::new(256);
    let store = Arc::new(
        SessionStore::open(paths.snapshot_file(), config.queue_capacity)
            .await
            .with_event_bus(event_bus.clone()),
    );
    info!("Sessions restored: {}", store.len());

    let classifier = Classifier::new(config.local_endpoint_url()?, config.platform_hosts.clone());
    let resolver = SourceResolver::new(
        &storage_root,
        classifier,
        work.clone(),
        config.fetch_timeout(),
    )
    .with_platform_downloader(PlatformDownloader::new(&config.platform_downloader));
    let analyzer = QualityAnalyzer::new(Arc::new(FfprobeProber::new(&config.ffprobe_path)));
    let engine = MergeEngine::new(&config.ffmpeg_path, config.effective_threads(), work);

    let orchestrator = Orchestrator::new(
        Arc::clone(&store),
        Arc::new(resolver),
        Arc::new(analyzer),
        Arc::new(engine),
        event_bus,
    )
    .with_merge_timeout(config.merge_timeout());

    let cancel = CancellationToken::new();
    let snapshot_task =
        spawn_snapshot_writer(Arc::clone(&store), config.snapshot_interval(), cancel.clone());
    let eviction_task = spawn_eviction_sweep(
        orchestrator.clone(),
        config.session_ttl(),
        config.eviction_interval(),
        cancel.clone(),
    );

    let sink = Arc::new(OutboxSink::new(paths.outbox_dir(), "/outbox"));
    let state = AppState::new(orchestrator, sink, ledger, paths.outbox_dir());
    let app = mixtape_merge::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    cancel.cancel();
    let _ = eviction_task.await;
    let _ = snapshot_task.await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
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
