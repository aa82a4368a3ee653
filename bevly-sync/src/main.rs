//! bevly-sync - beverage menu crawler and metadata service
//!
//! Crawls configured venue menus, enriches each beverage from the configured
//! metadata sources, and serves provider menus as JSON.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bevly_common::config::load_config;
use bevly_common::events::EventBus;
use bevly_common::time::{Clock, SystemClock};
use bevly_sync::gc::GarbageCollector;
use bevly_sync::orchestrator::{SyncOrchestrator, Syncer};
use bevly_sync::policy::SyncPolicy;
use bevly_sync::repository::{Repository, SqliteRepository};
use bevly_sync::scheduler::{ScheduleConfig, SyncScheduler};
use bevly_sync::sources::{
    json_menu, metadata_sources_from_config, JsonMenuSource, MenuSourceRegistry,
};
use bevly_sync::AppState;
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for bevly-sync
#[derive(Parser, Debug)]
#[command(name = "bevly-sync")]
#[command(about = "Beverage menu crawler and metadata service")]
#[command(version)]
struct Args {
    /// Path to TOML config file
    #[arg(short, long, env = "BEVLY_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address (overrides config)
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting bevly-sync");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", config.database_path.display());

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let policy = SyncPolicy::from_config(&config.sync, clock.clone())?;
    let repo: Arc<dyn Repository> = Arc::new(
        SqliteRepository::open(&config.database_path, policy)
            .await
            .context("Failed to open database")?,
    );

    for provider in &config.providers {
        repo.register_provider(provider).await?;
        info!(provider = %provider.id, format = %provider.menu_format, "Registered provider");
    }

    let event_bus = EventBus::new(100);

    let scheduler = if config.sync_enabled() {
        info!("Creating sync scheduler");
        let menus = MenuSourceRegistry::new().with(json_menu::FORMAT, Arc::new(JsonMenuSource::new()?));
        let metadata = metadata_sources_from_config(&config.metadata_sources)?;
        let syncer = Syncer::new(repo.clone(), menus, metadata)
            .with_clock(clock)
            .with_events(event_bus.clone());
        let orchestrator = Arc::new(SyncOrchestrator::spawn(syncer));
        let gc = Arc::new(GarbageCollector::new(repo.clone(), event_bus.clone()));
        Some(
            SyncScheduler::start(orchestrator, gc, ScheduleConfig::from_sync_config(&config.sync))
                .await,
        )
    } else {
        info!("Sync is disabled");
        None
    };

    let state = AppState::new(repo, scheduler.as_ref().map(|s| s.orchestrator().clone()));
    let app = bevly_sync::build_router(state);

    let addr = args.listen.unwrap_or(config.listen_addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(scheduler) = scheduler {
        info!("Waiting for the current sync pass to finish");
        scheduler.shutdown().await;
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install signal handler: {}", e);
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
