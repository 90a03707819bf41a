// Main entry point - Dependency injection and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::application::classifier::Classifier;
use crate::application::digest_service::DigestSweeper;
use crate::application::ingest_service::IngestService;
use crate::application::monitor_service::MonitorService;
use crate::application::sensor_repository::{HistoryStore, NotificationDispatcher};
use crate::infrastructure::config::{
    load_app_config, load_directory_config, AppConfig, BandPolicy, MonitorSettings, StorageBackend,
};
use crate::infrastructure::dataset::load_channels;
use crate::infrastructure::dispatcher::{
    BroadcastDispatcher, FanoutDispatcher, LogDispatcher, LogMonitorNotifier, WebhookDispatcher,
};
use crate::infrastructure::influx_repository::InfluxHistoryStore;
use crate::infrastructure::memory_store::InMemoryStore;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    health_check, notification_stream, sensor_history, submit_reading,
};

#[derive(Parser)]
#[command(name = "sensorwatch", version, about = "Sensor telemetry anomaly classification")]
struct Cli {
    /// Settings file, without extension
    #[arg(long, global = true, default_value = "config/app")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the ingestion HTTP service
    Serve,
    /// Replay a dataset against fixed bands around each channel's mean
    ///
    /// Values outside the band alert in both directions by default, so the
    /// channel [10, 10, 10, 50, 10] raises five alerts (four low, one high).
    /// With --high-only the same channel raises a single alert for the 50.
    Monitor {
        /// `.csv` or `.json` dataset
        dataset: PathBuf,
        /// Pause between evaluations
        #[arg(long)]
        delay_ms: Option<u64>,
        /// Band half-width as a fraction of the mean
        #[arg(long)]
        band: Option<f64>,
        /// Only alert on values above the band, ignoring low values
        #[arg(long)]
        high_only: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sensorwatch=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = load_app_config(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config))?;

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Monitor {
            dataset,
            delay_ms,
            band,
            high_only,
        } => {
            let mut settings = config.monitor;
            if let Some(delay_ms) = delay_ms {
                settings.delay_ms = delay_ms;
            }
            if let Some(band) = band {
                settings.band = band;
            }
            if high_only {
                settings.direction = BandPolicy::HighOnly;
            }
            monitor(dataset, settings).await
        }
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let directory = load_directory_config(&config.server.directory).with_context(|| {
        format!("Failed to load sensor directory from {}", config.server.directory)
    })?;
    tracing::info!(sensors = directory.sensors.len(), "Loaded sensor directory");

    // Create stores (infrastructure layer)
    let store = Arc::new(InMemoryStore::from_directory(directory));
    let history: Arc<dyn HistoryStore> = match config.storage.backend {
        StorageBackend::Memory => store.clone(),
        StorageBackend::Influx => {
            let influx = config
                .storage
                .influx
                .clone()
                .context("storage.backend is influx but storage.influx is not configured")?;
            tracing::info!(host = %influx.host, database = %influx.database, "Using InfluxDB history");
            Arc::new(InfluxHistoryStore::new(influx))
        }
    };

    let broadcast = BroadcastDispatcher::new(config.notifications.broadcast_capacity);
    let mut targets: Vec<Arc<dyn NotificationDispatcher>> =
        vec![Arc::new(broadcast.clone()), Arc::new(LogDispatcher)];
    if let Some(url) = config.notifications.webhook_url.clone() {
        tracing::info!(%url, "Forwarding alerts to webhook");
        targets.push(Arc::new(WebhookDispatcher::new(url)));
    }
    let dispatcher: Arc<dyn NotificationDispatcher> = Arc::new(FanoutDispatcher::new(targets));

    // Create services (application layer)
    let ingest_service = IngestService::new(
        history.clone(),
        store.clone(),
        store.clone(),
        dispatcher.clone(),
        Classifier::new(config.classifier.clone()),
    );
    let sweeper = DigestSweeper::new(history, store.clone(), store, dispatcher, config.alerts.clone());

    let cancel = CancellationToken::new();
    let digest_cancel = cancel.child_token();
    let digest_handle = tokio::spawn(async move { sweeper.run(digest_cancel).await });

    // Create application state
    let state = Arc::new(AppState {
        ingest_service,
        notifications: broadcast,
        shutdown: cancel.clone(),
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/sensors/readings", post(submit_reading))
        .route("/sensors/:id/history", get(sensor_history))
        .route("/notifications/stream", get(notification_stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.server.bind))?;
    tracing::info!(%addr, "Starting sensorwatch service");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    cancel.cancel();
    if tokio::time::timeout(Duration::from_secs(5), digest_handle).await.is_err() {
        tracing::warn!("Digest sweeper did not stop in time");
    }
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn monitor(dataset: PathBuf, settings: MonitorSettings) -> anyhow::Result<()> {
    let channels = load_channels(&dataset)?;

    let service = MonitorService::new(
        Arc::new(LogMonitorNotifier),
        settings.band,
        settings.direction,
        Duration::from_millis(settings.delay_ms),
    );

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    tracing::info!(
        channels = channels.len(),
        band = settings.band,
        delay_ms = settings.delay_ms,
        direction = ?settings.direction,
        "Starting batch monitor"
    );
    let report = service.run(channels, cancel).await;

    for channel in &report.channels {
        tracing::info!(
            channel = %channel.name,
            evaluated = channel.evaluated,
            alerts = channel.alerts,
            completed = channel.completed,
            "Channel finished"
        );
    }
    if report.completed() {
        tracing::info!(alerts = report.total_alerts(), "Monitor finished");
    } else {
        tracing::warn!(alerts = report.total_alerts(), "Monitor stopped before the end of the dataset");
    }

    Ok(())
}

/// Resolve on Ctrl-C and cancel `cancel` so background tasks wind down too.
async fn shutdown_signal(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl-C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl-C, shutting down");
    cancel.cancel();
}
