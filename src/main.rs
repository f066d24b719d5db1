use anyhow::{Context, Result};
use conveyor::config::{load_config, ConveyorConfig};
use conveyor::display::{BroadcastRenderer, ConsoleRenderer, FanoutRenderer};
use conveyor::persist::{HttpPersister, SnapshotLoader};
use conveyor::topic::AssetId;
use conveyor::TelemetryEngine;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conveyor=info".into()),
        )
        .init();

    info!("Conveyor starting...");

    // File first, environment on top
    let mut config = match std::env::var("CONVEYOR_CONFIG") {
        Ok(path) => load_config(&path).with_context(|| format!("Failed to load {}", path))?,
        Err(_) => ConveyorConfig::default(),
    };
    config.apply_env();

    let asset_id = AssetId::new(&config.asset.id)
        .context("An asset id is required (CONVEYOR_ASSET_ID or [asset] id)")?;

    info!(
        asset_id = %asset_id,
        broker = %config.broker.url,
        api_base = %config.persistence.api_base,
        "Configuration loaded"
    );

    let initial = if config.persistence.load_initial_snapshot {
        let loader =
            SnapshotLoader::new(&config.persistence.api_base).with_timeout(config.persistence_timeout());
        Some(loader.fetch(&asset_id).await)
    } else {
        None
    };

    let persister = Arc::new(
        HttpPersister::new(&config.persistence.api_base)
            .with_method(config.persistence.method)
            .with_csrf_token(config.persistence.csrf_token.clone())
            .with_timeout(config.persistence_timeout()),
    );

    let broadcast = Arc::new(BroadcastRenderer::default());
    let mut display_rx = broadcast.subscribe();
    let renderer = Arc::new(
        FanoutRenderer::new()
            .with(Arc::new(
                ConsoleRenderer::stdout().with_notification_ttl(config.notification_ttl()),
            ))
            .with(broadcast),
    );

    // Display events as JSON lines, for anything tailing the debug log
    let display_feed = tokio::spawn(async move {
        loop {
            match display_rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => debug!(target: "conveyor::display", "{}", line),
                    Err(e) => warn!(error = %e, "Failed to encode display event"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Display feed lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let engine = TelemetryEngine::start(&config, persister, renderer, initial)
        .context("Failed to start telemetry engine")?;

    let session = engine
        .connect()
        .await
        .context("Failed to connect to broker")?;

    info!(
        session_id = %session.id(),
        topic = %engine.topic(),
        "Listening for operational data"
    );

    let mut states = engine.watch_connection();
    let watcher = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            info!(state = %state, "Connection state changed");
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutdown signal received");

    match engine.shutdown().await {
        Some(store) => info!(
            merges = store.merge_count(),
            fields = store.canonical().len(),
            "Conveyor stopped"
        ),
        None => warn!("Conveyor stopped without a final state"),
    }
    watcher.abort();
    display_feed.abort();

    Ok(())
}
