/// Main application entry point
mod buffers;
mod clients;
mod config;
mod domain;
mod errors;
mod handlers;
mod routes;
mod services;
mod utils;

use crate::clients::{CommandClient, ConnectionManager};
use crate::config::AppConfig;
use crate::handlers::AppState;
use crate::routes::build_router;
use crate::services::TelemetryEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use url::Url;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    // Load configuration
    let config = AppConfig::from_env()?;
    info!("Configuration loaded successfully");

    // Initialize the reconciliation engine
    let engine = Arc::new(TelemetryEngine::new(&config));

    // Initialize the command channel
    let commands = Arc::new(
        CommandClient::new(config.command_api_url.clone())
            .map_err(|e| anyhow::anyhow!("command client init failed: {e}"))?,
    );

    // Shutdown signal observed by every background loop
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start background tasks
    start_background_tasks(&config, engine.clone(), shutdown_rx)?;

    // Initialize application state
    let state = AppState {
        engine: engine.clone(),
        commands,
    };

    // Build router
    let app = build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!("groundlink engine listening on {}", config.listen_addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;

    // Cancel pending reconnects and timer loops exactly once
    let _ = shutdown_tx.send(true);

    Ok(())
}

/// Start the stream reader and the fixed-cadence samplers
fn start_background_tasks(
    config: &AppConfig,
    engine: Arc<TelemetryEngine>,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    // Background task: telemetry stream
    {
        let url = Url::parse(&config.telemetry_ws_url)?;
        let delay = Duration::from_millis(config.timings.reconnect_delay_ms);
        let manager = ConnectionManager::new(url, delay, engine.clone(), shutdown.clone());
        tokio::spawn(async move {
            info!("Starting telemetry stream task");
            manager.run().await;
        });
    }

    // Background task: throughput sampler
    {
        let engine = engine.clone();
        let mut shutdown = shutdown.clone();
        let cadence = Duration::from_millis(config.timings.throughput_sample_ms);
        tokio::spawn(async move {
            info!("Starting throughput sampler (every {:?})", cadence);
            let mut ticker = tokio::time::interval(cadence);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => return,
                    _ = ticker.tick() => engine.sample_throughput(),
                }
            }
        });
    }

    // Background task: protocol stack sequencer ticks
    {
        let engine = engine.clone();
        let mut shutdown = shutdown.clone();
        let cadence = Duration::from_millis(config.timings.sequencer_tick_ms);
        tokio::spawn(async move {
            info!("Starting sequencer ticker (every {:?})", cadence);
            let mut ticker = tokio::time::interval(cadence);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => return,
                    _ = ticker.tick() => engine.tick_sequencer(),
                }
            }
        });
    }

    info!("All background tasks started successfully");
    Ok(())
}
