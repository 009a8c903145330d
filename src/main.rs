//! Courier - push notification dispatch service.
//!
//! Wires the device registry, gateway client and fan-out dispatcher
//! together and runs the operational HTTP endpoints until shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use courier::config::{self, AppConfig};
use courier::metrics::Metrics;
use courier::push::{Dispatcher, ExpoClient, RetryConfig};
use courier::registry::{DeviceRegistry, MemoryStore};
use courier::server::HealthServer;
use courier::shutdown::{self, ShutdownHandler};

/// Courier - push notification dispatch service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = AppConfig::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config))?;

    // Initialize logging
    init_logging(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config_path = %args.config,
        "Starting Courier"
    );

    if config.gateway.url.is_empty() {
        anyhow::bail!("Push gateway URL is required");
    }

    // Initialize metrics
    let metrics = if config.metrics.enabled {
        let metrics = Metrics::new().context("Failed to create metrics")?;
        metrics.init_server_info(env!("CARGO_PKG_VERSION"));
        Some(metrics)
    } else {
        None
    };

    // Create the device registry over the in-memory store
    let mut registry = DeviceRegistry::new(Arc::new(MemoryStore::new()));
    if let Some(ref m) = metrics {
        registry = registry.with_metrics(m.clone());
    }
    let registry = Arc::new(registry);

    // Create the gateway client
    let gateway = ExpoClient::new(config.gateway.clone())
        .context("Failed to create push gateway client")?;
    info!(url = %gateway.url(), "Push gateway client initialized");

    // Create the fan-out dispatcher. No user resolver is wired here;
    // filtered dispatch needs a directory backend the binary does not
    // carry, so only library consumers get send_by_filter.
    let mut dispatcher = Dispatcher::new(
        registry.clone(),
        Arc::new(gateway),
        RetryConfig::from(&config.retry),
        config.dispatch.max_concurrent,
    );
    if let Some(ref m) = metrics {
        dispatcher = dispatcher.with_metrics(m.clone());
    }
    let dispatcher = Arc::new(dispatcher);

    // Initialize shutdown handler
    let shutdown = ShutdownHandler::new();

    // Start health server
    let health_server = HealthServer::new(
        config.health.clone(),
        registry.clone(),
        !config.gateway.url.is_empty(),
        metrics.clone(),
    );

    let health_shutdown = shutdown.subscribe();
    let health_handle = tokio::spawn(async move {
        if let Err(e) = health_server.run(health_shutdown).await {
            error!(error = %e, "Health server error");
        }
    });

    info!("Courier running");

    // Wait for shutdown signal
    shutdown.wait_for_signal().await;

    info!("Initiating graceful shutdown");

    // Stop starting new retry waits and drain in-flight deliveries
    let deadline = Duration::from_secs(config.dispatch.shutdown_timeout_secs);
    shutdown::graceful_shutdown(deadline, || async {
        dispatcher.wait_for_completion().await;
    })
    .await;

    if let Err(e) = health_handle.await {
        warn!(error = %e, "Health server task failed");
    }

    info!("Courier stopped");
    Ok(())
}

/// Initialize the tracing subscriber based on configuration.
fn init_logging(config: &config::LoggingConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        "pretty" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().pretty())
                .init();
        }
        "off" => {
            // No logging
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }

    Ok(())
}
