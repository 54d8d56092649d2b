//! Observer Server - analytical tool server for Kubernetes and Prometheus
//!
//! Serves the observer tools over HTTP together with liveness, readiness
//! and Prometheus metrics endpoints.

use anyhow::{Context, Result};
use observer_lib::{
    clients::{KubeClient, PrometheusClient},
    observability::{StructuredLogger, ToolMetrics},
    ObserverConfig, ToolContext,
};
use observer_server::{api, config::ServerConfig};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting observer-server");

    let server_config = ServerConfig::load()?;
    let config = ObserverConfig::load().context("Failed to load observer configuration")?;
    info!(
        prometheus_url = %config.prometheus_url,
        default_namespace = %config.default_namespace,
        "Observer configured"
    );

    let cluster = KubeClient::new(&config)
        .await
        .context("Failed to create Kubernetes client")?;
    let metrics = PrometheusClient::new(&config).context("Failed to create Prometheus client")?;

    // Register tool metrics before the first scrape
    ToolMetrics::new();

    let logger = StructuredLogger::new("observer-server");
    logger.log_startup(SERVER_VERSION, &config.prometheus_url);

    let ctx = ToolContext::new(config, Arc::new(cluster), Arc::new(metrics));
    let app_state = Arc::new(api::AppState::new(ctx));

    let api_handle = tokio::spawn(api::serve(server_config.api_port, app_state));

    tokio::select! {
        result = api_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("API server stopped"),
                Ok(Err(err)) => {
                    error!(error = %err, "API server failed");
                    return Err(err);
                }
                Err(err) => return Err(err).context("API server task panicked"),
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
    }

    info!("Shutting down");
    Ok(())
}
