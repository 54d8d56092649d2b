//! Load Backend - synthetic CPU, memory and I/O load service

use anyhow::Result;
use load_backend::AppState;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Deserialize)]
struct BackendConfig {
    #[serde(default = "default_port")]
    port: u16,
}

fn default_port() -> u16 {
    8000
}

impl BackendConfig {
    /// Load from `LOAD_BACKEND_*` environment variables
    fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("LOAD_BACKEND").try_parsing(true))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = BackendConfig::load()?;
    info!(port = config.port, "Starting load-backend");

    let state = Arc::new(AppState::default());

    tokio::select! {
        result = load_backend::serve(config.port, state) => result?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutting down");
        }
    }

    Ok(())
}
