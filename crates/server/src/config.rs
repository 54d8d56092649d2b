//! Server configuration

use anyhow::{Context, Result};
use serde::Deserialize;

/// Settings owned by the server binary; tool settings live in `ObserverConfig`
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Port for the tool, health and metrics endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

fn default_api_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
        }
    }
}

impl ServerConfig {
    /// Load from `OBSERVER_*` environment variables
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("OBSERVER").try_parsing(true))
            .build()?;

        config
            .try_deserialize()
            .context("Invalid server configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port() {
        assert_eq!(ServerConfig::default().api_port, 8080);
    }
}
