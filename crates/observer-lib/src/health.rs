//! Backend health probes for liveness and readiness
//!
//! The cluster API is critical: without it no tool can answer. The metrics
//! backend only degrades the service, since discovery and health tools keep
//! working without it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::tools::ToolContext;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Component is functioning normally
    Healthy,
    /// Component is experiencing issues but still operational
    Degraded,
    /// Component has failed
    Unhealthy,
}

impl ComponentStatus {
    /// Returns true if the component is at least partially operational
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

/// Information about a component's health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    pub fn healthy() -> Self {
        Self::with_status(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Unhealthy, Some(message.into()))
    }

    fn with_status(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status across components; empty is healthy
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        let mut has_degraded = false;

        for health in components.values() {
            match health.status {
                ComponentStatus::Unhealthy => return ComponentStatus::Unhealthy,
                ComponentStatus::Degraded => has_degraded = true,
                ComponentStatus::Healthy => {}
            }
        }

        if has_degraded {
            ComponentStatus::Degraded
        } else {
            ComponentStatus::Healthy
        }
    }

    fn from_components(components: HashMap<String, ComponentHealth>) -> Self {
        Self {
            status: Self::compute_status(&components),
            components,
        }
    }
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names reported by [`check_health`]
pub mod components {
    pub const KUBERNETES: &str = "kubernetes";
    pub const PROMETHEUS: &str = "prometheus";
}

async fn probe_cluster(ctx: &ToolContext) -> ComponentHealth {
    match ctx.cluster.list_namespaces().await {
        Ok(_) => ComponentHealth::healthy(),
        Err(err) => {
            warn!(component = components::KUBERNETES, error = %err, "Health probe failed");
            ComponentHealth::unhealthy(err.to_string())
        }
    }
}

async fn probe_metrics(ctx: &ToolContext) -> ComponentHealth {
    if ctx.metrics.is_healthy().await {
        ComponentHealth::healthy()
    } else {
        warn!(component = components::PROMETHEUS, "Health probe failed");
        ComponentHealth::degraded("Prometheus health endpoint did not respond")
    }
}

/// Probe both backends
pub async fn check_health(ctx: &ToolContext) -> HealthResponse {
    let (cluster, metrics) = tokio::join!(probe_cluster(ctx), probe_metrics(ctx));

    let mut components = HashMap::new();
    components.insert(components::KUBERNETES.to_string(), cluster);
    components.insert(components::PROMETHEUS.to_string(), metrics);
    HealthResponse::from_components(components)
}

/// Ready when the cluster API answers
pub async fn check_readiness(ctx: &ToolContext) -> ReadinessResponse {
    let cluster = probe_cluster(ctx).await;
    if cluster.status.is_operational() {
        ReadinessResponse {
            ready: true,
            reason: None,
        }
    } else {
        ReadinessResponse {
            ready: false,
            reason: Some(format!(
                "Kubernetes API unreachable: {}",
                cluster.message.unwrap_or_default()
            )),
        }
    }
}
