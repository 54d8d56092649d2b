//! Analytical tools
//!
//! Every tool takes a [`ToolContext`] plus a typed parameter struct and
//! returns exactly one [`ToolResponse`]. [`dispatch`] routes a tool call by
//! name with JSON arguments, which is what the HTTP server exposes.

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::clients::{ClusterSource, MetricsSource};
use crate::config::ObserverConfig;
use crate::envelope::{run_tool, Params, ToolResponse};
use crate::error::ToolError;

pub mod analysis;
pub mod discovery;
pub mod health;
pub mod metrics;

#[cfg(test)]
pub(crate) mod testing;

/// Shared handles passed to every tool call
#[derive(Clone)]
pub struct ToolContext {
    pub config: Arc<ObserverConfig>,
    pub cluster: Arc<dyn ClusterSource>,
    pub metrics: Arc<dyn MetricsSource>,
}

impl ToolContext {
    pub fn new(
        config: ObserverConfig,
        cluster: Arc<dyn ClusterSource>,
        metrics: Arc<dyn MetricsSource>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            cluster,
            metrics,
        }
    }
}

pub(crate) fn object_name(meta: &ObjectMeta) -> String {
    meta.name.clone().unwrap_or_default()
}

pub(crate) fn labels_of(meta: &ObjectMeta) -> BTreeMap<String, String> {
    meta.labels.clone().unwrap_or_default()
}

pub(crate) fn created_at(meta: &ObjectMeta) -> Option<DateTime<Utc>> {
    meta.creation_timestamp.as_ref().map(|t| t.0)
}

/// Catalog entry for one tool
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub category: &'static str,
    pub description: &'static str,
}

const CATALOG: &[ToolDescriptor] = &[
    ToolDescriptor {
        name: "get_deployment_info",
        category: "discovery",
        description: "Deployments with images, replica status and conditions",
    },
    ToolDescriptor {
        name: "get_namespace_summary",
        category: "discovery",
        description: "Resource counts and health score per namespace",
    },
    ToolDescriptor {
        name: "get_cluster_capacity",
        category: "discovery",
        description: "Node capacity, allocatable resources and readiness",
    },
    ToolDescriptor {
        name: "get_pod_status",
        category: "health",
        description: "Pod phases, container states and restart counts",
    },
    ToolDescriptor {
        name: "get_recent_events",
        category: "health",
        description: "Recent cluster events, newest first",
    },
    ToolDescriptor {
        name: "get_container_logs",
        category: "health",
        description: "Tail of a container's logs",
    },
    ToolDescriptor {
        name: "get_current_resource_usage",
        category: "metrics",
        description: "Current CPU and memory usage against limits",
    },
    ToolDescriptor {
        name: "query_metrics_timeseries",
        category: "metrics",
        description: "Raw PromQL range query",
    },
    ToolDescriptor {
        name: "get_resource_trends",
        category: "metrics",
        description: "Percentiles, trend direction and spikes over a period",
    },
    ToolDescriptor {
        name: "analyze_restart_patterns",
        category: "analysis",
        description: "Restart rate, crash reasons and timing pattern",
    },
    ToolDescriptor {
        name: "get_deployment_history",
        category: "analysis",
        description: "Rollout revisions with images and change causes",
    },
    ToolDescriptor {
        name: "compare_period_metrics",
        category: "analysis",
        description: "Compare a metric between two named periods",
    },
    ToolDescriptor {
        name: "get_anomaly_report",
        category: "analysis",
        description: "Threshold-based anomalies across namespaces",
    },
];

/// Every tool this crate serves
pub fn catalog() -> &'static [ToolDescriptor] {
    CATALOG
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, ToolError> {
    let args = match args {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    };
    serde_json::from_value(args)
        .map_err(|e| ToolError::validation(format!("Invalid arguments for {tool}: {e}")))
}

/// Invoke a tool by name with JSON arguments
pub async fn dispatch(ctx: &ToolContext, name: &str, args: Value) -> ToolResponse {
    macro_rules! call {
        ($func:path) => {
            match parse_args(name, args) {
                Ok(params) => $func(ctx, params).await,
                Err(err) => run_tool(name, Params::new(), async { Err(err) }).await,
            }
        };
    }

    match name {
        "get_deployment_info" => call!(discovery::get_deployment_info),
        "get_namespace_summary" => call!(discovery::get_namespace_summary),
        "get_cluster_capacity" => call!(discovery::get_cluster_capacity),
        "get_pod_status" => call!(health::get_pod_status),
        "get_recent_events" => call!(health::get_recent_events),
        "get_container_logs" => call!(health::get_container_logs),
        "get_current_resource_usage" => call!(metrics::get_current_resource_usage),
        "query_metrics_timeseries" => call!(metrics::query_metrics_timeseries),
        "get_resource_trends" => call!(metrics::get_resource_trends),
        "analyze_restart_patterns" => call!(analysis::analyze_restart_patterns),
        "get_deployment_history" => call!(analysis::get_deployment_history),
        "compare_period_metrics" => call!(analysis::compare_period_metrics),
        "get_anomaly_report" => call!(analysis::get_anomaly_report),
        unknown => {
            let err = ToolError::validation(format!("Unknown tool: {unknown}"));
            run_tool("unknown", Params::new().with("tool", unknown), async { Err(err) }).await
        }
    }
}
