//! Observability infrastructure for the tool layer
//!
//! Provides:
//! - Prometheus metrics (tool call counts and latency)
//! - Structured JSON logging with tracing

use prometheus::{register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for tool latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ToolMetricsInner> = OnceLock::new();

struct ToolMetricsInner {
    tool_calls_total: IntCounterVec,
    tool_duration_seconds: HistogramVec,
}

impl ToolMetricsInner {
    fn new() -> Self {
        Self {
            tool_calls_total: register_int_counter_vec!(
                "observer_tool_calls_total",
                "Total number of tool invocations by final envelope status",
                &["tool", "status"]
            )
            .expect("Failed to register tool_calls_total"),

            tool_duration_seconds: register_histogram_vec!(
                "observer_tool_duration_seconds",
                "Time spent executing a tool, including backend calls",
                &["tool"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register tool_duration_seconds"),
        }
    }
}

/// Tool metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share it.
#[derive(Clone)]
pub struct ToolMetrics {
    _private: (),
}

impl Default for ToolMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ToolMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ToolMetricsInner {
        GLOBAL_METRICS.get_or_init(ToolMetricsInner::new)
    }

    /// Record one finished tool call
    pub fn observe_call(&self, tool: &str, status: &str, duration_secs: f64) {
        let inner = self.inner();
        inner
            .tool_calls_total
            .with_label_values(&[tool, status])
            .inc();
        inner
            .tool_duration_seconds
            .with_label_values(&[tool])
            .observe(duration_secs);
    }

    /// Number of calls recorded for a tool/status pair
    pub fn call_count(&self, tool: &str, status: &str) -> u64 {
        self.inner()
            .tool_calls_total
            .with_label_values(&[tool, status])
            .get()
    }
}

/// Structured logger for tool and process events
#[derive(Clone)]
pub struct StructuredLogger {
    component: String,
}

impl StructuredLogger {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    /// Log a finished tool invocation
    pub fn log_tool_call(
        &self,
        tool: &str,
        status: &str,
        execution_time_ms: u64,
        error_type: Option<&str>,
    ) {
        match error_type {
            Some(kind) => {
                warn!(
                    event = "tool_invoked",
                    component = %self.component,
                    tool = %tool,
                    status = %status,
                    execution_time_ms = execution_time_ms,
                    error_type = %kind,
                    "Tool call failed"
                );
            }
            None => {
                info!(
                    event = "tool_invoked",
                    component = %self.component,
                    tool = %tool,
                    status = %status,
                    execution_time_ms = execution_time_ms,
                    "Tool call completed"
                );
            }
        }
    }

    pub fn log_startup(&self, version: &str, prometheus_url: &str) {
        info!(
            event = "observer_started",
            component = %self.component,
            version = %version,
            prometheus_url = %prometheus_url,
            "Cluster observer started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "observer_shutdown",
            component = %self.component,
            reason = %reason,
            "Cluster observer shutting down"
        );
    }
}
