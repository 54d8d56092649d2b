//! Records derived from metrics queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// CPU percent-of-limit at or above which a pod counts as throttled
pub const CPU_THROTTLE_PERCENT: f64 = 90.0;

/// Memory percent-of-limit at or above which a pod is under pressure
pub const MEMORY_PRESSURE_PERCENT: f64 = 80.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub pod_name: String,
    pub namespace: String,
    pub container_name: Option<String>,
    pub cpu_usage_cores: f64,
    /// Percent of the CPU limit; absent without a limit
    pub cpu_usage_percent: Option<f64>,
    pub cpu_request_cores: Option<f64>,
    pub cpu_limit_cores: Option<f64>,
    pub memory_usage_bytes: u64,
    pub memory_usage_mb: f64,
    /// Percent of the memory limit; absent without a limit
    pub memory_usage_percent: Option<f64>,
    pub memory_request_bytes: Option<u64>,
    pub memory_limit_bytes: Option<u64>,
}

impl ResourceUsage {
    pub fn is_cpu_throttled(&self) -> bool {
        self.cpu_usage_percent
            .is_some_and(|pct| pct >= CPU_THROTTLE_PERCENT)
    }

    pub fn is_memory_pressure(&self) -> bool {
        self.memory_usage_percent
            .is_some_and(|pct| pct >= MEMORY_PRESSURE_PERCENT)
    }
}

/// `usage / limit * 100`, or `None` when no positive limit exists
pub fn percent_of_limit(usage: f64, limit: Option<f64>) -> Option<f64> {
    match limit {
        Some(limit) if limit > 0.0 => Some(usage / limit * 100.0),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeseriesResult {
    pub metric_name: String,
    pub labels: BTreeMap<String, String>,
    pub data_points: Vec<DataPoint>,
}

impl TimeseriesResult {
    pub fn latest_value(&self) -> Option<f64> {
        self.data_points.last().map(|p| p.value)
    }

    pub fn average(&self) -> Option<f64> {
        if self.data_points.is_empty() {
            return None;
        }
        let sum: f64 = self.data_points.iter().map(|p| p.value).sum();
        Some(sum / self.data_points.len() as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
    Volatile,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Increasing => "increasing",
            TrendDirection::Decreasing => "decreasing",
            TrendDirection::Stable => "stable",
            TrendDirection::Volatile => "volatile",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceTrend {
    pub resource_type: String,
    pub namespace: String,
    pub deployment_name: Option<String>,
    pub period: String,
    pub average: f64,
    pub minimum: f64,
    pub maximum: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub std_dev: f64,
    pub trend_direction: TrendDirection,
    pub trend_change_percent: f64,
    pub spike_count: usize,
    pub spike_times: Vec<DateTime<Utc>>,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricComparison {
    pub metric_name: String,
    pub namespace: String,
    pub deployment_name: Option<String>,
    pub baseline_period: String,
    pub compare_period: String,
    pub baseline_average: f64,
    pub compare_average: f64,
    pub percent_change: f64,
    pub is_significant: bool,
    pub baseline_p95: f64,
    pub compare_p95: f64,
    pub notable_differences: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    RestartPattern,
    PodHealth,
    ResourceExhaustion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyInfo {
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub namespace: String,
    pub resource_name: Option<String>,
    pub resource_kind: Option<String>,
    pub detected_at: DateTime<Utc>,
    pub description: String,
    pub metric_name: Option<String>,
    pub current_value: Option<f64>,
    /// Expected `(min, max)` for `current_value`
    pub expected_range: Option<(f64, f64)>,
    pub recommendation: Option<String>,
}
