//! Current usage, raw range queries and trend analysis

use std::collections::BTreeMap;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use super::ToolContext;
use crate::clients::prometheus::{calculate_step, finite_value, sample_time, InstantSample};
use crate::clients::RangeSeries;
use crate::envelope::{run_tool, Params, ToolResponse};
use crate::models::{
    percent_of_limit, DataPoint, ResourceTrend, ResourceUsage, TimeseriesResult, TrendDirection,
};
use crate::queries::{self, MetricKind};
use crate::stats::{classify_trend, detect_spikes, SeriesStats};
use crate::units::{parse_duration, round_to, seconds_before};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceUsageParams {
    pub namespace: String,
    pub deployment_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeseriesParams {
    pub promql_query: String,
    #[serde(default = "default_time_range")]
    pub time_range: String,
    /// Resolution such as `15s` or `5m`; derived from the range when absent
    pub step: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceTrendsParams {
    pub namespace: String,
    pub deployment_name: Option<String>,
    #[serde(default = "default_metric_type")]
    pub metric_type: String,
    #[serde(default = "default_period")]
    pub period: String,
}

fn default_time_range() -> String {
    "1h".to_string()
}

fn default_metric_type() -> String {
    "cpu".to_string()
}

fn default_period() -> String {
    "24h".to_string()
}

fn by_pod(samples: &[InstantSample]) -> BTreeMap<String, f64> {
    samples
        .iter()
        .map(|s| {
            (
                s.label("pod").unwrap_or("unknown").to_string(),
                s.numeric_value(),
            )
        })
        .collect()
}

#[derive(Default)]
struct PodReading {
    cpu: f64,
    memory: u64,
}

/// Per-pod CPU and memory against requests and limits
pub async fn get_current_resource_usage(
    ctx: &ToolContext,
    params: ResourceUsageParams,
) -> ToolResponse {
    let echo = Params::new()
        .with("namespace", &params.namespace)
        .with("deployment_name", &params.deployment_name);

    run_tool("get_current_resource_usage", echo, async {
        let selector = queries::pod_selector(&params.namespace, params.deployment_name.as_deref());
        let metrics = &ctx.metrics;

        let cpu_query = queries::cpu_usage_by_pod(&selector);
        let memory_query = queries::memory_usage_by_pod(&selector);
        let cpu_requests_query = queries::resource_requests_by_pod("cpu", &selector);
        let cpu_limits_query = queries::resource_limits_by_pod("cpu", &selector);
        let memory_requests_query = queries::resource_requests_by_pod("memory", &selector);
        let memory_limits_query = queries::resource_limits_by_pod("memory", &selector);

        let (cpu, memory, cpu_requests, cpu_limits, memory_requests, memory_limits) = tokio::try_join!(
            metrics.query(&cpu_query, None),
            metrics.query(&memory_query, None),
            metrics.query(&cpu_requests_query, None),
            metrics.query(&cpu_limits_query, None),
            metrics.query(&memory_requests_query, None),
            metrics.query(&memory_limits_query, None),
        )?;

        let cpu_requests = by_pod(&cpu_requests);
        let cpu_limits = by_pod(&cpu_limits);
        let memory_requests = by_pod(&memory_requests);
        let memory_limits = by_pod(&memory_limits);

        let mut readings: BTreeMap<String, PodReading> = BTreeMap::new();
        for (pod, value) in by_pod(&cpu) {
            readings.entry(pod).or_default().cpu = value;
        }
        for (pod, value) in by_pod(&memory) {
            readings.entry(pod).or_default().memory = value.max(0.0) as u64;
        }

        let mut usage = Vec::with_capacity(readings.len());
        let mut alerts = Vec::new();
        for (pod, reading) in readings {
            let cpu_limit = cpu_limits.get(&pod).copied().filter(|v| *v > 0.0);
            let cpu_request = cpu_requests.get(&pod).copied().filter(|v| *v > 0.0);
            let memory_limit = memory_limits.get(&pod).copied().filter(|v| *v > 0.0);
            let memory_request = memory_requests.get(&pod).copied().filter(|v| *v > 0.0);

            let cpu_percent = percent_of_limit(reading.cpu, cpu_limit);
            let memory_percent = percent_of_limit(reading.memory as f64, memory_limit);

            let record = ResourceUsage {
                namespace: params.namespace.clone(),
                container_name: None,
                cpu_usage_cores: round_to(reading.cpu, 4),
                cpu_usage_percent: cpu_percent.map(|p| round_to(p, 1)),
                cpu_request_cores: cpu_request.map(|v| round_to(v, 4)),
                cpu_limit_cores: cpu_limit.map(|v| round_to(v, 4)),
                memory_usage_bytes: reading.memory,
                memory_usage_mb: round_to(reading.memory as f64 / BYTES_PER_MB, 2),
                memory_usage_percent: memory_percent.map(|p| round_to(p, 1)),
                memory_request_bytes: memory_request.map(|v| v as u64),
                memory_limit_bytes: memory_limit.map(|v| v as u64),
                pod_name: pod,
            };

            if let (true, Some(pct)) = (record.is_cpu_throttled(), cpu_percent) {
                alerts.push(format!(
                    "Pod {} CPU usage at {pct:.0}% of limit",
                    record.pod_name
                ));
            }
            if let (true, Some(pct)) = (record.is_memory_pressure(), memory_percent) {
                alerts.push(format!(
                    "Pod {} memory usage at {pct:.0}% of limit",
                    record.pod_name
                ));
            }
            usage.push(record);
        }

        let total_cpu: f64 = usage.iter().map(|u| u.cpu_usage_cores).sum();
        let total_memory_mb: f64 = usage.iter().map(|u| u.memory_usage_mb).sum();

        Ok(ToolResponse::success(json!({
            "summary": {
                "pod_count": usage.len(),
                "total_cpu_cores": round_to(total_cpu, 4),
                "total_memory_mb": round_to(total_memory_mb, 2),
                "alerts": alerts,
            },
            "usage": usage,
        })))
    })
    .await
}

/// Keep every `len / max_points`-th sample, at most `max_points` of them
pub fn downsample<T: Clone>(values: &[T], max_points: usize) -> Vec<T> {
    if max_points == 0 || values.len() <= max_points {
        return values.to_vec();
    }
    let stride = values.len() / max_points;
    values
        .iter()
        .step_by(stride)
        .take(max_points)
        .cloned()
        .collect()
}

fn timeseries_result(series: &RangeSeries, max_points: usize) -> TimeseriesResult {
    let data_points = downsample(&series.values, max_points)
        .iter()
        .map(|(ts, raw)| DataPoint {
            timestamp: sample_time(*ts),
            // Non-finite samples keep their slot as 0.0
            value: finite_value(raw).unwrap_or(0.0),
        })
        .collect();

    TimeseriesResult {
        metric_name: series
            .metric
            .get("__name__")
            .cloned()
            .unwrap_or_else(|| "query_result".to_string()),
        labels: series
            .metric
            .iter()
            .filter(|(k, _)| k.as_str() != "__name__")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        data_points,
    }
}

/// Raw PromQL range query over the last `time_range`
pub async fn query_metrics_timeseries(ctx: &ToolContext, params: TimeseriesParams) -> ToolResponse {
    let echo = Params::new()
        .with("time_range", &params.time_range)
        .with("step", &params.step);

    run_tool("query_metrics_timeseries", echo, async {
        let range = parse_duration(&params.time_range)?;
        let end = Utc::now();
        let start = seconds_before(end, range)?;
        let max_points = ctx.config.max_timeseries_points;
        let step = params
            .step
            .clone()
            .unwrap_or_else(|| calculate_step(start, end, max_points));

        let raw = ctx
            .metrics
            .query_range(&params.promql_query, start, end, Some(&step))
            .await?;
        let results: Vec<TimeseriesResult> = raw
            .iter()
            .map(|series| timeseries_result(series, max_points))
            .collect();
        let points = results.first().map_or(0, |r| r.data_points.len());

        let result = json!({
            "query": params.promql_query,
            "series_count": results.len(),
            "data_points_per_series": points,
            "results": results,
        });
        let resp = if raw.is_empty() {
            ToolResponse::partial(
                result,
                vec!["Query returned no results. Check the query and namespace.".to_string()],
            )
        } else {
            ToolResponse::success(result)
        };
        Ok(resp.with_metadata("step", &step))
    })
    .await
}

fn trend_interpretation(kind: MetricKind, trend: &ResourceTrend, change: f64) -> String {
    let mut text = format!(
        "{} usage is {}",
        kind.as_str().to_uppercase(),
        trend.trend_direction.as_str()
    );
    if matches!(
        trend.trend_direction,
        TrendDirection::Increasing | TrendDirection::Decreasing
    ) {
        text.push_str(&format!(" ({change:+.1}% over {})", trend.period));
    }
    if trend.spike_count > 0 {
        text.push_str(&format!(". Detected {} spike(s).", trend.spike_count));
    }
    text.push_str(&format!(
        " Average: {:.4} {unit}, P95: {:.4} {unit}.",
        trend.average,
        trend.p95,
        unit = trend.unit
    ));
    text
}

/// Percentiles, direction and spikes of a metric over a period
pub async fn get_resource_trends(ctx: &ToolContext, params: ResourceTrendsParams) -> ToolResponse {
    let echo = Params::new()
        .with("namespace", &params.namespace)
        .with("deployment_name", &params.deployment_name)
        .with("metric_type", &params.metric_type)
        .with("period", &params.period);

    run_tool("get_resource_trends", echo, async {
        let kind = MetricKind::parse_param(&params.metric_type, "metric_type")?;
        let period = parse_duration(&params.period)?;
        let end = Utc::now();
        let start = seconds_before(end, period)?;

        let selector = queries::pod_selector(&params.namespace, params.deployment_name.as_deref());
        let series = ctx
            .metrics
            .query_range(&kind.aggregate_query(&selector), start, end, None)
            .await?;

        let Some(first) = series.first().filter(|s| !s.values.is_empty()) else {
            return Ok(ToolResponse::partial(
                json!({
                    "trend": Value::Null,
                    "interpretation": "No data available for the specified period.",
                }),
                vec![
                    "No metric data found. The deployment may not exist or has no pods."
                        .to_string(),
                ],
            ));
        };

        let samples: Vec<_> = first
            .values
            .iter()
            .filter_map(|(ts, raw)| finite_value(raw).map(|v| (sample_time(*ts), v)))
            .collect();
        if samples.len() < 2 {
            return Ok(ToolResponse::partial(
                json!({
                    "trend": Value::Null,
                    "interpretation": "Insufficient data points for trend analysis.",
                }),
                vec!["Need at least 2 data points for trend analysis.".to_string()],
            ));
        }

        let values: Vec<f64> = samples.iter().map(|(_, v)| *v).collect();
        let stats = SeriesStats::compute(&values);
        let (direction, change) = classify_trend(&values);
        let (spike_count, spike_times) = detect_spikes(&samples);

        let trend = ResourceTrend {
            resource_type: kind.as_str().to_string(),
            namespace: params.namespace.clone(),
            deployment_name: params.deployment_name.clone(),
            period: params.period.clone(),
            average: round_to(stats.mean, 4),
            minimum: round_to(stats.min, 4),
            maximum: round_to(stats.max, 4),
            p50: round_to(stats.p50, 4),
            p95: round_to(stats.p95, 4),
            p99: round_to(stats.p99, 4),
            std_dev: round_to(stats.std_dev, 4),
            trend_direction: direction,
            trend_change_percent: round_to(change, 1),
            spike_count,
            spike_times,
            unit: kind.unit().to_string(),
        };
        let interpretation = trend_interpretation(kind, &trend, change);

        Ok(ToolResponse::success(json!({
            "trend": trend,
            "interpretation": interpretation,
        })))
    })
    .await
}
