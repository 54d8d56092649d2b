//! Restart patterns, rollout history, period comparison and anomaly scans

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::core::v1::{ContainerStateTerminated, ContainerStatus, Pod};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{created_at, object_name, ToolContext};
use crate::clients::kubernetes::deployment_selector;
use crate::clients::prometheus::finite_value;
use crate::clients::RangeSeries;
use crate::envelope::{run_tool, Params, ToolResponse};
use crate::models::{
    AnomalyInfo, AnomalyType, DeploymentHistoryEntry, MetricComparison, RestartPattern, Severity,
};
use crate::queries::{self, MetricKind};
use crate::stats::{detect_restart_pattern, mean, percent_change, percentile, restart_severity};
use crate::units::{days_to_seconds, parse_duration, round_to, seconds_before};

const REVISION_ANNOTATION: &str = "deployment.kubernetes.io/revision";
const CHANGE_CAUSE_ANNOTATION: &str = "kubernetes.io/change-cause";

/// Restart timestamps kept in a restart pattern
const MAX_RESTART_TIMES: usize = 20;

/// Restarts at which a pod is reported as an anomaly
const ANOMALY_RESTARTS: i64 = 5;

const SIGNIFICANT_CHANGE_PERCENT: f64 = 10.0;
const NOTABLE_P95_CHANGE_PERCENT: f64 = 20.0;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RestartPatternsParams {
    pub namespace: String,
    pub deployment_name: Option<String>,
    #[serde(default = "default_restart_lookback")]
    pub lookback_period: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentHistoryParams {
    pub namespace: String,
    pub deployment_name: String,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComparePeriodsParams {
    pub namespace: String,
    pub deployment_name: Option<String>,
    pub metric: String,
    /// `this_week`, `last_week`, `this_month` or `last_month`
    pub baseline_period: String,
    pub compare_period: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnomalyReportParams {
    pub namespace: Option<String>,
    #[serde(default = "default_anomaly_lookback")]
    pub lookback_period: String,
}

impl Default for AnomalyReportParams {
    fn default() -> Self {
        Self {
            namespace: None,
            lookback_period: default_anomaly_lookback(),
        }
    }
}

fn default_restart_lookback() -> String {
    "24h".to_string()
}

fn default_lookback_days() -> i64 {
    7
}

fn default_anomaly_lookback() -> String {
    "1h".to_string()
}

fn last_termination(status: &ContainerStatus) -> Option<&ContainerStateTerminated> {
    status.last_state.as_ref()?.terminated.as_ref()
}

/// Restart totals, weighted crash reasons and in-window restart times
pub fn collect_restarts(pods: &[Pod], cutoff: DateTime<Utc>, hours: f64) -> RestartPattern {
    let mut total_restarts = 0;
    let mut crash_reasons: BTreeMap<String, i64> = BTreeMap::new();
    let mut restart_times = Vec::new();
    let mut affected_pods = Vec::new();

    for pod in pods {
        let statuses = pod
            .status
            .as_ref()
            .and_then(|s| s.container_statuses.as_deref())
            .unwrap_or_default();

        let mut pod_restarts = 0;
        for status in statuses {
            let restarts = i64::from(status.restart_count);
            pod_restarts += restarts;
            if let Some(terminated) = last_termination(status) {
                let reason = terminated.reason.as_deref().unwrap_or("Unknown");
                *crash_reasons.entry(reason.to_string()).or_default() += restarts;
                if let Some(finished) = terminated.finished_at.as_ref().map(|t| t.0) {
                    if finished >= cutoff {
                        restart_times.push(finished);
                    }
                }
            }
        }

        if pod_restarts > 0 {
            affected_pods.push(object_name(&pod.metadata));
            total_restarts += pod_restarts;
        }
    }

    let pattern_detected = detect_restart_pattern(&restart_times);
    restart_times.sort();
    let keep_from = restart_times.len().saturating_sub(MAX_RESTART_TIMES);
    let restart_times = restart_times.split_off(keep_from);

    let rate = if hours > 0.0 {
        total_restarts as f64 / hours
    } else {
        0.0
    };

    RestartPattern {
        total_restarts,
        restart_rate_per_hour: round_to(rate, 2),
        crash_reasons,
        restart_times,
        pattern_detected,
        affected_pods,
    }
}

/// Rule-based advice from crash reasons and the timing pattern
pub fn restart_recommendation(pattern: &RestartPattern) -> String {
    let mut advice = Vec::new();
    let reasons = &pattern.crash_reasons;
    let detected = pattern.pattern_detected.as_deref();

    if reasons.contains_key("OOMKilled") {
        advice.push("Increase memory limits - pods are being OOM killed");
    }
    if reasons.contains_key("Error") || reasons.contains_key("CrashLoopBackOff") {
        advice.push("Check application logs for error details");
    }
    if detected == Some("escalating") {
        advice.push("Urgent: Restart frequency is increasing - investigate immediately");
    }
    if detected.is_some_and(|p| p.contains("periodic")) {
        advice.push("Investigate for periodic memory leaks or external triggers");
    }
    if advice.is_empty() && pattern.total_restarts > 0 {
        advice.push("Review container logs and events for more context");
    }

    if advice.is_empty() {
        "No issues detected".to_string()
    } else {
        advice.join("; ")
    }
}

/// Restart rate, crash reasons and timing pattern for a set of pods
pub async fn analyze_restart_patterns(
    ctx: &ToolContext,
    params: RestartPatternsParams,
) -> ToolResponse {
    let echo = Params::new()
        .with("namespace", &params.namespace)
        .with("deployment_name", &params.deployment_name)
        .with("lookback_period", &params.lookback_period);

    run_tool("analyze_restart_patterns", echo, async {
        let lookback = parse_duration(&params.lookback_period)?;
        let pods = match &params.deployment_name {
            Some(name) => ctx.cluster.pods_for_deployment(&params.namespace, name).await?,
            None => ctx.cluster.list_pods(Some(&params.namespace), None, None).await?,
        };

        let cutoff = seconds_before(Utc::now(), lookback)?;
        let hours = lookback as f64 / 3600.0;
        let pattern = collect_restarts(&pods, cutoff, hours);
        let severity = restart_severity(pattern.total_restarts, hours_rate(&pattern, hours));
        let recommendation = restart_recommendation(&pattern);

        Ok(ToolResponse::success(json!({
            "pattern": pattern,
            "severity": severity,
            "recommendation": recommendation,
        })))
    })
    .await
}

/// Unrounded rate for severity classification
fn hours_rate(pattern: &RestartPattern, hours: f64) -> f64 {
    if hours > 0.0 {
        pattern.total_restarts as f64 / hours
    } else {
        0.0
    }
}

fn annotation<'a>(rs: &'a ReplicaSet, key: &str) -> Option<&'a str> {
    rs.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(key))
        .map(String::as_str)
}

fn history_entry(rs: &ReplicaSet) -> DeploymentHistoryEntry {
    let spec = rs.spec.as_ref();
    DeploymentHistoryEntry {
        revision: annotation(rs, REVISION_ANNOTATION)
            .and_then(|r| r.parse().ok())
            .unwrap_or(0),
        image: spec
            .and_then(|s| s.template.as_ref())
            .and_then(|t| t.spec.as_ref())
            .and_then(|p| p.containers.first())
            .and_then(|c| c.image.clone())
            .unwrap_or_else(|| "unknown".to_string()),
        created_at: created_at(&rs.metadata),
        replicas: spec.and_then(|s| s.replicas).unwrap_or(0),
        change_cause: annotation(rs, CHANGE_CAUSE_ANNOTATION).map(str::to_string),
    }
}

/// Rollout revisions of a deployment inside the lookback window
pub async fn get_deployment_history(
    ctx: &ToolContext,
    params: DeploymentHistoryParams,
) -> ToolResponse {
    let echo = Params::new()
        .with("namespace", &params.namespace)
        .with("deployment_name", &params.deployment_name)
        .with("lookback_days", params.lookback_days);

    run_tool("get_deployment_history", echo, async {
        let lookback = days_to_seconds(params.lookback_days)?;
        let deployment = ctx
            .cluster
            .get_deployment(&params.namespace, &params.deployment_name)
            .await?;
        let selector = deployment_selector(&deployment);
        let replica_sets = ctx
            .cluster
            .list_replica_sets(&params.namespace, Some(&selector))
            .await?;

        let cutoff = seconds_before(Utc::now(), lookback)?;
        let mut in_window: Vec<&ReplicaSet> = replica_sets
            .iter()
            .filter(|rs| created_at(&rs.metadata).is_some_and(|t| t >= cutoff))
            .collect();
        in_window.sort_by(|a, b| created_at(&b.metadata).cmp(&created_at(&a.metadata)));

        let mut current_revision: Option<i64> = None;
        let mut history = Vec::with_capacity(in_window.len());
        for rs in in_window {
            let entry = history_entry(rs);
            let live = rs.status.as_ref().map_or(0, |s| s.replicas);
            if live > 0 && current_revision.map_or(true, |cur| entry.revision > cur) {
                current_revision = Some(entry.revision);
            }
            history.push(entry);
        }
        history.sort_by(|a, b| b.revision.cmp(&a.revision));

        Ok(ToolResponse::success(json!({
            "current_revision": current_revision,
            "total_revisions": history.len(),
            "history": history,
        })))
    })
    .await
}

/// Resolve a named period into `(start, end)`; unknown names mean the last 7 days
pub fn period_window(period: &str, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    match period.to_lowercase().as_str() {
        "last_week" => (now - Duration::days(14), now - Duration::days(7)),
        "this_month" => (now - Duration::days(30), now),
        "last_month" => (now - Duration::days(60), now - Duration::days(30)),
        _ => (now - Duration::days(7), now),
    }
}

/// Compute a comparison between two sample sets
pub fn compare_samples(
    kind: MetricKind,
    params: &ComparePeriodsParams,
    baseline: &[f64],
    compare: &[f64],
) -> MetricComparison {
    let baseline_avg = mean(baseline);
    let compare_avg = mean(compare);
    let baseline_p95 = percentile(baseline, 95.0);
    let compare_p95 = percentile(compare, 95.0);
    let change = percent_change(baseline_avg, compare_avg);

    let label = kind.as_str().to_uppercase();
    let mut notable = Vec::new();
    if change > SIGNIFICANT_CHANGE_PERCENT {
        notable.push(format!("{label} increased by {change:.1}%"));
    } else if change < -SIGNIFICANT_CHANGE_PERCENT {
        notable.push(format!("{label} decreased by {:.1}%", change.abs()));
    }

    let p95_change = if baseline_p95 > 0.0 {
        (compare_p95 - baseline_p95) / baseline_p95 * 100.0
    } else {
        0.0
    };
    if p95_change.abs() > NOTABLE_P95_CHANGE_PERCENT {
        let direction = if p95_change > 0.0 { "increased" } else { "decreased" };
        notable.push(format!("P95 {direction} by {:.1}%", p95_change.abs()));
    }

    MetricComparison {
        metric_name: kind.as_str().to_string(),
        namespace: params.namespace.clone(),
        deployment_name: params.deployment_name.clone(),
        baseline_period: params.baseline_period.clone(),
        compare_period: params.compare_period.clone(),
        baseline_average: round_to(baseline_avg, 4),
        compare_average: round_to(compare_avg, 4),
        percent_change: round_to(change, 1),
        is_significant: change.abs() > SIGNIFICANT_CHANGE_PERCENT,
        baseline_p95: round_to(baseline_p95, 4),
        compare_p95: round_to(compare_p95, 4),
        notable_differences: notable,
    }
}

fn comparison_summary(comparison: &MetricComparison) -> String {
    let direction = if comparison.percent_change > 0.0 { "up" } else { "down" };
    let mut summary = format!(
        "{} is {direction} {:.1}% compared to {}.",
        comparison.metric_name.to_uppercase(),
        comparison.percent_change.abs(),
        comparison.baseline_period
    );
    if !comparison.notable_differences.is_empty() {
        summary.push_str(&format!(
            " Notable: {}",
            comparison.notable_differences.join("; ")
        ));
    }
    summary
}

/// Compare one metric between two named periods
pub async fn compare_period_metrics(
    ctx: &ToolContext,
    params: ComparePeriodsParams,
) -> ToolResponse {
    let echo = Params::new()
        .with("namespace", &params.namespace)
        .with("deployment_name", &params.deployment_name)
        .with("metric", &params.metric)
        .with("baseline_period", &params.baseline_period)
        .with("compare_period", &params.compare_period);

    run_tool("compare_period_metrics", echo, async {
        let kind = MetricKind::parse_param(&params.metric, "metric")?;
        let selector = queries::pod_selector(&params.namespace, params.deployment_name.as_deref());
        let query = kind.aggregate_query(&selector);

        let now = Utc::now();
        let (baseline_start, baseline_end) = period_window(&params.baseline_period, now);
        let (compare_start, compare_end) = period_window(&params.compare_period, now);

        let baseline = ctx
            .metrics
            .query_range(&query, baseline_start, baseline_end, None)
            .await?;
        let compare = ctx
            .metrics
            .query_range(&query, compare_start, compare_end, None)
            .await?;

        let values = |series: &[RangeSeries]| -> Vec<f64> {
            series
                .first()
                .map(|s| s.values.iter().filter_map(|(_, raw)| finite_value(raw)).collect())
                .unwrap_or_default()
        };
        let baseline_values = values(&baseline);
        let compare_values = values(&compare);

        if baseline_values.is_empty() || compare_values.is_empty() {
            return Ok(ToolResponse::partial(
                json!({
                    "comparison": Value::Null,
                    "summary": "Insufficient data for comparison.",
                }),
                vec!["One or both periods have no data.".to_string()],
            ));
        }

        let comparison = compare_samples(kind, &params, &baseline_values, &compare_values);
        let summary = comparison_summary(&comparison);

        Ok(ToolResponse::success(json!({
            "comparison": comparison,
            "summary": summary,
        })))
    })
    .await
}

fn pod_anomaly(
    anomaly_type: AnomalyType,
    severity: Severity,
    namespace: &str,
    pod: &str,
    description: String,
    recommendation: &str,
) -> AnomalyInfo {
    AnomalyInfo {
        anomaly_type,
        severity,
        namespace: namespace.to_string(),
        resource_name: Some(pod.to_string()),
        resource_kind: Some("Pod".to_string()),
        detected_at: Utc::now(),
        description,
        metric_name: None,
        current_value: None,
        expected_range: None,
        recommendation: Some(recommendation.to_string()),
    }
}

/// Restart and phase anomalies for the pods of one namespace
pub fn pod_anomalies(namespace: &str, pods: &[Pod]) -> Vec<AnomalyInfo> {
    let mut anomalies = Vec::new();

    for pod in pods {
        let Some(statuses) = pod
            .status
            .as_ref()
            .and_then(|s| s.container_statuses.as_deref())
        else {
            continue;
        };
        let restarts: i64 = statuses.iter().map(|cs| i64::from(cs.restart_count)).sum();
        if restarts < ANOMALY_RESTARTS {
            continue;
        }
        let severity = if restarts >= 10 {
            Severity::Critical
        } else if restarts >= 7 {
            Severity::High
        } else {
            Severity::Medium
        };
        let last_reason = statuses
            .iter()
            .filter_map(last_termination)
            .last()
            .and_then(|t| t.reason.clone());
        let description = match last_reason {
            Some(reason) => format!("Pod has {restarts} restarts (last reason: {reason})"),
            None => format!("Pod has {restarts} restarts"),
        };
        anomalies.push(pod_anomaly(
            AnomalyType::RestartPattern,
            severity,
            namespace,
            &object_name(&pod.metadata),
            description,
            "Check container logs and events for crash reasons",
        ));
    }

    for pod in pods {
        let phase = pod.status.as_ref().and_then(|s| s.phase.as_deref());
        let severity = match phase {
            Some("Failed") => Severity::High,
            Some("Pending") => Severity::Medium,
            _ => continue,
        };
        anomalies.push(pod_anomaly(
            AnomalyType::PodHealth,
            severity,
            namespace,
            &object_name(&pod.metadata),
            format!("Pod is in {} state", phase.unwrap_or_default()),
            "Check pod events and node resources",
        ));
    }

    anomalies
}

/// Memory anomaly for one pod's percent-of-limit reading
pub fn memory_anomaly(namespace: &str, pod: &str, percent: f64) -> Option<AnomalyInfo> {
    let (severity, recommendation) = if percent > 90.0 {
        (
            Severity::Critical,
            "Increase memory limit or optimize memory usage",
        )
    } else if percent > 80.0 {
        (
            Severity::High,
            "Monitor memory usage closely, may need to increase limits",
        )
    } else {
        return None;
    };

    let mut anomaly = pod_anomaly(
        AnomalyType::ResourceExhaustion,
        severity,
        namespace,
        pod,
        format!("Memory usage at {percent:.0}% of limit"),
        recommendation,
    );
    anomaly.metric_name = Some("memory_usage_percent".to_string());
    anomaly.current_value = Some(percent);
    anomaly.expected_range = Some((0.0, 80.0));
    Some(anomaly)
}

fn anomaly_summary(total: usize, critical: usize, high: usize) -> String {
    if total == 0 {
        "No anomalies detected in the specified period.".to_string()
    } else {
        format!("Detected {total} anomalie(s): {critical} critical, {high} high.")
    }
}

/// Threshold-based anomaly scan over one namespace or every non-system one
pub async fn get_anomaly_report(ctx: &ToolContext, params: AnomalyReportParams) -> ToolResponse {
    let echo = Params::new()
        .with("namespace", params.namespace.as_deref().unwrap_or("all"))
        .with("lookback_period", &params.lookback_period);

    run_tool("get_anomaly_report", echo, async {
        parse_duration(&params.lookback_period)?;

        let namespaces: Vec<String> = match &params.namespace {
            Some(ns) => vec![ns.clone()],
            None => ctx
                .cluster
                .list_namespaces()
                .await?
                .iter()
                .map(|ns| object_name(&ns.metadata))
                .filter(|name| !ctx.config.is_excluded_namespace(name))
                .collect(),
        };

        let mut anomalies = Vec::new();
        for ns in &namespaces {
            let pods = ctx.cluster.list_pods(Some(ns), None, None).await?;
            anomalies.extend(pod_anomalies(ns, &pods));

            match ctx
                .metrics
                .query(&queries::memory_limit_ratio_by_pod(ns), None)
                .await
            {
                Ok(samples) => {
                    for sample in &samples {
                        let pod = sample.label("pod").unwrap_or("unknown");
                        let Some(percent) = finite_value(&sample.value.1) else {
                            continue;
                        };
                        anomalies.extend(memory_anomaly(ns, pod, percent));
                    }
                }
                Err(err) => debug!(namespace = %ns, error = %err, "Skipping memory check"),
            }
        }

        let critical = anomalies
            .iter()
            .filter(|a| a.severity == Severity::Critical)
            .count();
        let high = anomalies
            .iter()
            .filter(|a| a.severity == Severity::High)
            .count();

        Ok(ToolResponse::success(json!({
            "total_count": anomalies.len(),
            "critical_count": critical,
            "high_count": high,
            "summary": anomaly_summary(anomalies.len(), critical, high),
            "anomalies": anomalies,
        })))
    })
    .await
}
