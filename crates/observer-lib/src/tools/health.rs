//! Pod health, events and logs

use std::collections::BTreeMap;

use chrono::Utc;
use k8s_openapi::api::core::v1::{Container, ContainerStatus, Event, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::Deserialize;
use serde_json::json;

use super::{created_at, labels_of, object_name, ToolContext};
use crate::clients::kubernetes::event_timestamp;
use crate::clients::LogOptions;
use crate::envelope::{run_tool, Params, ToolResponse};
use crate::error::ToolError;
use crate::models::{
    ContainerInfo, ContainerResources, ContainerState, EventInfo, EventSeverity, ObjectReference,
    PodInfo, PodPhase, PodStatusSummary,
};
use crate::units::{parse_duration, seconds_before, truncate_logs};

/// Hard cap on log lines, as a multiple of the configured default
const LOG_CAP_MULTIPLIER: usize = 5;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PodStatusParams {
    pub namespace: String,
    pub selector: Option<String>,
    pub deployment_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecentEventsParams {
    pub namespace: Option<String>,
    /// `Warning` or `Normal`
    pub severity: Option<String>,
    #[serde(default = "default_time_window")]
    pub time_window: String,
    pub involved_kind: Option<String>,
}

impl Default for RecentEventsParams {
    fn default() -> Self {
        Self {
            namespace: None,
            severity: None,
            time_window: default_time_window(),
            involved_kind: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerLogsParams {
    pub namespace: String,
    pub pod_name: String,
    pub container_name: Option<String>,
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,
    /// Only logs newer than this duration (`5m`, `1h`)
    pub since: Option<String>,
    #[serde(default)]
    pub previous: bool,
}

fn default_time_window() -> String {
    "1h".to_string()
}

fn default_tail_lines() -> usize {
    100
}

fn quantities(map: Option<&BTreeMap<String, Quantity>>) -> Option<BTreeMap<String, String>> {
    map.filter(|m| !m.is_empty())
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.0.clone())).collect())
}

fn container_info(status: &ContainerStatus, spec: Option<&Container>) -> ContainerInfo {
    let state = match status.state.as_ref() {
        Some(s) if s.running.is_some() => ContainerState::Running,
        Some(s) if s.waiting.is_some() => ContainerState::Waiting,
        _ => ContainerState::Terminated,
    };
    let last_restart_reason = status
        .last_state
        .as_ref()
        .and_then(|s| s.terminated.as_ref())
        .and_then(|t| t.reason.clone());
    let resources = spec
        .and_then(|c| c.resources.as_ref())
        .map(|r| ContainerResources {
            requests: quantities(r.requests.as_ref()),
            limits: quantities(r.limits.as_ref()),
        })
        .unwrap_or_default();

    ContainerInfo {
        name: status.name.clone(),
        image: status.image.clone(),
        state,
        ready: status.ready,
        restart_count: status.restart_count,
        last_restart_reason,
        resources,
    }
}

/// Snapshot of a pod from its status and spec
pub(crate) fn pod_info(pod: &Pod) -> PodInfo {
    let spec = pod.spec.as_ref();
    let status = pod.status.as_ref();

    let containers: Vec<ContainerInfo> = status
        .and_then(|s| s.container_statuses.as_ref())
        .map(|statuses| {
            statuses
                .iter()
                .map(|cs| {
                    let declared =
                        spec.and_then(|s| s.containers.iter().find(|c| c.name == cs.name));
                    container_info(cs, declared)
                })
                .collect()
        })
        .unwrap_or_default();
    let total_restart_count = containers.iter().map(|c| c.restart_count).sum();

    PodInfo {
        name: object_name(&pod.metadata),
        namespace: pod.metadata.namespace.clone().unwrap_or_default(),
        phase: PodPhase::parse(status.and_then(|s| s.phase.as_deref())),
        node: spec.and_then(|s| s.node_name.clone()),
        ip: status.and_then(|s| s.pod_ip.clone()),
        created_at: created_at(&pod.metadata),
        containers,
        total_restart_count,
        labels: labels_of(&pod.metadata),
    }
}

/// Aggregate pod snapshots into phase counts
pub fn summarize_pods(pods: Vec<PodInfo>) -> PodStatusSummary {
    let count = |phase: PodPhase| pods.iter().filter(|p| p.phase == phase).count();
    PodStatusSummary {
        total_pods: pods.len(),
        running: count(PodPhase::Running),
        pending: count(PodPhase::Pending),
        failed: count(PodPhase::Failed),
        total_restarts: pods
            .iter()
            .map(|p| i64::from(p.total_restart_count))
            .sum(),
        pods,
    }
}

/// One-line description of a pod summary
pub fn summary_line(summary: &PodStatusSummary) -> String {
    if summary.total_pods == 0 {
        return "No pods found matching criteria".to_string();
    }
    if summary.running == summary.total_pods && summary.total_restarts == 0 {
        return format!("All {} pods healthy (Running, 0 restarts)", summary.running);
    }

    let mut issues = Vec::new();
    if summary.pending > 0 {
        issues.push(format!("{} pending", summary.pending));
    }
    if summary.failed > 0 {
        issues.push(format!("{} failed", summary.failed));
    }
    if summary.total_restarts > 0 {
        issues.push(format!("{} total restarts", summary.total_restarts));
    }
    format!(
        "{}/{} pods running. Issues: {}",
        summary.running,
        summary.total_pods,
        issues.join(", ")
    )
}

/// Pods of a deployment or label selector with container states and restarts
pub async fn get_pod_status(ctx: &ToolContext, params: PodStatusParams) -> ToolResponse {
    let echo = Params::new()
        .with("namespace", &params.namespace)
        .with("selector", &params.selector)
        .with("deployment_name", &params.deployment_name);

    run_tool("get_pod_status", echo, async {
        let pods = match &params.deployment_name {
            Some(name) => ctx.cluster.pods_for_deployment(&params.namespace, name).await?,
            None => {
                ctx.cluster
                    .list_pods(Some(&params.namespace), params.selector.as_deref(), None)
                    .await?
            }
        };

        let status = summarize_pods(pods.iter().map(pod_info).collect());
        let summary = summary_line(&status);

        Ok(ToolResponse::success(json!({
            "status": status,
            "summary": summary,
        })))
    })
    .await
}

fn event_info(event: &Event) -> EventInfo {
    let now = Utc::now();
    let event_time = event.event_time.as_ref().map(|t| t.0);
    let involved = &event.involved_object;

    EventInfo {
        name: object_name(&event.metadata),
        namespace: event.metadata.namespace.clone().unwrap_or_default(),
        type_: EventSeverity::parse(event.type_.as_deref()),
        reason: event
            .reason
            .clone()
            .unwrap_or_else(|| "Unknown".to_string()),
        message: event.message.clone().unwrap_or_default(),
        involved_object: ObjectReference {
            kind: involved.kind.clone().unwrap_or_default(),
            name: involved.name.clone().unwrap_or_default(),
        },
        first_seen: event
            .first_timestamp
            .as_ref()
            .map(|t| t.0)
            .or(event_time)
            .unwrap_or(now),
        last_seen: event
            .last_timestamp
            .as_ref()
            .map(|t| t.0)
            .or(event_time)
            .unwrap_or(now),
        count: event.count.unwrap_or(1),
        source: event
            .source
            .as_ref()
            .and_then(|s| s.component.clone())
            .unwrap_or_else(|| "unknown".to_string()),
    }
}

fn event_field_selector(severity: Option<&str>, involved_kind: Option<&str>) -> Option<String> {
    let mut fields = Vec::new();
    if let Some(severity) = severity {
        fields.push(format!("type={severity}"));
    }
    if let Some(kind) = involved_kind {
        fields.push(format!("involvedObject.kind={kind}"));
    }
    (!fields.is_empty()).then(|| fields.join(","))
}

/// Events inside a time window, newest first, capped at `max_events`
pub async fn get_recent_events(ctx: &ToolContext, params: RecentEventsParams) -> ToolResponse {
    let echo = Params::new()
        .with("namespace", params.namespace.as_deref().unwrap_or("all"))
        .with("severity", params.severity.as_deref().unwrap_or("all"))
        .with("time_window", &params.time_window);

    run_tool("get_recent_events", echo, async {
        let window = parse_duration(&params.time_window)?;
        let cutoff = seconds_before(Utc::now(), window)?;

        let selector =
            event_field_selector(params.severity.as_deref(), params.involved_kind.as_deref());
        let events = ctx
            .cluster
            .list_events(params.namespace.as_deref(), selector.as_deref())
            .await?;

        let mut in_window: Vec<&Event> = events
            .iter()
            .filter(|e| event_timestamp(e).is_some_and(|t| t >= cutoff))
            .collect();

        let max_events = ctx.config.max_events;
        let truncated = in_window.len() > max_events;
        in_window.truncate(max_events);

        let infos: Vec<EventInfo> = in_window.into_iter().map(event_info).collect();
        let warning_count = infos
            .iter()
            .filter(|e| e.type_ == EventSeverity::Warning)
            .count();

        let mut resp = ToolResponse::success(json!({
            "total_count": infos.len(),
            "warning_count": warning_count,
            "truncated": truncated,
            "events": infos,
        }));
        if truncated {
            resp = resp.with_warning(format!(
                "Results truncated to {max_events} events. Use narrower time_window or namespace filter."
            ));
        }
        Ok(resp)
    })
    .await
}

/// Tail of one container's logs
///
/// The container may be omitted only for single-container pods.
pub async fn get_container_logs(ctx: &ToolContext, params: ContainerLogsParams) -> ToolResponse {
    let max_lines = params
        .tail_lines
        .min(ctx.config.max_log_lines * LOG_CAP_MULTIPLIER);
    let echo = Params::new()
        .with("namespace", &params.namespace)
        .with("pod_name", &params.pod_name)
        .with("container_name", &params.container_name)
        .with("tail_lines", max_lines)
        .with("since", &params.since)
        .with("previous", params.previous);

    run_tool("get_container_logs", echo, async {
        let since_seconds = params
            .since
            .as_deref()
            .map(parse_duration)
            .transpose()?
            .map(|secs| secs as i64);

        let container = match &params.container_name {
            Some(name) => name.clone(),
            None => {
                let pod = ctx
                    .cluster
                    .get_pod(&params.namespace, &params.pod_name)
                    .await?;
                let mut names: Vec<String> = pod
                    .spec
                    .map(|s| s.containers.into_iter().map(|c| c.name).collect())
                    .unwrap_or_default();
                match names.len() {
                    0 => {
                        return Err(ToolError::validation(format!(
                            "Pod '{}' has no containers",
                            params.pod_name
                        )))
                    }
                    1 => names.remove(0),
                    _ => return Err(ToolError::MultipleContainers { containers: names }),
                }
            }
        };

        let options = LogOptions {
            container: Some(container.clone()),
            tail_lines: Some(max_lines as i64),
            since_seconds,
            previous: params.previous,
        };
        let raw = ctx
            .cluster
            .pod_logs(&params.namespace, &params.pod_name, &options)
            .await?;

        let (logs, truncated) = truncate_logs(&raw, max_lines);
        let line_count = if logs.is_empty() {
            0
        } else {
            logs.split('\n').count()
        };

        let mut resp = ToolResponse::success(json!({
            "logs": logs,
            "line_count": line_count,
            "truncated": truncated,
            "pod_name": params.pod_name,
            "container_name": container,
        }))
        .with_metadata("container_name", &container);
        if truncated {
            resp = resp.with_warning(format!(
                "Logs truncated to {max_lines} lines. Use 'since' parameter to narrow the time range."
            ));
        }
        Ok(resp)
    })
    .await
}
