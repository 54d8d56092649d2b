//! Resource discovery: deployments, namespaces, nodes

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::Deserialize;
use serde_json::json;

use super::{created_at, labels_of, object_name, ToolContext};
use crate::envelope::{run_tool, Params, ToolResponse};
use crate::models::{
    ClusterCapacity, DeploymentCondition, DeploymentInfo, NamespaceSummary, NodeInfo,
    ReplicaStatus,
};
use crate::units::{format_gib, parse_cpu_quantity, parse_memory_quantity, round_to};

/// Penalty subtracted from a namespace health score per container restart
const RESTART_PENALTY: f64 = 0.05;

const NODE_ROLE_PREFIX: &str = "node-role.kubernetes.io/";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentInfoParams {
    pub namespace: Option<String>,
    pub deployment_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamespaceSummaryParams {
    pub namespace: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterCapacityParams {
    pub node_selector: Option<String>,
}

fn deployment_info(dep: &Deployment) -> DeploymentInfo {
    let spec = dep.spec.as_ref();
    let status = dep.status.as_ref();

    let images: Vec<String> = spec
        .and_then(|s| s.template.spec.as_ref())
        .map(|pod| {
            pod.containers
                .iter()
                .map(|c| c.image.clone().unwrap_or_default())
                .collect()
        })
        .unwrap_or_default();
    let image = images
        .first()
        .cloned()
        .unwrap_or_else(|| "unknown".to_string());

    let replicas = ReplicaStatus {
        desired: spec.and_then(|s| s.replicas).unwrap_or(0),
        ready: status.and_then(|s| s.ready_replicas).unwrap_or(0),
        available: status.and_then(|s| s.available_replicas).unwrap_or(0),
        unavailable: status.and_then(|s| s.unavailable_replicas).unwrap_or(0),
    };

    let conditions = status
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| {
            conds
                .iter()
                .map(|c| DeploymentCondition {
                    type_: c.type_.clone(),
                    status: c.status.clone(),
                    reason: c.reason.clone().unwrap_or_default(),
                    message: c.message.clone().unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default();

    DeploymentInfo {
        name: object_name(&dep.metadata),
        namespace: dep.metadata.namespace.clone().unwrap_or_default(),
        replicas,
        image,
        images,
        created_at: created_at(&dep.metadata),
        labels: labels_of(&dep.metadata),
        selector: spec
            .and_then(|s| s.selector.match_labels.clone())
            .unwrap_or_default(),
        strategy: spec
            .and_then(|s| s.strategy.as_ref())
            .and_then(|s| s.type_.clone())
            .unwrap_or_else(|| "RollingUpdate".to_string()),
        conditions,
    }
}

/// Deployments with images, replica status and conditions
///
/// A `deployment_name` without a `namespace` is looked up in the configured
/// default namespace.
pub async fn get_deployment_info(ctx: &ToolContext, params: DeploymentInfoParams) -> ToolResponse {
    let echo = Params::new()
        .with("namespace", params.namespace.as_deref().unwrap_or("all"))
        .with("deployment_name", &params.deployment_name);

    run_tool("get_deployment_info", echo, async {
        let deployments = match &params.deployment_name {
            Some(name) => {
                let namespace = params
                    .namespace
                    .as_deref()
                    .unwrap_or(&ctx.config.default_namespace);
                vec![ctx.cluster.get_deployment(namespace, name).await?]
            }
            None => {
                ctx.cluster
                    .list_deployments(params.namespace.as_deref(), None)
                    .await?
            }
        };

        let infos: Vec<DeploymentInfo> = deployments.iter().map(deployment_info).collect();
        let healthy_count = infos.iter().filter(|d| d.is_healthy()).count();

        Ok(ToolResponse::success(json!({
            "deployments": infos,
            "total_count": infos.len(),
            "healthy_count": healthy_count,
        })))
    })
    .await
}

fn restart_total(pods: &[Pod]) -> i64 {
    pods.iter()
        .filter_map(|p| p.status.as_ref()?.container_statuses.as_ref())
        .flatten()
        .map(|cs| i64::from(cs.restart_count))
        .sum()
}

fn is_running(pod: &Pod) -> bool {
    pod.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Running")
}

/// Running ratio minus a per-restart penalty, clamped at zero; empty is 1.0
pub fn health_score(pod_count: usize, running: usize, restarts: i64) -> f64 {
    if pod_count == 0 {
        return 1.0;
    }
    let running_ratio = running as f64 / pod_count as f64;
    let penalty = (restarts as f64 * RESTART_PENALTY).min(1.0);
    (running_ratio - penalty).max(0.0)
}

/// Resource counts and health score for one or all namespaces
pub async fn get_namespace_summary(
    ctx: &ToolContext,
    params: NamespaceSummaryParams,
) -> ToolResponse {
    let echo = Params::new().with("namespace", params.namespace.as_deref().unwrap_or("all"));

    run_tool("get_namespace_summary", echo, async {
        let all_namespaces = ctx.cluster.list_namespaces().await?;
        let namespace_labels: BTreeMap<String, BTreeMap<String, String>> = all_namespaces
            .iter()
            .map(|ns| (object_name(&ns.metadata), labels_of(&ns.metadata)))
            .collect();

        let targets: Vec<String> = match &params.namespace {
            Some(ns) => vec![ns.clone()],
            None => namespace_labels.keys().cloned().collect(),
        };

        let mut summaries = Vec::with_capacity(targets.len());
        for ns in targets {
            let pods = ctx.cluster.list_pods(Some(&ns), None, None).await?;
            let deployments = ctx.cluster.list_deployments(Some(&ns), None).await?;
            let services = ctx.cluster.list_services(Some(&ns)).await?;
            let config_maps = ctx.cluster.list_config_maps(&ns).await?;
            let secrets = ctx.cluster.list_secrets(&ns).await?;

            let running_pods = pods.iter().filter(|p| is_running(p)).count();
            let total_restarts = restart_total(&pods);
            let score = health_score(pods.len(), running_pods, total_restarts);

            summaries.push(NamespaceSummary {
                labels: namespace_labels.get(&ns).cloned().unwrap_or_default(),
                name: ns,
                pod_count: pods.len(),
                running_pods,
                deployment_count: deployments.len(),
                service_count: services.len(),
                configmap_count: config_maps.len(),
                secret_count: secrets.len(),
                total_restarts,
                health_score: round_to(score, 2),
            });
        }

        let cluster_health = if summaries.is_empty() {
            1.0
        } else {
            summaries.iter().map(|s| s.health_score).sum::<f64>() / summaries.len() as f64
        };

        Ok(ToolResponse::success(json!({
            "total_namespaces": summaries.len(),
            "cluster_health_score": round_to(cluster_health, 2),
            "namespaces": summaries,
        })))
    })
    .await
}

fn quantity(map: Option<&BTreeMap<String, Quantity>>, key: &str) -> String {
    map.and_then(|m| m.get(key))
        .map(|q| q.0.clone())
        .unwrap_or_else(|| "0".to_string())
}

/// Node role names taken from `node-role.kubernetes.io/<role>` labels
pub fn node_roles(labels: &BTreeMap<String, String>) -> Vec<String> {
    let roles: Vec<String> = labels
        .keys()
        .filter_map(|key| key.strip_prefix(NODE_ROLE_PREFIX))
        .map(str::to_string)
        .collect();
    if roles.is_empty() {
        vec!["worker".to_string()]
    } else {
        roles
    }
}

#[derive(Default)]
struct CapacityTotals {
    cpu: f64,
    memory: u64,
    allocatable_cpu: f64,
    allocatable_memory: u64,
    warnings: Vec<String>,
}

impl CapacityTotals {
    fn parse_cpu(&mut self, node: &str, raw: &str) -> f64 {
        parse_cpu_quantity(raw).unwrap_or_else(|err| {
            self.warnings.push(format!("Node {node}: {err}"));
            0.0
        })
    }

    fn parse_memory(&mut self, node: &str, raw: &str) -> u64 {
        parse_memory_quantity(raw).unwrap_or_else(|err| {
            self.warnings.push(format!("Node {node}: {err}"));
            0
        })
    }

    fn add_node(&mut self, node: &NodeInfo) {
        let cpu = self.parse_cpu(&node.name, &node.cpu_capacity);
        let memory = self.parse_memory(&node.name, &node.memory_capacity);
        let allocatable_cpu = self.parse_cpu(&node.name, &node.cpu_allocatable);
        let allocatable_memory = self.parse_memory(&node.name, &node.memory_allocatable);
        self.cpu += cpu;
        self.memory = self.memory.saturating_add(memory);
        self.allocatable_cpu += allocatable_cpu;
        self.allocatable_memory = self.allocatable_memory.saturating_add(allocatable_memory);
    }
}

fn node_info(node: &Node, pod_count: usize) -> NodeInfo {
    let status = node.status.as_ref();
    let capacity = status.and_then(|s| s.capacity.as_ref());
    let allocatable = status.and_then(|s| s.allocatable.as_ref());

    let conditions: BTreeMap<String, bool> = status
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| {
            conds
                .iter()
                .map(|c| (c.type_.clone(), c.status == "True"))
                .collect()
        })
        .unwrap_or_default();
    let labels = labels_of(&node.metadata);

    NodeInfo {
        name: object_name(&node.metadata),
        roles: node_roles(&labels),
        ready: conditions.get("Ready").copied().unwrap_or(false),
        cpu_capacity: quantity(capacity, "cpu"),
        memory_capacity: quantity(capacity, "memory"),
        cpu_allocatable: quantity(allocatable, "cpu"),
        memory_allocatable: quantity(allocatable, "memory"),
        pod_count,
        conditions,
        labels,
    }
}

/// Cluster totals and per-node capacity
///
/// Node quantities that fail to parse count as zero and add a warning.
pub async fn get_cluster_capacity(
    ctx: &ToolContext,
    params: ClusterCapacityParams,
) -> ToolResponse {
    let echo = Params::new().with(
        "node_selector",
        params.node_selector.as_deref().unwrap_or("all"),
    );

    run_tool("get_cluster_capacity", echo, async {
        let nodes = ctx.cluster.list_nodes(params.node_selector.as_deref()).await?;

        let mut totals = CapacityTotals::default();
        let mut infos = Vec::with_capacity(nodes.len());
        for node in &nodes {
            let field = format!("spec.nodeName={}", object_name(&node.metadata));
            let pods = ctx.cluster.list_pods(None, None, Some(&field)).await?;
            let info = node_info(node, pods.len());
            totals.add_node(&info);
            infos.push(info);
        }

        let nodes_ready = infos.iter().filter(|n| n.ready).count();
        let capacity = ClusterCapacity {
            node_count: infos.len(),
            nodes_ready,
            total_cpu: format!("{:.1}", totals.cpu),
            total_memory: format_gib(totals.memory),
            allocatable_cpu: format!("{:.1}", totals.allocatable_cpu),
            allocatable_memory: format_gib(totals.allocatable_memory),
            nodes: infos,
        };

        Ok(ToolResponse::success(json!({
            "node_count": capacity.node_count,
            "nodes_ready": nodes_ready,
            "cluster": capacity,
        }))
        .with_warnings(totals.warnings))
    })
    .await
}
