//! In-memory backends and object builders for tool tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::{
    Deployment, DeploymentSpec, DeploymentStatus, ReplicaSet, ReplicaSetSpec, ReplicaSetStatus,
};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, ContainerState as K8sContainerState, ContainerStateRunning,
    ContainerStateTerminated, ContainerStateWaiting, ContainerStatus, Event, Namespace, Node,
    NodeCondition, NodeStatus, ObjectReference, Pod, PodSpec, PodStatus, PodTemplateSpec,
    ResourceRequirements, Secret, Service,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, Time};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use super::ToolContext;
use crate::clients::kubernetes::{sort_events_desc, ClusterSource, LogOptions};
use crate::clients::prometheus::{InstantSample, MetricsSource, RangeSeries};
use crate::config::ObserverConfig;
use crate::error::{ClusterError, MetricsError};

pub fn context(cluster: FakeCluster, metrics: FakeMetrics) -> ToolContext {
    context_with(ObserverConfig::default(), cluster, metrics)
}

pub fn context_with(
    config: ObserverConfig,
    cluster: FakeCluster,
    metrics: FakeMetrics,
) -> ToolContext {
    ToolContext::new(config, Arc::new(cluster), Arc::new(metrics))
}

fn labels_match(labels: Option<&BTreeMap<String, String>>, selector: Option<&str>) -> bool {
    let Some(selector) = selector.filter(|s| !s.is_empty()) else {
        return true;
    };
    let empty = BTreeMap::new();
    let labels = labels.unwrap_or(&empty);
    selector.split(',').all(|term| match term.split_once('=') {
        Some((k, v)) => labels.get(k.trim()).map(String::as_str) == Some(v.trim()),
        None => labels.contains_key(term.trim()),
    })
}

fn ns_match(meta: &ObjectMeta, namespace: Option<&str>) -> bool {
    namespace.map_or(true, |ns| meta.namespace.as_deref() == Some(ns))
}

/// Field lookups supported by the fake: `spec.nodeName`, `type`, `involvedObject.kind`
fn fields_match(lookup: impl Fn(&str) -> Option<String>, selector: Option<&str>) -> bool {
    let Some(selector) = selector.filter(|s| !s.is_empty()) else {
        return true;
    };
    selector.split(',').all(|term| match term.split_once('=') {
        Some((field, value)) => lookup(field).as_deref() == Some(value),
        None => false,
    })
}

/// Cluster backed by fixed object lists
#[derive(Default)]
pub struct FakeCluster {
    pub deployments: Vec<Deployment>,
    pub replica_sets: Vec<ReplicaSet>,
    pub pods: Vec<Pod>,
    pub events: Vec<Event>,
    pub nodes: Vec<Node>,
    pub namespaces: Vec<Namespace>,
    pub services: Vec<Service>,
    pub config_maps: Vec<ConfigMap>,
    pub secrets: Vec<Secret>,
    pub logs: BTreeMap<String, String>,
    /// Fail every call with this API error
    pub fail_with: Option<String>,
    pub log_requests: Mutex<Vec<LogOptions>>,
}

impl FakeCluster {
    fn check(&self) -> Result<(), ClusterError> {
        match &self.fail_with {
            Some(msg) => Err(ClusterError::Api(msg.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ClusterSource for FakeCluster {
    async fn list_deployments(
        &self,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<Deployment>, ClusterError> {
        self.check()?;
        Ok(self
            .deployments
            .iter()
            .filter(|d| ns_match(&d.metadata, namespace))
            .filter(|d| labels_match(d.metadata.labels.as_ref(), label_selector))
            .cloned()
            .collect())
    }

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Deployment, ClusterError> {
        self.check()?;
        self.deployments
            .iter()
            .find(|d| {
                d.metadata.name.as_deref() == Some(name)
                    && d.metadata.namespace.as_deref() == Some(namespace)
            })
            .cloned()
            .ok_or_else(|| {
                ClusterError::NotFound(format!(
                    "Deployment '{name}' not found in namespace '{namespace}'"
                ))
            })
    }

    async fn list_replica_sets(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<ReplicaSet>, ClusterError> {
        self.check()?;
        Ok(self
            .replica_sets
            .iter()
            .filter(|rs| ns_match(&rs.metadata, Some(namespace)))
            .filter(|rs| labels_match(rs.metadata.labels.as_ref(), label_selector))
            .cloned()
            .collect())
    }

    async fn list_pods(
        &self,
        namespace: Option<&str>,
        label_selector: Option<&str>,
        field_selector: Option<&str>,
    ) -> Result<Vec<Pod>, ClusterError> {
        self.check()?;
        Ok(self
            .pods
            .iter()
            .filter(|p| ns_match(&p.metadata, namespace))
            .filter(|p| labels_match(p.metadata.labels.as_ref(), label_selector))
            .filter(|p| {
                fields_match(
                    |field| match field {
                        "spec.nodeName" => p.spec.as_ref().and_then(|s| s.node_name.clone()),
                        _ => None,
                    },
                    field_selector,
                )
            })
            .cloned()
            .collect())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, ClusterError> {
        self.check()?;
        self.pods
            .iter()
            .find(|p| {
                p.metadata.name.as_deref() == Some(name)
                    && p.metadata.namespace.as_deref() == Some(namespace)
            })
            .cloned()
            .ok_or_else(|| {
                ClusterError::NotFound(format!("Pod '{name}' not found in namespace '{namespace}'"))
            })
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        name: &str,
        options: &LogOptions,
    ) -> Result<String, ClusterError> {
        self.check()?;
        if let Ok(mut requests) = self.log_requests.lock() {
            requests.push(options.clone());
        }
        self.logs.get(name).cloned().ok_or_else(|| {
            ClusterError::NotFound(format!("Pod '{name}' not found in namespace '{namespace}'"))
        })
    }

    async fn list_events(
        &self,
        namespace: Option<&str>,
        field_selector: Option<&str>,
    ) -> Result<Vec<Event>, ClusterError> {
        self.check()?;
        let mut events: Vec<Event> = self
            .events
            .iter()
            .filter(|e| ns_match(&e.metadata, namespace))
            .filter(|e| {
                fields_match(
                    |field| match field {
                        "type" => e.type_.clone(),
                        "involvedObject.kind" => e.involved_object.kind.clone(),
                        _ => None,
                    },
                    field_selector,
                )
            })
            .cloned()
            .collect();
        sort_events_desc(&mut events);
        Ok(events)
    }

    async fn list_nodes(&self, label_selector: Option<&str>) -> Result<Vec<Node>, ClusterError> {
        self.check()?;
        Ok(self
            .nodes
            .iter()
            .filter(|n| labels_match(n.metadata.labels.as_ref(), label_selector))
            .cloned()
            .collect())
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>, ClusterError> {
        self.check()?;
        Ok(self.namespaces.clone())
    }

    async fn list_services(&self, namespace: Option<&str>) -> Result<Vec<Service>, ClusterError> {
        self.check()?;
        Ok(self
            .services
            .iter()
            .filter(|s| ns_match(&s.metadata, namespace))
            .cloned()
            .collect())
    }

    async fn list_config_maps(&self, namespace: &str) -> Result<Vec<ConfigMap>, ClusterError> {
        self.check()?;
        Ok(self
            .config_maps
            .iter()
            .filter(|c| ns_match(&c.metadata, Some(namespace)))
            .cloned()
            .collect())
    }

    async fn list_secrets(&self, namespace: &str) -> Result<Vec<Secret>, ClusterError> {
        self.check()?;
        Ok(self
            .secrets
            .iter()
            .filter(|s| ns_match(&s.metadata, Some(namespace)))
            .cloned()
            .collect())
    }
}

/// Canned instant result keyed by a substring of the expression
pub enum InstantReply {
    Samples(Vec<InstantSample>),
    QueryError(String),
}

/// Metrics backend with canned replies
#[derive(Default)]
pub struct FakeMetrics {
    pub instant: Vec<(String, InstantReply)>,
    /// Range replies handed out in call order; empty once exhausted
    pub range: Mutex<VecDeque<Vec<RangeSeries>>>,
    pub range_error: Option<String>,
    pub queries: Mutex<Vec<String>>,
    pub healthy: bool,
}

impl FakeMetrics {
    pub fn with_instant(mut self, needle: &str, samples: Vec<InstantSample>) -> Self {
        self.instant
            .push((needle.to_string(), InstantReply::Samples(samples)));
        self
    }

    pub fn with_instant_error(mut self, needle: &str, message: &str) -> Self {
        self.instant
            .push((needle.to_string(), InstantReply::QueryError(message.to_string())));
        self
    }

    pub fn with_range(self, series: Vec<RangeSeries>) -> Self {
        if let Ok(mut range) = self.range.lock() {
            range.push_back(series);
        }
        self
    }

    pub fn recorded_queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }

    fn record(&self, expr: &str) {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(expr.to_string());
        }
    }
}

#[async_trait]
impl MetricsSource for FakeMetrics {
    async fn query(
        &self,
        expr: &str,
        _time: Option<DateTime<Utc>>,
    ) -> Result<Vec<InstantSample>, MetricsError> {
        self.record(expr);
        for (needle, reply) in &self.instant {
            if expr.contains(needle.as_str()) {
                return match reply {
                    InstantReply::Samples(samples) => Ok(samples.clone()),
                    InstantReply::QueryError(msg) => Err(MetricsError::Query(msg.clone())),
                };
            }
        }
        Ok(Vec::new())
    }

    async fn query_range(
        &self,
        expr: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _step: Option<&str>,
    ) -> Result<Vec<RangeSeries>, MetricsError> {
        self.record(expr);
        if let Some(msg) = &self.range_error {
            return Err(MetricsError::Client(msg.clone()));
        }
        Ok(self
            .range
            .lock()
            .ok()
            .and_then(|mut range| range.pop_front())
            .unwrap_or_default())
    }

    async fn label_values(
        &self,
        _label: &str,
        _matcher: Option<&str>,
    ) -> Result<Vec<String>, MetricsError> {
        Ok(Vec::new())
    }

    async fn metric_names(&self, _matcher: Option<&str>) -> Result<Vec<String>, MetricsError> {
        Ok(Vec::new())
    }

    async fn is_healthy(&self) -> bool {
        self.healthy
    }
}

// ---- object builders ----

pub fn meta(namespace: &str, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        creation_timestamp: Some(Time(Utc::now())),
        ..ObjectMeta::default()
    }
}

pub fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn namespace(name: &str, pairs: &[(&str, &str)]) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels(pairs)),
            ..ObjectMeta::default()
        },
        ..Namespace::default()
    }
}

pub fn container(name: &str, image: &str) -> Container {
    Container {
        name: name.to_string(),
        image: Some(image.to_string()),
        ..Container::default()
    }
}

pub fn with_resources(mut c: Container, requests: &[(&str, &str)], limits: &[(&str, &str)]) -> Container {
    let to_map = |pairs: &[(&str, &str)]| -> Option<BTreeMap<String, Quantity>> {
        if pairs.is_empty() {
            None
        } else {
            Some(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), Quantity(v.to_string())))
                    .collect(),
            )
        }
    };
    c.resources = Some(ResourceRequirements {
        requests: to_map(requests),
        limits: to_map(limits),
        ..ResourceRequirements::default()
    });
    c
}

pub fn deployment(
    namespace: &str,
    name: &str,
    desired: i32,
    ready: i32,
    containers: Vec<Container>,
) -> Deployment {
    let selector = labels(&[("app", name)]);
    Deployment {
        metadata: ObjectMeta {
            labels: Some(selector.clone()),
            ..meta(namespace, name)
        },
        spec: Some(DeploymentSpec {
            replicas: Some(desired),
            selector: LabelSelector {
                match_labels: Some(selector.clone()),
                ..LabelSelector::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(selector),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    containers,
                    ..PodSpec::default()
                }),
            },
            ..DeploymentSpec::default()
        }),
        status: Some(DeploymentStatus {
            ready_replicas: Some(ready),
            available_replicas: Some(ready),
            ..DeploymentStatus::default()
        }),
    }
}

pub fn replica_set(
    namespace: &str,
    app: &str,
    revision: &str,
    image: &str,
    live_replicas: i32,
    created: DateTime<Utc>,
) -> ReplicaSet {
    let mut annotations = labels(&[("deployment.kubernetes.io/revision", revision)]);
    annotations.insert(
        "kubernetes.io/change-cause".to_string(),
        format!("deploy {image}"),
    );
    ReplicaSet {
        metadata: ObjectMeta {
            labels: Some(labels(&[("app", app)])),
            annotations: Some(annotations),
            creation_timestamp: Some(Time(created)),
            ..meta(namespace, &format!("{app}-{revision}"))
        },
        spec: Some(ReplicaSetSpec {
            replicas: Some(live_replicas),
            template: Some(PodTemplateSpec {
                metadata: None,
                spec: Some(PodSpec {
                    containers: vec![container("app", image)],
                    ..PodSpec::default()
                }),
            }),
            ..ReplicaSetSpec::default()
        }),
        status: Some(ReplicaSetStatus {
            replicas: live_replicas,
            ..ReplicaSetStatus::default()
        }),
    }
}

/// Runtime status of one container
pub struct ContainerRun {
    pub name: &'static str,
    pub ready: bool,
    pub restarts: i32,
    pub state: &'static str,
    pub last_reason: Option<&'static str>,
    pub last_finished: Option<DateTime<Utc>>,
}

impl ContainerRun {
    pub fn running(name: &'static str) -> Self {
        Self {
            name,
            ready: true,
            restarts: 0,
            state: "running",
            last_reason: None,
            last_finished: None,
        }
    }

    pub fn crashed(
        name: &'static str,
        restarts: i32,
        reason: &'static str,
        finished: DateTime<Utc>,
    ) -> Self {
        Self {
            name,
            ready: false,
            restarts,
            state: "waiting",
            last_reason: Some(reason),
            last_finished: Some(finished),
        }
    }

    fn status(&self) -> ContainerStatus {
        let state = match self.state {
            "running" => K8sContainerState {
                running: Some(ContainerStateRunning::default()),
                ..K8sContainerState::default()
            },
            "waiting" => K8sContainerState {
                waiting: Some(ContainerStateWaiting {
                    reason: Some("CrashLoopBackOff".to_string()),
                    ..ContainerStateWaiting::default()
                }),
                ..K8sContainerState::default()
            },
            _ => K8sContainerState {
                terminated: Some(ContainerStateTerminated::default()),
                ..K8sContainerState::default()
            },
        };
        let last_state = self.last_reason.map(|reason| K8sContainerState {
            terminated: Some(ContainerStateTerminated {
                reason: Some(reason.to_string()),
                finished_at: self.last_finished.map(Time),
                exit_code: 137,
                ..ContainerStateTerminated::default()
            }),
            ..K8sContainerState::default()
        });
        ContainerStatus {
            name: self.name.to_string(),
            image: format!("{}:1.0", self.name),
            ready: self.ready,
            restart_count: self.restarts,
            state: Some(state),
            last_state,
            ..ContainerStatus::default()
        }
    }
}

pub fn pod(
    namespace: &str,
    name: &str,
    app: &str,
    phase: &str,
    node: &str,
    runs: Vec<ContainerRun>,
) -> Pod {
    let containers = runs
        .iter()
        .map(|r| container(r.name, &format!("{}:1.0", r.name)))
        .collect();
    Pod {
        metadata: ObjectMeta {
            labels: Some(labels(&[("app", app)])),
            ..meta(namespace, name)
        },
        spec: Some(PodSpec {
            containers,
            node_name: Some(node.to_string()),
            ..PodSpec::default()
        }),
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            pod_ip: Some("10.0.0.1".to_string()),
            container_statuses: Some(runs.iter().map(ContainerRun::status).collect()),
            ..PodStatus::default()
        }),
    }
}

pub fn event(
    namespace: &str,
    name: &str,
    type_: &str,
    kind: &str,
    last_seen: Option<DateTime<Utc>>,
) -> Event {
    Event {
        metadata: meta(namespace, name),
        type_: Some(type_.to_string()),
        reason: Some("BackOff".to_string()),
        message: Some(format!("{name} happened")),
        involved_object: ObjectReference {
            kind: Some(kind.to_string()),
            name: Some(format!("{name}-target")),
            ..ObjectReference::default()
        },
        last_timestamp: last_seen.map(Time),
        ..Event::default()
    }
}

pub fn node(name: &str, role: Option<&str>, cpu: &str, memory: &str, ready: bool) -> Node {
    let mut node_labels = labels(&[("kubernetes.io/hostname", name)]);
    if let Some(role) = role {
        node_labels.insert(format!("node-role.kubernetes.io/{role}"), String::new());
    }
    let resources: BTreeMap<String, Quantity> = [
        ("cpu".to_string(), Quantity(cpu.to_string())),
        ("memory".to_string(), Quantity(memory.to_string())),
    ]
    .into_iter()
    .collect();
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(node_labels),
            ..ObjectMeta::default()
        },
        status: Some(NodeStatus {
            capacity: Some(resources.clone()),
            allocatable: Some(resources),
            conditions: Some(vec![NodeCondition {
                type_: "Ready".to_string(),
                status: if ready { "True" } else { "False" }.to_string(),
                ..NodeCondition::default()
            }]),
            ..NodeStatus::default()
        }),
        ..Node::default()
    }
}

pub fn sample(pod: &str, value: f64) -> InstantSample {
    InstantSample {
        metric: labels(&[("pod", pod)]),
        value: (1_700_000_000.0, value.to_string()),
    }
}

/// One unlabelled series with a sample per minute starting at `start`
pub fn series(start: DateTime<Utc>, values: &[&str]) -> RangeSeries {
    RangeSeries {
        metric: BTreeMap::new(),
        values: values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                (
                    (start.timestamp() + 60 * i as i64) as f64,
                    v.to_string(),
                )
            })
            .collect(),
    }
}
