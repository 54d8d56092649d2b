//! Snapshot records built from cluster objects

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pod lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    /// Map a raw phase string; anything unrecognised is `Unknown`
    pub fn parse(phase: Option<&str>) -> Self {
        match phase {
            Some("Pending") => PodPhase::Pending,
            Some("Running") => PodPhase::Running,
            Some("Succeeded") => PodPhase::Succeeded,
            Some("Failed") => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
        }
    }
}

/// Container runtime state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerState {
    Running,
    Waiting,
    Terminated,
}

/// Requests and limits declared on a container spec
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerResources {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limits: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub name: String,
    pub image: String,
    pub state: ContainerState,
    pub ready: bool,
    pub restart_count: i32,
    /// Reason of the last termination (e.g. OOMKilled, Error)
    pub last_restart_reason: Option<String>,
    pub resources: ContainerResources,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub phase: PodPhase,
    pub node: Option<String>,
    pub ip: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub containers: Vec<ContainerInfo>,
    pub total_restart_count: i32,
    pub labels: BTreeMap<String, String>,
}

impl PodInfo {
    /// Running with every container ready
    pub fn is_healthy(&self) -> bool {
        self.phase == PodPhase::Running && self.containers.iter().all(|c| c.ready)
    }
}

/// Aggregate over a set of pods
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodStatusSummary {
    pub total_pods: usize,
    pub running: usize,
    pub pending: usize,
    pub failed: usize,
    pub total_restarts: i64,
    pub pods: Vec<PodInfo>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaStatus {
    pub desired: i32,
    pub ready: i32,
    pub available: i32,
    pub unavailable: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    pub reason: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentInfo {
    pub name: String,
    pub namespace: String,
    pub replicas: ReplicaStatus,
    /// First container image of the pod template
    pub image: String,
    pub images: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub labels: BTreeMap<String, String>,
    pub selector: BTreeMap<String, String>,
    pub strategy: String,
    pub conditions: Vec<DeploymentCondition>,
}

impl DeploymentInfo {
    pub fn is_healthy(&self) -> bool {
        self.replicas.ready >= self.replicas.desired
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceSummary {
    pub name: String,
    pub pod_count: usize,
    pub running_pods: usize,
    pub deployment_count: usize,
    pub service_count: usize,
    pub configmap_count: usize,
    pub secret_count: usize,
    pub total_restarts: i64,
    /// 0.0 to 1.0, from running ratio minus a restart penalty
    pub health_score: f64,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    pub roles: Vec<String>,
    pub ready: bool,
    pub cpu_capacity: String,
    pub memory_capacity: String,
    pub cpu_allocatable: String,
    pub memory_allocatable: String,
    pub pod_count: usize,
    /// Condition type to whether its status is "True"
    pub conditions: BTreeMap<String, bool>,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterCapacity {
    pub node_count: usize,
    pub nodes_ready: usize,
    pub total_cpu: String,
    pub total_memory: String,
    pub allocatable_cpu: String,
    pub allocatable_memory: String,
    pub nodes: Vec<NodeInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSeverity {
    Normal,
    Warning,
}

impl EventSeverity {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("Warning") => EventSeverity::Warning,
            _ => EventSeverity::Normal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectReference {
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventInfo {
    pub name: String,
    pub namespace: String,
    #[serde(rename = "type")]
    pub type_: EventSeverity,
    pub reason: String,
    pub message: String,
    pub involved_object: ObjectReference,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub count: i32,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentHistoryEntry {
    pub revision: i64,
    pub image: String,
    pub created_at: Option<DateTime<Utc>>,
    pub replicas: i32,
    pub change_cause: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartPattern {
    pub total_restarts: i64,
    pub restart_rate_per_hour: f64,
    /// Termination reason weighted by restart count
    pub crash_reasons: BTreeMap<String, i64>,
    pub restart_times: Vec<DateTime<Utc>>,
    pub pattern_detected: Option<String>,
    pub affected_pods: Vec<String>,
}
