//! Kubernetes control-plane client
//!
//! Thin list/get layer over `kube`. The client and its credentials are built
//! once in [`KubeClient::new`]; every call creates its typed `Api` handle from
//! the shared [`Client`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::{
    ConfigMap, Event, Namespace, Node, Pod, Secret, Service,
};
use kube::api::{Api, ListParams, LogParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::{debug, info};

use crate::config::ObserverConfig;
use crate::error::ClusterError;

/// Options for a pod log read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    pub container: Option<String>,
    pub tail_lines: Option<i64>,
    pub since_seconds: Option<i64>,
    pub previous: bool,
}

/// Read-only view of the cluster used by the tools
///
/// A missing named object is [`ClusterError::NotFound`]; every other
/// failure is [`ClusterError::Api`].
#[async_trait]
pub trait ClusterSource: Send + Sync {
    async fn list_deployments(
        &self,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<Deployment>, ClusterError>;

    async fn get_deployment(&self, namespace: &str, name: &str)
        -> Result<Deployment, ClusterError>;

    async fn list_replica_sets(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<ReplicaSet>, ClusterError>;

    async fn list_pods(
        &self,
        namespace: Option<&str>,
        label_selector: Option<&str>,
        field_selector: Option<&str>,
    ) -> Result<Vec<Pod>, ClusterError>;

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, ClusterError>;

    async fn pod_logs(
        &self,
        namespace: &str,
        name: &str,
        options: &LogOptions,
    ) -> Result<String, ClusterError>;

    /// Events, most recent first
    async fn list_events(
        &self,
        namespace: Option<&str>,
        field_selector: Option<&str>,
    ) -> Result<Vec<Event>, ClusterError>;

    async fn list_nodes(&self, label_selector: Option<&str>) -> Result<Vec<Node>, ClusterError>;

    async fn list_namespaces(&self) -> Result<Vec<Namespace>, ClusterError>;

    async fn list_services(&self, namespace: Option<&str>) -> Result<Vec<Service>, ClusterError>;

    async fn list_config_maps(&self, namespace: &str) -> Result<Vec<ConfigMap>, ClusterError>;

    async fn list_secrets(&self, namespace: &str) -> Result<Vec<Secret>, ClusterError>;

    /// Pods matched by the deployment's `matchLabels`
    async fn pods_for_deployment(
        &self,
        namespace: &str,
        deployment_name: &str,
    ) -> Result<Vec<Pod>, ClusterError> {
        let deployment = self.get_deployment(namespace, deployment_name).await?;
        let selector = deployment_selector(&deployment);
        self.list_pods(Some(namespace), Some(&selector), None).await
    }
}

/// `k=v,k2=v2` from a deployment's match labels
pub fn deployment_selector(deployment: &Deployment) -> String {
    deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.selector.match_labels.as_ref())
        .map(|labels| {
            labels
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default()
}

/// Timestamp used to order events: last seen, else the event time
pub fn event_timestamp(event: &Event) -> Option<DateTime<Utc>> {
    event
        .last_timestamp
        .as_ref()
        .map(|t| t.0)
        .or_else(|| event.event_time.as_ref().map(|t| t.0))
}

/// Sort events most recent first; undated events go last
pub fn sort_events_desc(events: &mut [Event]) {
    events.sort_by(|a, b| event_timestamp(b).cmp(&event_timestamp(a)));
}

fn list_params(label_selector: Option<&str>, field_selector: Option<&str>) -> ListParams {
    let mut params = ListParams::default();
    if let Some(labels) = label_selector.filter(|s| !s.is_empty()) {
        params = params.labels(labels);
    }
    if let Some(fields) = field_selector.filter(|s| !s.is_empty()) {
        params = params.fields(fields);
    }
    params
}

fn api_message(err: &kube::Error) -> String {
    match err {
        kube::Error::Api(resp) if !resp.message.is_empty() => resp.message.clone(),
        kube::Error::Api(resp) => resp.reason.clone(),
        other => other.to_string(),
    }
}

fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 404)
}

/// Kubernetes client backed by `kube`
#[derive(Clone)]
pub struct KubeClient {
    client: Client,
}

impl KubeClient {
    /// Build the client from the configured credential source
    pub async fn new(config: &ObserverConfig) -> Result<Self, ClusterError> {
        let mut kube_config = Self::load_kube_config(config).await?;
        kube_config.read_timeout = Some(config.request_timeout());
        kube_config.connect_timeout = Some(config.request_timeout());

        let client =
            Client::try_from(kube_config).map_err(|e| ClusterError::Config(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an existing client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    async fn load_kube_config(config: &ObserverConfig) -> Result<Config, ClusterError> {
        if config.use_in_cluster() {
            info!("Using in-cluster Kubernetes credentials");
            return Config::incluster().map_err(|e| ClusterError::Config(e.to_string()));
        }

        let kubeconfig = match &config.kubeconfig_path {
            Some(path) => {
                info!(path = %path.display(), "Using kubeconfig file");
                Kubeconfig::read_from(path)
            }
            None => Kubeconfig::read(),
        }
        .map_err(|e| ClusterError::Config(e.to_string()))?;

        let options = KubeConfigOptions {
            context: config.kubernetes_context.clone(),
            ..KubeConfigOptions::default()
        };
        Config::from_custom_kubeconfig(kubeconfig, &options)
            .await
            .map_err(|e| ClusterError::Config(e.to_string()))
    }

    fn api<K>(&self, namespace: Option<&str>) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    async fn list_namespaced<K>(
        &self,
        what: &str,
        namespace: Option<&str>,
        params: &ListParams,
    ) -> Result<Vec<K>, ClusterError>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Debug,
        <K as kube::Resource>::DynamicType: Default,
    {
        debug!(resource = what, namespace = ?namespace, "Listing resources");
        self.api::<K>(namespace)
            .list(params)
            .await
            .map(|list| list.items)
            .map_err(|e| ClusterError::Api(format!("Failed to list {what}: {}", api_message(&e))))
    }
}

#[async_trait]
impl ClusterSource for KubeClient {
    async fn list_deployments(
        &self,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<Deployment>, ClusterError> {
        self.list_namespaced("deployments", namespace, &list_params(label_selector, None))
            .await
    }

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Deployment, ClusterError> {
        self.api::<Deployment>(Some(namespace))
            .get(name)
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    ClusterError::NotFound(format!(
                        "Deployment '{name}' not found in namespace '{namespace}'"
                    ))
                } else {
                    ClusterError::Api(format!("Failed to get deployment: {}", api_message(&e)))
                }
            })
    }

    async fn list_replica_sets(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<ReplicaSet>, ClusterError> {
        self.list_namespaced(
            "replica sets",
            Some(namespace),
            &list_params(label_selector, None),
        )
        .await
    }

    async fn list_pods(
        &self,
        namespace: Option<&str>,
        label_selector: Option<&str>,
        field_selector: Option<&str>,
    ) -> Result<Vec<Pod>, ClusterError> {
        self.list_namespaced(
            "pods",
            namespace,
            &list_params(label_selector, field_selector),
        )
        .await
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, ClusterError> {
        self.api::<Pod>(Some(namespace)).get(name).await.map_err(|e| {
            if is_not_found(&e) {
                ClusterError::NotFound(format!("Pod '{name}' not found in namespace '{namespace}'"))
            } else {
                ClusterError::Api(format!("Failed to get pod: {}", api_message(&e)))
            }
        })
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        name: &str,
        options: &LogOptions,
    ) -> Result<String, ClusterError> {
        let params = LogParams {
            container: options.container.clone(),
            tail_lines: options.tail_lines,
            since_seconds: options.since_seconds,
            previous: options.previous,
            ..LogParams::default()
        };
        self.api::<Pod>(Some(namespace))
            .logs(name, &params)
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    ClusterError::NotFound(format!(
                        "Pod '{name}' not found in namespace '{namespace}'"
                    ))
                } else {
                    ClusterError::Api(format!("Failed to get pod logs: {}", api_message(&e)))
                }
            })
    }

    async fn list_events(
        &self,
        namespace: Option<&str>,
        field_selector: Option<&str>,
    ) -> Result<Vec<Event>, ClusterError> {
        let mut events: Vec<Event> = self
            .list_namespaced("events", namespace, &list_params(None, field_selector))
            .await?;
        sort_events_desc(&mut events);
        Ok(events)
    }

    async fn list_nodes(&self, label_selector: Option<&str>) -> Result<Vec<Node>, ClusterError> {
        Api::<Node>::all(self.client.clone())
            .list(&list_params(label_selector, None))
            .await
            .map(|list| list.items)
            .map_err(|e| ClusterError::Api(format!("Failed to list nodes: {}", api_message(&e))))
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>, ClusterError> {
        Api::<Namespace>::all(self.client.clone())
            .list(&ListParams::default())
            .await
            .map(|list| list.items)
            .map_err(|e| {
                ClusterError::Api(format!("Failed to list namespaces: {}", api_message(&e)))
            })
    }

    async fn list_services(&self, namespace: Option<&str>) -> Result<Vec<Service>, ClusterError> {
        self.list_namespaced("services", namespace, &ListParams::default())
            .await
    }

    async fn list_config_maps(&self, namespace: &str) -> Result<Vec<ConfigMap>, ClusterError> {
        self.list_namespaced("configmaps", Some(namespace), &ListParams::default())
            .await
    }

    async fn list_secrets(&self, namespace: &str) -> Result<Vec<Secret>, ClusterError> {
        self.list_namespaced("secrets", Some(namespace), &ListParams::default())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, MicroTime, Time};
    use std::collections::BTreeMap;

    #[test]
    fn test_deployment_selector() {
        let deployment = Deployment {
            spec: Some(DeploymentSpec {
                selector: LabelSelector {
                    match_labels: Some(BTreeMap::from([
                        ("app".to_string(), "web".to_string()),
                        ("tier".to_string(), "frontend".to_string()),
                    ])),
                    ..LabelSelector::default()
                },
                ..DeploymentSpec::default()
            }),
            ..Deployment::default()
        };
        assert_eq!(deployment_selector(&deployment), "app=web,tier=frontend");
        assert_eq!(deployment_selector(&Deployment::default()), "");
    }

    #[test]
    fn test_events_sorted_most_recent_first() {
        let now = Utc::now();
        let older = Event {
            last_timestamp: Some(Time(now - chrono::Duration::minutes(5))),
            ..Event::default()
        };
        let newer = Event {
            event_time: Some(MicroTime(now)),
            ..Event::default()
        };
        let undated = Event::default();

        let mut events = vec![undated, older, newer];
        sort_events_desc(&mut events);

        assert_eq!(event_timestamp(&events[0]), Some(now));
        assert_eq!(event_timestamp(&events[2]), None);
    }

    #[test]
    fn test_list_params_skip_empty_selectors() {
        let params = list_params(Some(""), Some("type=Warning"));
        assert_eq!(params.label_selector, None);
        assert_eq!(params.field_selector.as_deref(), Some("type=Warning"));
    }
}
