//! Observer configuration
//!
//! Built once at process start and passed by reference into every client
//! and tool call.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Service-account token mounted into pods running in a cluster
pub const IN_CLUSTER_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Where Kubernetes credentials come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    /// In-cluster when the service-account token exists, kubeconfig otherwise
    #[default]
    Auto,
    InCluster,
    Kubeconfig,
}

/// Observer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ObserverConfig {
    /// Prometheus base URL
    #[serde(default = "default_prometheus_url")]
    pub prometheus_url: String,

    /// Optional bearer token sent to Prometheus
    #[serde(default)]
    pub prometheus_bearer_token: Option<String>,

    #[serde(default)]
    pub credential_source: CredentialSource,

    /// Kubeconfig file for local development
    #[serde(default)]
    pub kubeconfig_path: Option<PathBuf>,

    /// Kubeconfig context to use
    #[serde(default)]
    pub kubernetes_context: Option<String>,

    #[serde(default = "default_namespace")]
    pub default_namespace: String,

    #[serde(default = "default_max_log_lines")]
    pub max_log_lines: usize,

    #[serde(default = "default_max_events")]
    pub max_events: usize,

    #[serde(default = "default_max_timeseries_points")]
    pub max_timeseries_points: usize,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Namespaces with these prefixes are skipped by the cluster-wide anomaly scan
    #[serde(default = "default_excluded_prefixes")]
    pub excluded_namespace_prefixes: Vec<String>,

    /// Namespaces skipped by the cluster-wide anomaly scan
    #[serde(default = "default_excluded_namespaces")]
    pub excluded_namespaces: Vec<String>,
}

fn default_prometheus_url() -> String {
    "http://kube-prometheus-stack-prometheus.monitoring:9090".to_string()
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_max_log_lines() -> usize {
    100
}

fn default_max_events() -> usize {
    50
}

fn default_max_timeseries_points() -> usize {
    100
}

fn default_request_timeout() -> u64 {
    30
}

fn default_excluded_prefixes() -> Vec<String> {
    vec!["kube-".to_string()]
}

fn default_excluded_namespaces() -> Vec<String> {
    vec!["default".to_string(), "local-path-storage".to_string()]
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            prometheus_url: default_prometheus_url(),
            prometheus_bearer_token: None,
            credential_source: CredentialSource::default(),
            kubeconfig_path: None,
            kubernetes_context: None,
            default_namespace: default_namespace(),
            max_log_lines: default_max_log_lines(),
            max_events: default_max_events(),
            max_timeseries_points: default_max_timeseries_points(),
            request_timeout_seconds: default_request_timeout(),
            excluded_namespace_prefixes: default_excluded_prefixes(),
            excluded_namespaces: default_excluded_namespaces(),
        }
    }
}

impl ObserverConfig {
    /// Load from `OBSERVER_CONFIG_FILE` (if set) overlaid with `OBSERVER_*` variables
    pub fn load() -> Result<Self, config::ConfigError> {
        let file = std::env::var("OBSERVER_CONFIG_FILE").ok().map(PathBuf::from);
        Self::load_from(file.as_deref())
    }

    /// Load from an optional file overlaid with `OBSERVER_*` variables
    pub fn load_from(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder
            .add_source(
                config::Environment::with_prefix("OBSERVER")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("excluded_namespace_prefixes")
                    .with_list_parse_key("excluded_namespaces"),
            )
            .build()?
            .try_deserialize()
    }

    /// Whether credentials should come from the in-cluster service account
    pub fn use_in_cluster(&self) -> bool {
        match self.credential_source {
            CredentialSource::InCluster => true,
            CredentialSource::Kubeconfig => false,
            CredentialSource::Auto => Path::new(IN_CLUSTER_TOKEN_PATH).exists(),
        }
    }

    /// Whether the cluster-wide anomaly scan skips this namespace
    pub fn is_excluded_namespace(&self, name: &str) -> bool {
        self.excluded_namespace_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
            || self.excluded_namespaces.iter().any(|ns| ns == name)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_seconds)
    }
}
