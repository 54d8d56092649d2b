//! Error taxonomy shared by the clients and the tool layer
//!
//! Client errors stay specific to their backend. [`ToolError`] is what the
//! tool layer works with; [`crate::envelope::run_tool`] turns it into an
//! error envelope carrying the coarse [`ToolError::kind`] tag.

use thiserror::Error;

/// Failures from the Kubernetes control plane
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The requested named resource does not exist
    #[error("{0}")]
    NotFound(String),

    /// The API call failed for any other reason
    #[error("{0}")]
    Api(String),

    /// Credentials or client configuration could not be loaded
    #[error("Failed to load Kubernetes config: {0}")]
    Config(String),
}

/// Failures from the Prometheus backend
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Connection, HTTP status or decoding failure
    #[error("{0}")]
    Client(String),

    /// Prometheus answered but rejected the expression
    #[error("{0}")]
    Query(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Failures from the duration and quantity parsers
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnitError {
    #[error("Invalid duration format: {0}. Use 's', 'm', 'h', or 'd' suffix.")]
    InvalidDuration(String),

    #[error("Duration {0} is out of range. The maximum is 3650d.")]
    DurationOutOfRange(String),

    #[error("Invalid resource quantity: {0}")]
    InvalidQuantity(String),
}

/// Error surfaced by a tool invocation
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Cluster(String),

    #[error("{0}")]
    Query(String),

    #[error("{0}")]
    Metrics(String),

    #[error("{0}")]
    Validation(String),

    #[error("Pod has multiple containers: [{}]. Please specify container_name.", .containers.join(", "))]
    MultipleContainers { containers: Vec<String> },

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl ToolError {
    /// Coarse kind tag placed in `metadata.error_type`
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::NotFound(_) => "NotFoundError",
            ToolError::Cluster(_) => "KubernetesError",
            ToolError::Query(_) => "PrometheusQueryError",
            ToolError::Metrics(_) => "PrometheusError",
            ToolError::Validation(_) => "ValidationError",
            ToolError::MultipleContainers { .. } => "MultipleContainersError",
            ToolError::Unexpected(_) => "UnexpectedError",
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ToolError::Validation(message.into())
    }
}

impl From<ClusterError> for ToolError {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::NotFound(msg) => ToolError::NotFound(msg),
            other => ToolError::Cluster(other.to_string()),
        }
    }
}

impl From<MetricsError> for ToolError {
    fn from(err: MetricsError) -> Self {
        match err {
            MetricsError::Query(msg) => ToolError::Query(msg),
            other => ToolError::Metrics(other.to_string()),
        }
    }
}

impl From<UnitError> for ToolError {
    fn from(err: UnitError) -> Self {
        ToolError::Validation(err.to_string())
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(err: serde_json::Error) -> Self {
        ToolError::Unexpected(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_errors_keep_not_found_distinct() {
        let not_found: ToolError = ClusterError::NotFound("Pod 'x' not found".into()).into();
        let api: ToolError = ClusterError::Api("Failed to list pods: Forbidden".into()).into();

        assert_eq!(not_found.kind(), "NotFoundError");
        assert_eq!(api.kind(), "KubernetesError");
        assert_eq!(not_found.to_string(), "Pod 'x' not found");
    }

    #[test]
    fn test_metrics_errors_keep_query_distinct() {
        let query: ToolError = MetricsError::Query("parse error".into()).into();
        let client: ToolError = MetricsError::Client("connection refused".into()).into();

        assert_eq!(query.kind(), "PrometheusQueryError");
        assert_eq!(client.kind(), "PrometheusError");
    }

    #[test]
    fn test_multiple_containers_message_lists_names() {
        let err = ToolError::MultipleContainers {
            containers: vec!["app".into(), "sidecar".into()],
        };
        assert_eq!(err.kind(), "MultipleContainersError");
        assert!(err.to_string().contains("app, sidecar"));
    }

    #[test]
    fn test_unit_error_is_validation() {
        let err: ToolError = UnitError::InvalidDuration("5w".into()).into();
        assert_eq!(err.kind(), "ValidationError");
    }
}
