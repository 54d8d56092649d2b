//! Integration tests for the observer API endpoints

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::{
    ConfigMap, Event, Namespace, Node, Pod, PodStatus, Secret, Service,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use observer_lib::clients::{
    ClusterSource, InstantSample, LogOptions, MetricsSource, RangeSeries,
};
use observer_lib::{ClusterError, MetricsError, ObserverConfig, ToolContext};
use observer_server::api::{create_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

/// Cluster with a fixed pod list, or a cluster whose API is down
struct StubCluster {
    pods: Vec<Pod>,
    down: bool,
}

impl StubCluster {
    fn check(&self) -> Result<(), ClusterError> {
        if self.down {
            Err(ClusterError::Api("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ClusterSource for StubCluster {
    async fn list_deployments(
        &self,
        _namespace: Option<&str>,
        _label_selector: Option<&str>,
    ) -> Result<Vec<Deployment>, ClusterError> {
        self.check().map(|_| Vec::new())
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, ClusterError> {
        self.check()?;
        Err(ClusterError::NotFound(format!(
            "Deployment '{name}' not found in namespace '{namespace}'"
        )))
    }

    async fn list_replica_sets(
        &self,
        _namespace: &str,
        _label_selector: Option<&str>,
    ) -> Result<Vec<ReplicaSet>, ClusterError> {
        self.check().map(|_| Vec::new())
    }

    async fn list_pods(
        &self,
        _namespace: Option<&str>,
        _label_selector: Option<&str>,
        _field_selector: Option<&str>,
    ) -> Result<Vec<Pod>, ClusterError> {
        self.check().map(|_| self.pods.clone())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, ClusterError> {
        self.check()?;
        Err(ClusterError::NotFound(format!(
            "Pod '{name}' not found in namespace '{namespace}'"
        )))
    }

    async fn pod_logs(
        &self,
        _namespace: &str,
        _name: &str,
        _options: &LogOptions,
    ) -> Result<String, ClusterError> {
        self.check().map(|_| String::new())
    }

    async fn list_events(
        &self,
        _namespace: Option<&str>,
        _field_selector: Option<&str>,
    ) -> Result<Vec<Event>, ClusterError> {
        self.check().map(|_| Vec::new())
    }

    async fn list_nodes(&self, _label_selector: Option<&str>) -> Result<Vec<Node>, ClusterError> {
        self.check().map(|_| Vec::new())
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>, ClusterError> {
        self.check().map(|_| Vec::new())
    }

    async fn list_services(&self, _namespace: Option<&str>) -> Result<Vec<Service>, ClusterError> {
        self.check().map(|_| Vec::new())
    }

    async fn list_config_maps(&self, _namespace: &str) -> Result<Vec<ConfigMap>, ClusterError> {
        self.check().map(|_| Vec::new())
    }

    async fn list_secrets(&self, _namespace: &str) -> Result<Vec<Secret>, ClusterError> {
        self.check().map(|_| Vec::new())
    }
}

/// Metrics backend with no data
struct StubMetrics {
    healthy: bool,
}

#[async_trait]
impl MetricsSource for StubMetrics {
    async fn query(
        &self,
        _expr: &str,
        _time: Option<DateTime<Utc>>,
    ) -> Result<Vec<InstantSample>, MetricsError> {
        Ok(Vec::new())
    }

    async fn query_range(
        &self,
        _expr: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _step: Option<&str>,
    ) -> Result<Vec<RangeSeries>, MetricsError> {
        Ok(Vec::new())
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

fn running_pod(name: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("prod".to_string()),
            ..ObjectMeta::default()
        },
        status: Some(PodStatus {
            phase: Some("Running".to_string()),
            ..PodStatus::default()
        }),
        ..Pod::default()
    }
}

fn setup_test_app(cluster: StubCluster, metrics: StubMetrics) -> Router {
    let ctx = ToolContext::new(ObserverConfig::default(), Arc::new(cluster), Arc::new(metrics));
    create_router(Arc::new(AppState::new(ctx)))
}

fn healthy_app() -> Router {
    setup_test_app(
        StubCluster {
            pods: vec![running_pod("web-1"), running_pod("web-2")],
            down: false,
        },
        StubMetrics { healthy: true },
    )
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn post_tool(app: Router, name: &str, body: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/v1/tools/{name}"))
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_list_tools_returns_catalog() {
    let (status, body) = get(healthy_app(), "/api/v1/tools").await;
    assert_eq!(status, StatusCode::OK);

    let tools: Value = serde_json::from_slice(&body).unwrap();
    let names: Vec<&str> = tools
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names.len(), 13);
    assert!(names.contains(&"get_pod_status"));
    assert!(names.contains(&"get_anomaly_report"));
}

#[tokio::test]
async fn test_call_tool_returns_envelope() {
    let (status, body) =
        post_tool(healthy_app(), "get_pod_status", r#"{"namespace": "prod"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["result"]["status"]["total_pods"], 2);
    assert_eq!(body["result"]["status"]["running"], 2);
    assert_eq!(body["metadata"]["namespace"], "prod");
}

#[tokio::test]
async fn test_call_tool_error_is_still_200() {
    let (status, body) = post_tool(
        healthy_app(),
        "get_deployment_info",
        r#"{"namespace": "prod", "deployment_name": "missing"}"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "error");
    assert_eq!(body["result"], Value::Null);
    assert_eq!(body["metadata"]["error_type"], "NotFoundError");
}

#[tokio::test]
async fn test_call_unknown_tool() {
    let (status, body) = post_tool(healthy_app(), "delete_cluster", "{}").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["error_type"], "ValidationError");
}

#[tokio::test]
async fn test_call_tool_with_invalid_json() {
    let (_, body) = post_tool(healthy_app(), "get_pod_status", "{not json").await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["metadata"]["error_type"], "ValidationError");
}

#[tokio::test]
async fn test_call_tool_with_overlong_window_returns_envelope() {
    let (status, body) = post_tool(
        healthy_app(),
        "query_metrics_timeseries",
        r#"{"promql_query": "up", "time_range": "100000000000000s"}"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "error");
    assert_eq!(body["metadata"]["error_type"], "ValidationError");
}

#[tokio::test]
async fn test_call_tool_with_empty_body_uses_defaults() {
    let (_, body) = post_tool(healthy_app(), "get_anomaly_report", "").await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["result"]["total_count"], 0);
    assert_eq!(body["metadata"]["namespace"], json!("all"));
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (status, body) = get(healthy_app(), "/healthz").await;
    assert_eq!(status, StatusCode::OK);

    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["components"]["kubernetes"]["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let app = setup_test_app(
        StubCluster {
            pods: Vec::new(),
            down: false,
        },
        StubMetrics { healthy: false },
    );

    let (status, body) = get(app, "/healthz").await;

    // Degraded still returns 200 (operational)
    assert_eq!(status, StatusCode::OK);
    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["components"]["prometheus"]["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_when_cluster_down() {
    let app = setup_test_app(
        StubCluster {
            pods: Vec::new(),
            down: true,
        },
        StubMetrics { healthy: true },
    );

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz() {
    let (status, body) = get(healthy_app(), "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    let readiness: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["ready"], true);

    let down = setup_test_app(
        StubCluster {
            pods: Vec::new(),
            down: true,
        },
        StubMetrics { healthy: true },
    );
    let (status, body) = get(down, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let readiness: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["ready"], false);
    assert!(readiness["reason"].as_str().unwrap().contains("connection refused"));
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_tool_metrics() {
    // Drive one call so the counters have a sample
    post_tool(healthy_app(), "get_pod_status", r#"{"namespace": "prod"}"#).await;

    let response = healthy_app()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/plain; charset=utf-8"
    );

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("observer_tool_calls_total"));
    assert!(text.contains("observer_tool_duration_seconds"));
}
