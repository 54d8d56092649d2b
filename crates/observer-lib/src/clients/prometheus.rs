//! Prometheus HTTP API client
//!
//! Instant and range queries, label lookups and a health probe. A response
//! whose body carries `"status": "error"` is a [`MetricsError::Query`];
//! connection failures and other HTTP errors are [`MetricsError::Client`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::ObserverConfig;
use crate::error::MetricsError;

/// Floor for auto-calculated range steps (seconds)
const MIN_STEP_SECS: i64 = 15;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// One series of an instant query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstantSample {
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    /// `(unix_seconds, value_string)`
    pub value: (f64, String),
}

impl InstantSample {
    pub fn label(&self, name: &str) -> Option<&str> {
        self.metric.get(name).map(String::as_str)
    }

    /// Sample value; unparseable strings read as 0.0
    pub fn numeric_value(&self) -> f64 {
        self.value.1.parse().unwrap_or(0.0)
    }
}

/// One series of a range query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeSeries {
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    #[serde(default)]
    pub values: Vec<(f64, String)>,
}

/// Parse a sample value; `NaN`, `+Inf`, `-Inf` and unparseable text are absent
///
/// JSON has no encoding for non-finite floats, so callers drop or zero these.
pub fn finite_value(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Convert a Prometheus float timestamp into UTC
pub fn sample_time(unix_seconds: f64) -> DateTime<Utc> {
    let millis = (unix_seconds * 1000.0).round() as i64;
    DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default()
}

/// Query interface over a Prometheus-compatible backend
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn query(
        &self,
        expr: &str,
        time: Option<DateTime<Utc>>,
    ) -> Result<Vec<InstantSample>, MetricsError>;

    /// Range query; without a `step` one is derived from the window
    async fn query_range(
        &self,
        expr: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Option<&str>,
    ) -> Result<Vec<RangeSeries>, MetricsError>;

    async fn label_values(
        &self,
        label: &str,
        matcher: Option<&str>,
    ) -> Result<Vec<String>, MetricsError>;

    async fn metric_names(&self, matcher: Option<&str>) -> Result<Vec<String>, MetricsError>;

    async fn is_healthy(&self) -> bool;
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    status: String,
    data: Option<T>,
    #[serde(rename = "errorType")]
    error_type: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultData<T> {
    #[serde(default = "Vec::new")]
    result: Vec<T>,
}

/// Step that yields roughly `max_points` samples over the window
///
/// Floored at 15 seconds, rendered as `Ns`, `Nm` or `Nh`.
pub fn calculate_step(start: DateTime<Utc>, end: DateTime<Utc>, max_points: usize) -> String {
    let total_secs = (end - start).num_seconds().max(0);
    let points = max_points.max(1) as i64;
    let step = (total_secs / points).max(MIN_STEP_SECS);

    if step < 60 {
        format!("{step}s")
    } else if step < 3600 {
        format!("{}m", step / 60)
    } else {
        format!("{}h", step / 3600)
    }
}

/// Prometheus HTTP client
pub struct PrometheusClient {
    base_url: String,
    http_client: Client,
    bearer_token: Option<String>,
    max_points: usize,
}

impl PrometheusClient {
    pub fn new(config: &ObserverConfig) -> Result<Self, MetricsError> {
        let base_url = config.prometheus_url.trim_end_matches('/').to_string();
        let parsed = Url::parse(&base_url)
            .map_err(|e| MetricsError::Client(format!("Invalid Prometheus URL {base_url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(MetricsError::Client(format!(
                "Invalid Prometheus URL {base_url}: scheme must be http or https"
            )));
        }

        let http_client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            base_url,
            http_client,
            bearer_token: config.prometheus_bearer_token.clone(),
            max_points: config.max_timeseries_points,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn add_auth(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.bearer_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, MetricsError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let req = self
            .http_client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(params);

        let response = self.add_auth(req).send().await.map_err(|e| {
            MetricsError::Client(format!(
                "Failed to connect to Prometheus at {}: {}",
                self.base_url, e
            ))
        })?;

        let status = response.status();
        let body = response.text().await?;

        // Prometheus reports rejected expressions as 400/422 with an error body
        let rejects_query = matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY
        );
        if !status.is_success() && !rejects_query {
            return Err(MetricsError::Client(format!(
                "Prometheus API error: {} - {}",
                status.as_u16(),
                body
            )));
        }

        let envelope: ApiEnvelope<T> = serde_json::from_str(&body).map_err(|e| {
            if rejects_query {
                MetricsError::Client(format!(
                    "Prometheus API error: {} - {}",
                    status.as_u16(),
                    body
                ))
            } else {
                MetricsError::Client(format!("Failed to parse Prometheus response: {e}"))
            }
        })?;

        if envelope.status != "success" {
            return Err(MetricsError::Query(format!(
                "Query failed ({}): {}",
                envelope.error_type.as_deref().unwrap_or("unknown"),
                envelope.error.as_deref().unwrap_or("Unknown error")
            )));
        }

        envelope
            .data
            .ok_or_else(|| MetricsError::Client("Prometheus response has no data".to_string()))
    }
}

fn unix_seconds(ts: DateTime<Utc>) -> String {
    format!("{:.3}", ts.timestamp_millis() as f64 / 1000.0)
}

#[async_trait]
impl MetricsSource for PrometheusClient {
    async fn query(
        &self,
        expr: &str,
        time: Option<DateTime<Utc>>,
    ) -> Result<Vec<InstantSample>, MetricsError> {
        let mut params = vec![("query", expr.to_string())];
        if let Some(ts) = time {
            params.push(("time", unix_seconds(ts)));
        }
        let data: ResultData<InstantSample> = self.get("/api/v1/query", &params).await?;
        Ok(data.result)
    }

    async fn query_range(
        &self,
        expr: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Option<&str>,
    ) -> Result<Vec<RangeSeries>, MetricsError> {
        let step = step
            .map(str::to_string)
            .unwrap_or_else(|| calculate_step(start, end, self.max_points));
        let params = vec![
            ("query", expr.to_string()),
            ("start", unix_seconds(start)),
            ("end", unix_seconds(end)),
            ("step", step),
        ];
        let data: ResultData<RangeSeries> = self.get("/api/v1/query_range", &params).await?;
        Ok(data.result)
    }

    async fn label_values(
        &self,
        label: &str,
        matcher: Option<&str>,
    ) -> Result<Vec<String>, MetricsError> {
        let params: Vec<(&str, String)> = matcher
            .map(|m| vec![("match[]", m.to_string())])
            .unwrap_or_default();
        self.get(&format!("/api/v1/label/{label}/values"), &params)
            .await
    }

    async fn metric_names(&self, matcher: Option<&str>) -> Result<Vec<String>, MetricsError> {
        match self.label_values("__name__", matcher).await {
            Ok(names) => Ok(names),
            // Not every backend serves the __name__ label endpoint
            Err(MetricsError::Client(msg)) => {
                debug!(error = %msg, "Metric name lookup unavailable");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn is_healthy(&self) -> bool {
        let url = format!("{}/-/healthy", self.base_url);
        let req = self.http_client.get(&url).timeout(HEALTH_TIMEOUT);
        match self.add_auth(req).send().await {
            Ok(response) => response.status() == StatusCode::OK,
            Err(_) => false,
        }
    }
}
