//! Uniform response envelope returned by every tool

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::time::Instant;

use crate::error::ToolError;
use crate::observability::{StructuredLogger, ToolMetrics};

/// Outcome of a tool call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    /// All requested data was retrieved
    Success,
    /// Data is incomplete or truncated
    Partial,
    Error,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::Success => "success",
            ToolStatus::Partial => "partial",
            ToolStatus::Error => "error",
        }
    }
}

/// Response envelope
///
/// `error` is set exactly when `status` is [`ToolStatus::Error`]; warnings
/// never accompany a plain success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    pub status: ToolStatus,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ToolResponse {
    pub fn success(result: impl Serialize) -> Self {
        Self {
            status: ToolStatus::Success,
            result: to_value(result),
            error: None,
            warnings: Vec::new(),
            metadata: Map::new(),
        }
    }

    pub fn partial(result: impl Serialize, warnings: Vec<String>) -> Self {
        Self {
            status: ToolStatus::Partial,
            result: to_value(result),
            error: None,
            warnings,
            metadata: Map::new(),
        }
    }

    pub fn error(message: impl Into<String>, error_type: Option<&str>) -> Self {
        let mut metadata = Map::new();
        if let Some(kind) = error_type {
            metadata.insert("error_type".to_string(), Value::from(kind));
        }
        Self {
            status: ToolStatus::Error,
            result: Value::Null,
            error: Some(message.into()),
            warnings: Vec::new(),
            metadata,
        }
    }

    /// Insert one metadata entry, replacing any existing value
    pub fn with_metadata(mut self, key: &str, value: impl Serialize) -> Self {
        self.metadata.insert(key.to_string(), to_value(value));
        self
    }

    /// Attach a warning; a success becomes partial
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self.normalize();
        self
    }

    pub fn with_warnings(mut self, warnings: impl IntoIterator<Item = String>) -> Self {
        self.warnings.extend(warnings);
        self.normalize();
        self
    }

    pub fn is_error(&self) -> bool {
        self.status == ToolStatus::Error
    }

    pub fn error_type(&self) -> Option<&str> {
        self.metadata.get("error_type").and_then(Value::as_str)
    }

    fn normalize(&mut self) {
        if self.status == ToolStatus::Success && !self.warnings.is_empty() {
            self.status = ToolStatus::Partial;
        }
    }
}

impl From<ToolError> for ToolResponse {
    fn from(err: ToolError) -> Self {
        ToolResponse::error(err.to_string(), Some(err.kind()))
    }
}

fn to_value(value: impl Serialize) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Echoed query parameters placed into metadata
#[derive(Debug, Clone, Default)]
pub struct Params(Map<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        self.0.insert(key.to_string(), to_value(value));
        self
    }
}

/// Run a tool body and translate its outcome into an envelope
///
/// Execution metadata and echoed params are added unless the body already
/// set those keys. Each call is counted and logged under `tool`.
pub async fn run_tool<F>(tool: &str, params: Params, body: F) -> ToolResponse
where
    F: Future<Output = Result<ToolResponse, ToolError>>,
{
    let started = Instant::now();

    let mut response = match body.await {
        Ok(mut resp) => {
            resp.normalize();
            resp
        }
        Err(err) => ToolResponse::from(err),
    };

    let elapsed = started.elapsed();
    let execution_time_ms = elapsed.as_millis() as u64;

    for (key, value) in params.0 {
        response.metadata.entry(key).or_insert(value);
    }
    response
        .metadata
        .entry("execution_time_ms")
        .or_insert_with(|| Value::from(execution_time_ms));
    response
        .metadata
        .entry("timestamp")
        .or_insert_with(|| Value::from(Utc::now().to_rfc3339()));

    ToolMetrics::new().observe_call(tool, response.status.as_str(), elapsed.as_secs_f64());
    StructuredLogger::new("tools").log_tool_call(
        tool,
        response.status.as_str(),
        execution_time_ms,
        response.error_type(),
    );

    response
}
