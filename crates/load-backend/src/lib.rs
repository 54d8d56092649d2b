//! HTTP service that burns CPU, holds memory and sleeps on request
//!
//! Used as a workload for the observer to watch.

pub mod stress;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use stress::{burn_cpu, MemoryHolder};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("Worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

/// Shared application state
#[derive(Debug, Default)]
pub struct AppState {
    pub memory: MemoryHolder,
}

#[derive(Debug, Default, Deserialize)]
pub struct StressQuery {
    duration: Option<i64>,
    size_mb: Option<i64>,
    cpu_duration: Option<i64>,
    memory_mb: Option<i64>,
}

fn parse_query(query: Result<Query<StressQuery>, QueryRejection>) -> Result<StressQuery, ApiError> {
    query
        .map(|Query(q)| q)
        .map_err(|rejection| ApiError::Validation(rejection.body_text()))
}

/// `value` or `default`, checked against `min..=max`
fn bounded(name: &str, value: Option<i64>, default: i64, min: i64, max: i64) -> Result<usize, ApiError> {
    let value = value.unwrap_or(default);
    if (min..=max).contains(&value) {
        Ok(value as usize)
    } else {
        Err(ApiError::Validation(format!(
            "{name} must be between {min} and {max}, got {value}"
        )))
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

async fn root() -> Json<Value> {
    Json(json!({"Hello": "World", "Service": "Backend", "status": "healthy"}))
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn crash() {
    warn!("Crash requested, exiting");
    std::process::exit(1);
}

async fn stress_cpu(
    query: Result<Query<StressQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let query = parse_query(query)?;
    let duration = bounded("duration", query.duration, 5, 1, 60)?;
    info!(duration_secs = duration, "Starting CPU stress");

    let report =
        tokio::task::spawn_blocking(move || burn_cpu(Duration::from_secs(duration as u64))).await?;

    Ok(Json(json!({
        "type": "cpu_stress",
        "duration_requested": duration,
        "duration_actual": round2(report.elapsed.as_secs_f64()),
        "primes_found": report.primes_found,
        "last_number_checked": report.last_number_checked,
    })))
}

async fn stress_memory(
    State(state): State<Arc<AppState>>,
    query: Result<Query<StressQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let query = parse_query(query)?;
    let size_mb = bounded("size_mb", query.size_mb, 100, 1, 2000)?;
    info!(size_mb = size_mb, "Starting memory stress");

    let holder = Arc::clone(&state);
    let outcome = tokio::task::spawn_blocking(move || holder.memory.replace(size_mb)).await?;

    let body = match outcome {
        Ok(()) => json!({
            "type": "memory_stress",
            "allocated_mb": size_mb,
            "status": "allocated",
            "message": format!("Allocated {size_mb} MB of memory"),
        }),
        Err(err) => {
            warn!(size_mb = size_mb, error = %err, "Memory allocation failed");
            json!({
                "type": "memory_stress",
                "requested_mb": size_mb,
                "status": "failed",
                "message": "Memory allocation failed - not enough memory",
            })
        }
    };
    Ok(Json(body))
}

async fn release_memory(State(state): State<Arc<AppState>>) -> Json<Value> {
    let cleared = state.memory.release();
    info!(allocations_cleared = cleared, "Released memory");
    Json(json!({
        "type": "memory_release",
        "status": "released",
        "allocations_cleared": cleared,
    }))
}

async fn stress_io(
    query: Result<Query<StressQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let query = parse_query(query)?;
    let duration = bounded("duration", query.duration, 5, 1, 60)?;

    tokio::time::sleep(Duration::from_secs(duration as u64)).await;

    Ok(Json(json!({
        "type": "io_stress",
        "duration": duration,
        "status": "completed",
    })))
}

async fn stress_combined(
    State(state): State<Arc<AppState>>,
    query: Result<Query<StressQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let query = parse_query(query)?;
    let cpu_duration = bounded("cpu_duration", query.cpu_duration, 3, 1, 30)?;
    let memory_mb = bounded("memory_mb", query.memory_mb, 50, 1, 500)?;
    info!(cpu_duration_secs = cpu_duration, memory_mb = memory_mb, "Starting combined stress");

    let holder = Arc::clone(&state);
    let report = tokio::task::spawn_blocking(move || {
        if let Err(err) = holder.memory.append(memory_mb) {
            warn!(memory_mb = memory_mb, error = %err, "Memory allocation failed");
        }
        burn_cpu(Duration::from_secs(cpu_duration as u64))
    })
    .await?;

    Ok(Json(json!({
        "type": "combined_stress",
        "memory_allocated_mb": memory_mb,
        "cpu_duration": cpu_duration,
        "primes_found": report.primes_found,
    })))
}

async fn metrics_info(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "pid": std::process::id(),
        "memory_holder_allocations": state.memory.allocations(),
        "held_bytes": state.memory.held_bytes(),
    }))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/crash", get(crash))
        .route("/stress/cpu", get(stress_cpu))
        .route("/stress/memory", get(stress_memory))
        .route("/stress/memory/release", get(release_memory))
        .route("/stress/io", get(stress_io))
        .route("/stress/combined", get(stress_combined))
        .route("/metrics/info", get(metrics_info))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting load backend");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
