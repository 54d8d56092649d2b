//! Observer library for Kubernetes and Prometheus diagnostics
//!
//! This crate provides the core functionality for:
//! - Cluster and metrics backend clients
//! - Analytical tools returning a uniform response envelope
//! - Statistics and restart heuristics
//! - Health checks and observability

pub mod clients;
pub mod config;
pub mod envelope;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod queries;
pub mod stats;
pub mod tools;
pub mod units;

pub use config::ObserverConfig;
pub use envelope::{ToolResponse, ToolStatus};
pub use error::{ClusterError, MetricsError, ToolError};
pub use health::{ComponentHealth, ComponentStatus, HealthResponse, ReadinessResponse};
pub use models::*;
pub use observability::{StructuredLogger, ToolMetrics};
pub use tools::{catalog, dispatch, ToolContext};
