//! Backend clients: the Kubernetes API and Prometheus

pub mod kubernetes;
pub mod prometheus;

pub use kubernetes::{ClusterSource, KubeClient, LogOptions};
pub use prometheus::{InstantSample, MetricsSource, PrometheusClient, RangeSeries};
