//! PromQL templates shared by the metrics and analysis tools

use std::fmt;
use std::str::FromStr;

use crate::error::ToolError;

/// Label matcher for a namespace, optionally narrowed to a deployment's pods
pub fn pod_selector(namespace: &str, deployment_name: Option<&str>) -> String {
    match deployment_name {
        Some(name) => format!(r#"namespace="{namespace}", pod=~"{name}.*""#),
        None => format!(r#"namespace="{namespace}""#),
    }
}

pub fn cpu_usage_by_pod(selector: &str) -> String {
    format!("sum(rate(container_cpu_usage_seconds_total{{{selector}}}[5m])) by (pod)")
}

pub fn memory_usage_by_pod(selector: &str) -> String {
    format!("sum(container_memory_working_set_bytes{{{selector}}}) by (pod)")
}

/// kube-state-metrics request series for `resource` (`cpu` or `memory`)
pub fn resource_requests_by_pod(resource: &str, selector: &str) -> String {
    format!(
        r#"sum(kube_pod_container_resource_requests{{resource="{resource}", {selector}}}) by (pod)"#
    )
}

pub fn resource_limits_by_pod(resource: &str, selector: &str) -> String {
    format!(
        r#"sum(kube_pod_container_resource_limits{{resource="{resource}", {selector}}}) by (pod)"#
    )
}

/// Percent of memory limit in use, per pod
pub fn memory_limit_ratio_by_pod(namespace: &str) -> String {
    format!(
        r#"100 * sum(container_memory_working_set_bytes{{namespace="{namespace}"}}) by (pod) / sum(container_spec_memory_limit_bytes{{namespace="{namespace}"}}) by (pod)"#
    )
}

/// Metric families the trend and comparison tools understand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Cpu,
    Memory,
    NetworkRx,
    NetworkTx,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Cpu => "cpu",
            MetricKind::Memory => "memory",
            MetricKind::NetworkRx => "network_rx",
            MetricKind::NetworkTx => "network_tx",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            MetricKind::Cpu => "cores",
            MetricKind::Memory => "bytes",
            MetricKind::NetworkRx | MetricKind::NetworkTx => "bytes/sec",
        }
    }

    /// Aggregate query over every pod matched by `selector`
    pub fn aggregate_query(&self, selector: &str) -> String {
        match self {
            MetricKind::Cpu => {
                format!("sum(rate(container_cpu_usage_seconds_total{{{selector}}}[5m]))")
            }
            MetricKind::Memory => format!("sum(container_memory_working_set_bytes{{{selector}}})"),
            MetricKind::NetworkRx => {
                format!("sum(rate(container_network_receive_bytes_total{{{selector}}}[5m]))")
            }
            MetricKind::NetworkTx => {
                format!("sum(rate(container_network_transmit_bytes_total{{{selector}}}[5m]))")
            }
        }
    }

    /// Parse a caller-supplied name; `field` names the parameter in the error
    pub fn parse_param(value: &str, field: &str) -> Result<Self, ToolError> {
        value.parse().map_err(|_: ToolError| {
            ToolError::validation(format!(
                "Invalid {field}: {value}. Use 'cpu', 'memory', 'network_rx', or 'network_tx'."
            ))
        })
    }
}

impl FromStr for MetricKind {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(MetricKind::Cpu),
            "memory" => Ok(MetricKind::Memory),
            "network_rx" => Ok(MetricKind::NetworkRx),
            "network_tx" => Ok(MetricKind::NetworkTx),
            other => Err(ToolError::validation(format!(
                "Invalid metric: {other}. Use 'cpu', 'memory', 'network_rx', or 'network_tx'."
            ))),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pod_selector() {
        assert_eq!(pod_selector("prod", None), r#"namespace="prod""#);
        assert_eq!(
            pod_selector("prod", Some("web")),
            r#"namespace="prod", pod=~"web.*""#
        );
    }

    #[test]
    fn test_aggregate_queries() {
        let selector = pod_selector("prod", None);
        assert_eq!(
            MetricKind::Cpu.aggregate_query(&selector),
            r#"sum(rate(container_cpu_usage_seconds_total{namespace="prod"}[5m]))"#
        );
        assert_eq!(
            MetricKind::Memory.aggregate_query(&selector),
            r#"sum(container_memory_working_set_bytes{namespace="prod"})"#
        );
    }

    #[test]
    fn test_memory_ratio_query() {
        assert_eq!(
            memory_limit_ratio_by_pod("shop"),
            r#"100 * sum(container_memory_working_set_bytes{namespace="shop"}) by (pod) / sum(container_spec_memory_limit_bytes{namespace="shop"}) by (pod)"#
        );
    }

    #[test]
    fn test_metric_kind_parse() {
        assert_eq!("network_tx".parse::<MetricKind>().unwrap(), MetricKind::NetworkTx);
        let err = MetricKind::parse_param("disk", "metric_type").unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
        assert!(err.to_string().starts_with("Invalid metric_type: disk"));
    }
}
