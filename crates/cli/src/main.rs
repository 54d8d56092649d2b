//! Cluster Observer CLI
//!
//! A command-line client for the observer tool server: deployments, pods,
//! events, logs, metrics and restart analysis.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use commands::ToolCall;

/// Cluster Observer CLI
#[derive(Parser)]
#[command(name = "obs")]
#[command(author, version, about = "CLI for the Cluster Observer tool server", long_about = None)]
pub struct Cli {
    /// Tool server URL (also OBS_API_URL; falls back to ~/.config/obs/config.json)
    #[arg(long, env = "OBS_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, global = true)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the tools the server offers
    Tools,

    /// Show deployments with images and replica status
    Deployments {
        /// Deployment name
        name: Option<String>,

        /// Namespace (all namespaces if not specified)
        #[arg(long, short)]
        namespace: Option<String>,
    },

    /// Summarize namespaces with a health score
    Namespaces {
        /// Single namespace to summarize
        #[arg(long, short)]
        namespace: Option<String>,
    },

    /// Show node capacity and readiness
    Capacity {
        /// Node label selector, e.g. node-role.kubernetes.io/worker=
        #[arg(long)]
        selector: Option<String>,
    },

    /// Show pod phases and restarts
    Pods {
        #[arg(long, short)]
        namespace: Option<String>,

        /// Label selector, e.g. app=web
        #[arg(long, short)]
        selector: Option<String>,

        /// Only pods of this deployment
        #[arg(long, short)]
        deployment: Option<String>,
    },

    /// Show recent events, newest first
    Events {
        /// Namespace (all namespaces if not specified)
        #[arg(long, short)]
        namespace: Option<String>,

        /// Warning or Normal
        #[arg(long)]
        severity: Option<String>,

        /// Time window (e.g., 30m, 1h, 24h)
        #[arg(long, default_value = "1h")]
        since: String,

        /// Involved object kind, e.g. Pod
        #[arg(long)]
        kind: Option<String>,
    },

    /// Show the tail of a container's logs
    Logs {
        /// Pod name
        pod: String,

        #[arg(long, short)]
        namespace: Option<String>,

        /// Container name (required for multi-container pods)
        #[arg(long, short)]
        container: Option<String>,

        /// Number of lines from the end
        #[arg(long, default_value_t = 100)]
        tail: usize,

        /// Only logs newer than this duration (e.g., 10m)
        #[arg(long)]
        since: Option<String>,

        /// Logs of the previous container instance
        #[arg(long)]
        previous: bool,
    },

    /// Show current CPU and memory usage
    Usage {
        #[arg(long, short)]
        namespace: Option<String>,

        #[arg(long, short)]
        deployment: Option<String>,
    },

    /// Run a raw PromQL range query
    Query {
        /// PromQL expression
        promql: String,

        /// Time range (e.g., 1h, 6h, 7d)
        #[arg(long, default_value = "1h")]
        range: String,

        /// Query resolution (derived from the range if not specified)
        #[arg(long)]
        step: Option<String>,
    },

    /// Show percentiles, trend and spikes for a metric
    Trends {
        #[arg(long, short)]
        namespace: Option<String>,

        #[arg(long, short)]
        deployment: Option<String>,

        /// cpu, memory, network_rx or network_tx
        #[arg(long, default_value = "cpu")]
        metric: String,

        /// Analysis period (e.g., 24h, 7d)
        #[arg(long, default_value = "24h")]
        period: String,
    },

    /// Analyze restart rate, crash reasons and timing
    Restarts {
        #[arg(long, short)]
        namespace: Option<String>,

        #[arg(long, short)]
        deployment: Option<String>,

        /// Lookback period (e.g., 1h, 24h, 7d)
        #[arg(long, default_value = "24h")]
        lookback: String,
    },

    /// Show rollout history of a deployment
    History {
        /// Deployment name
        deployment: String,

        #[arg(long, short)]
        namespace: Option<String>,

        /// Days of history to include
        #[arg(long, default_value_t = 7)]
        days: i64,
    },

    /// Compare a metric between two periods
    Compare {
        #[arg(long, short)]
        namespace: Option<String>,

        #[arg(long, short)]
        deployment: Option<String>,

        /// cpu, memory, network_rx or network_tx
        #[arg(long, default_value = "cpu")]
        metric: String,

        /// this_week, last_week, this_month or last_month
        #[arg(long, default_value = "last_week")]
        baseline: String,

        #[arg(long, default_value = "this_week")]
        compare: String,
    },

    /// Scan for restart, pod health and memory anomalies
    Anomalies {
        /// Namespace (all non-system namespaces if not specified)
        #[arg(long, short)]
        namespace: Option<String>,

        #[arg(long, default_value = "1h")]
        lookback: String,
    },
}

/// Tool call for a subcommand; `None` for commands that are not tool calls
fn tool_call(command: Commands, config: &config::Config) -> Option<ToolCall> {
    let call = match command {
        Commands::Tools => return None,
        Commands::Deployments { name, namespace } => ToolCall::new("get_deployment_info")
            .arg("namespace", namespace)
            .arg("deployment_name", name),
        Commands::Namespaces { namespace } => {
            ToolCall::new("get_namespace_summary").arg("namespace", namespace)
        }
        Commands::Capacity { selector } => {
            ToolCall::new("get_cluster_capacity").arg("node_selector", selector)
        }
        Commands::Pods {
            namespace,
            selector,
            deployment,
        } => ToolCall::new("get_pod_status")
            .arg("namespace", config.namespace(namespace))
            .arg("selector", selector)
            .arg("deployment_name", deployment),
        Commands::Events {
            namespace,
            severity,
            since,
            kind,
        } => ToolCall::new("get_recent_events")
            .arg("namespace", namespace)
            .arg("severity", severity)
            .arg("time_window", since)
            .arg("involved_kind", kind),
        Commands::Logs {
            pod,
            namespace,
            container,
            tail,
            since,
            previous,
        } => ToolCall::new("get_container_logs")
            .arg("namespace", config.namespace(namespace))
            .arg("pod_name", pod)
            .arg("container_name", container)
            .arg("tail_lines", tail)
            .arg("since", since)
            .arg("previous", previous),
        Commands::Usage {
            namespace,
            deployment,
        } => ToolCall::new("get_current_resource_usage")
            .arg("namespace", config.namespace(namespace))
            .arg("deployment_name", deployment),
        Commands::Query {
            promql,
            range,
            step,
        } => ToolCall::new("query_metrics_timeseries")
            .arg("promql_query", promql)
            .arg("time_range", range)
            .arg("step", step),
        Commands::Trends {
            namespace,
            deployment,
            metric,
            period,
        } => ToolCall::new("get_resource_trends")
            .arg("namespace", config.namespace(namespace))
            .arg("deployment_name", deployment)
            .arg("metric_type", metric)
            .arg("period", period),
        Commands::Restarts {
            namespace,
            deployment,
            lookback,
        } => ToolCall::new("analyze_restart_patterns")
            .arg("namespace", config.namespace(namespace))
            .arg("deployment_name", deployment)
            .arg("lookback_period", lookback),
        Commands::History {
            deployment,
            namespace,
            days,
        } => ToolCall::new("get_deployment_history")
            .arg("namespace", config.namespace(namespace))
            .arg("deployment_name", deployment)
            .arg("lookback_days", days),
        Commands::Compare {
            namespace,
            deployment,
            metric,
            baseline,
            compare,
        } => ToolCall::new("compare_period_metrics")
            .arg("namespace", config.namespace(namespace))
            .arg("deployment_name", deployment)
            .arg("metric", metric)
            .arg("baseline_period", baseline)
            .arg("compare_period", compare),
        Commands::Anomalies {
            namespace,
            lookback,
        } => ToolCall::new("get_anomaly_report")
            .arg("namespace", namespace)
            .arg("lookback_period", lookback),
    };
    Some(call)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::Config::load()?;

    let api_url = cli
        .api_url
        .clone()
        .unwrap_or_else(|| config.api_url().to_string());
    let format = cli
        .format
        .or_else(|| {
            config
                .default_format
                .as_deref()
                .and_then(|f| output::OutputFormat::from_str(f, true).ok())
        })
        .unwrap_or_default();

    // Initialize client
    let client = client::ApiClient::new(&api_url)?;

    match tool_call(cli.command, &config) {
        Some(call) => commands::run(&client, call, format).await,
        None => commands::list_tools(&client, format).await,
    }
}
