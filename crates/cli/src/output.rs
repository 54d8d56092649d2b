//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde_json::Value;
use tabled::{builder::Builder, settings::Style, Table, Tabled};

use crate::client::{Envelope, ToolInfo};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "success" | "healthy" | "running" | "succeeded" | "true" | "low" => {
            status.green().to_string()
        }
        "partial" | "degraded" | "warning" | "pending" | "medium" => status.yellow().to_string(),
        "error" | "unhealthy" | "failed" | "false" | "high" | "critical" => {
            status.red().to_string()
        }
        _ => status.to_string(),
    }
}

/// Format timestamp for display
fn format_timestamp(ts: &str) -> String {
    // Try to parse and format nicely, otherwise return as-is
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(ts) {
        dt.format("%Y-%m-%d %H:%M").to_string()
    } else {
        ts.to_string()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Cell {
    Plain,
    Status,
    Time,
}

/// Header, JSON pointer into a row, rendering
type Column = (&'static str, &'static str, Cell);

/// Where the list lives inside a tool's result, and how to show its rows
fn table_layout(tool: &str) -> Option<(&'static str, &'static [Column])> {
    use Cell::*;

    let layout: (&'static str, &'static [Column]) = match tool {
        "get_deployment_info" => (
            "/deployments",
            &[
                ("Name", "/name", Plain),
                ("Namespace", "/namespace", Plain),
                ("Ready", "/replicas/ready", Plain),
                ("Desired", "/replicas/desired", Plain),
                ("Image", "/image", Plain),
                ("Created", "/created_at", Time),
            ],
        ),
        "get_namespace_summary" => (
            "/namespaces",
            &[
                ("Name", "/name", Plain),
                ("Pods", "/pod_count", Plain),
                ("Running", "/running_pods", Plain),
                ("Deployments", "/deployment_count", Plain),
                ("Restarts", "/total_restarts", Plain),
                ("Health", "/health_score", Plain),
            ],
        ),
        "get_cluster_capacity" => (
            "/cluster/nodes",
            &[
                ("Name", "/name", Plain),
                ("Roles", "/roles", Plain),
                ("Ready", "/ready", Status),
                ("CPU", "/cpu_allocatable", Plain),
                ("Memory", "/memory_allocatable", Plain),
                ("Pods", "/pod_count", Plain),
            ],
        ),
        "get_pod_status" => (
            "/status/pods",
            &[
                ("Name", "/name", Plain),
                ("Phase", "/phase", Status),
                ("Node", "/node", Plain),
                ("Restarts", "/total_restart_count", Plain),
                ("Created", "/created_at", Time),
            ],
        ),
        "get_recent_events" => (
            "/events",
            &[
                ("Last Seen", "/last_seen", Time),
                ("Type", "/type", Status),
                ("Reason", "/reason", Plain),
                ("Object", "/involved_object/name", Plain),
                ("Message", "/message", Plain),
            ],
        ),
        "get_current_resource_usage" => (
            "/usage",
            &[
                ("Pod", "/pod_name", Plain),
                ("CPU", "/cpu_usage_cores", Plain),
                ("CPU %", "/cpu_usage_percent", Plain),
                ("Memory MB", "/memory_usage_mb", Plain),
                ("Memory %", "/memory_usage_percent", Plain),
            ],
        ),
        "get_deployment_history" => (
            "/history",
            &[
                ("Revision", "/revision", Plain),
                ("Image", "/image", Plain),
                ("Replicas", "/replicas", Plain),
                ("Created", "/created_at", Time),
                ("Change Cause", "/change_cause", Plain),
            ],
        ),
        "get_anomaly_report" => (
            "/anomalies",
            &[
                ("Severity", "/severity", Status),
                ("Type", "/anomaly_type", Plain),
                ("Namespace", "/namespace", Plain),
                ("Resource", "/resource_name", Plain),
                ("Description", "/description", Plain),
            ],
        ),
        _ => return None,
    };
    Some(layout)
}

fn cell_text(value: Option<&Value>, kind: Cell) -> String {
    let text = match value {
        None | Some(Value::Null) => return "-".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_string))
            .collect::<Vec<_>>()
            .join(", "),
        Some(other) => other.to_string(),
    };
    match kind {
        Cell::Plain => text,
        Cell::Status => color_status(&text),
        Cell::Time => format_timestamp(&text),
    }
}

/// Table for a list-shaped tool result; `None` when the tool has no layout
pub fn render_table(tool: &str, result: &Value) -> Option<String> {
    let (pointer, columns) = table_layout(tool)?;
    let rows = result.pointer(pointer)?.as_array()?;

    let mut builder = Builder::default();
    builder.push_record(columns.iter().map(|(header, _, _)| header.to_string()));
    for row in rows {
        builder.push_record(
            columns
                .iter()
                .map(|(_, path, kind)| cell_text(row.pointer(path), *kind)),
        );
    }

    Some(builder.build().with(Style::rounded()).to_string())
}

/// Print a tool envelope
pub fn print_envelope(tool: &str, envelope: &Envelope, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(envelope)?);
        return Ok(());
    }

    println!("Status: {}", color_status(&envelope.status));
    for warning in &envelope.warnings {
        print_warning(warning);
    }
    if let Some(error) = &envelope.error {
        let kind = envelope.error_type().unwrap_or("Error");
        print_error(&format!("{kind}: {error}"));
        return Ok(());
    }

    if let Some(logs) = envelope.result.get("logs").and_then(Value::as_str) {
        println!("{}", logs);
        return Ok(());
    }

    match render_table(tool, &envelope.result) {
        Some(table) if table_has_rows(tool, &envelope.result) => println!("{}", table),
        Some(_) => print_info("No items found"),
        None => println!("{}", serde_json::to_string_pretty(&envelope.result)?),
    }

    if let Some(summary) = envelope.result.get("summary").and_then(Value::as_str) {
        println!("\n{}", summary);
    }

    Ok(())
}

fn table_has_rows(tool: &str, result: &Value) -> bool {
    table_layout(tool)
        .and_then(|(pointer, _)| result.pointer(pointer))
        .and_then(Value::as_array)
        .is_some_and(|rows| !rows.is_empty())
}

/// Row for the tool catalog table
#[derive(Tabled)]
struct ToolRow {
    #[tabled(rename = "Tool")]
    name: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Description")]
    description: String,
}

/// Print the tool catalog
pub fn print_catalog(tools: &[ToolInfo], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(tools)?),
        OutputFormat::Table => {
            let rows = tools.iter().map(|t| ToolRow {
                name: t.name.clone(),
                category: t.category.clone(),
                description: t.description.clone(),
            });
            println!("{}", Table::new(rows).with(Style::rounded()));
            print_success(&format!("{} tools available", tools.len()));
        }
    }
    Ok(())
}
