//! Tool invocation commands

use anyhow::Result;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::client::ApiClient;
use crate::output::{print_catalog, print_envelope, OutputFormat};

/// Tool name plus the JSON arguments built from command-line flags
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub tool: &'static str,
    pub args: Map<String, Value>,
}

impl ToolCall {
    pub fn new(tool: &'static str) -> Self {
        Self {
            tool,
            args: Map::new(),
        }
    }

    /// Add an argument; `None` leaves the server default in place
    pub fn arg(mut self, key: &str, value: impl Serialize) -> Self {
        match serde_json::to_value(value) {
            Ok(Value::Null) | Err(_) => {}
            Ok(value) => {
                self.args.insert(key.to_string(), value);
            }
        }
        self
    }
}

/// Call a tool and print its envelope
///
/// An error envelope is printed, then reported as a failure so the exit
/// status reflects it.
pub async fn run(client: &ApiClient, call: ToolCall, format: OutputFormat) -> Result<()> {
    let envelope = client.call_tool(call.tool, &call.args).await?;
    print_envelope(call.tool, &envelope, format)?;

    if envelope.is_error() {
        anyhow::bail!(
            "{} failed: {}",
            call.tool,
            envelope.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

/// List the server's tools
pub async fn list_tools(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let tools = client.list_tools().await?;
    print_catalog(&tools, format)
}
