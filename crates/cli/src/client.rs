//! API client for the observer tool server

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

/// API client for the tool server
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    /// Tool catalog
    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        self.get("api/v1/tools").await
    }

    /// Invoke one tool by name
    pub async fn call_tool(&self, name: &str, args: &Map<String, Value>) -> Result<Envelope> {
        self.post(&format!("api/v1/tools/{name}"), args).await
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub category: String,
    pub description: String,
}

/// Tool response envelope as the server sends it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub status: String,
    #[serde(default)]
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Envelope {
    pub fn is_error(&self) -> bool {
        self.status == "error"
    }

    pub fn error_type(&self) -> Option<&str> {
        self.metadata.get("error_type").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn test_list_tools() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/tools")
            .with_header("content-type", "application/json")
            .with_body(
                json!([{"name": "get_pod_status", "category": "health", "description": "Pods"}])
                    .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let tools = client.list_tools().await.unwrap();

        mock.assert_async().await;
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].category, "health");
    }

    #[tokio::test]
    async fn test_call_tool_posts_args() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/tools/get_pod_status")
            .match_body(Matcher::Json(json!({"namespace": "prod"})))
            .with_body(
                json!({
                    "status": "error",
                    "result": null,
                    "error": "Namespace not found",
                    "metadata": {"error_type": "NotFoundError"}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let mut args = Map::new();
        args.insert("namespace".into(), json!("prod"));
        let envelope = client.call_tool("get_pod_status", &args).await.unwrap();

        mock.assert_async().await;
        assert!(envelope.is_error());
        assert_eq!(envelope.error_type(), Some("NotFoundError"));
        assert!(envelope.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_http_error_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/tools")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.list_tools().await.unwrap_err();
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
