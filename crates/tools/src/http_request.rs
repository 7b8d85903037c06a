//! HTTP request tool — fetch a URL and return the response.

use async_trait::async_trait;
use ferrobot_core::error::ToolError;
use ferrobot_core::tool::{Tool, ToolResult};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Maximum response body returned to the model, to keep context bounded.
const MAX_BODY_BYTES: usize = 100 * 1024;

pub struct HttpRequestTool {
    client: reqwest::Client,
}

impl HttpRequestTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpRequestTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for HttpRequestTool {
    fn name(&self) -> &str {
        "http_request"
    }

    fn description(&self) -> &str {
        "Make an HTTP request to a URL. Supports GET, POST, PUT, PATCH, and DELETE methods. \
         Returns the response status and body."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to send the request to"
                },
                "method": {
                    "type": "string",
                    "description": "HTTP method (GET, POST, PUT, PATCH, DELETE). Defaults to GET.",
                    "enum": ["GET", "POST", "PUT", "PATCH", "DELETE"],
                    "default": "GET"
                },
                "headers": {
                    "type": "object",
                    "description": "Optional HTTP headers as key-value pairs",
                    "additionalProperties": { "type": "string" }
                },
                "body": {
                    "type": "string",
                    "description": "Optional request body (for POST, PUT, PATCH)"
                },
                "timeout_secs": {
                    "type": "integer",
                    "description": "Request timeout in seconds (default 30)",
                    "default": 30
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let url = arguments["url"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'url' argument".into()))?;

        let method = arguments["method"].as_str().unwrap_or("GET").to_uppercase();

        if !matches!(method.as_str(), "GET" | "POST" | "PUT" | "PATCH" | "DELETE") {
            return Err(ToolError::InvalidArguments(format!(
                "Invalid HTTP method: {method}. Must be GET, POST, PUT, PATCH, or DELETE."
            )));
        }

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolError::InvalidArguments(
                "URL must start with http:// or https://".into(),
            ));
        }

        let headers: HashMap<String, String> = arguments
            .get("headers")
            .and_then(|h| serde_json::from_value(h.clone()).ok())
            .unwrap_or_default();

        let body = arguments["body"].as_str().map(|s| s.to_string());
        let timeout_secs = arguments["timeout_secs"].as_u64().unwrap_or(30);

        debug!(url, method = %method, "Sending HTTP request");

        let mut request = match method.as_str() {
            "POST" => self.client.post(url),
            "PUT" => self.client.put(url),
            "PATCH" => self.client.patch(url),
            "DELETE" => self.client.delete(url),
            _ => self.client.get(url),
        }
        .timeout(Duration::from_secs(timeout_secs));

        for (key, value) in &headers {
            request = request.header(key, value);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = match request.send().await {
            Ok(resp) => resp,
            Err(e) => return Ok(ToolResult::error(format!("Request failed: {e}"))),
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(t) => t,
            Err(e) => return Ok(ToolResult::error(format!("Failed to read response: {e}"))),
        };

        let truncated = if text.len() > MAX_BODY_BYTES {
            let mut end = MAX_BODY_BYTES;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}\n... (truncated, {} bytes total)", &text[..end], text.len())
        } else {
            text
        };

        let output = format!("HTTP {}\n{truncated}", status.as_u16());
        Ok(if status.is_success() {
            ToolResult::ok(output)
        } else {
            ToolResult::error(output)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_definition() {
        let tool = HttpRequestTool::new();
        assert_eq!(tool.name(), "http_request");
        let schema = tool.parameters_schema();
        assert_eq!(schema["required"], serde_json::json!(["url"]));
        assert!(schema["properties"]["method"].is_object());
    }

    #[tokio::test]
    async fn missing_url_returns_error() {
        let tool = HttpRequestTool::new();
        let result = tool.execute(serde_json::json!({})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn invalid_url_scheme_returns_error() {
        let tool = HttpRequestTool::new();
        let result = tool
            .execute(serde_json::json!({ "url": "ftp://files.example.com" }))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn invalid_method_returns_error() {
        let tool = HttpRequestTool::new();
        let result = tool
            .execute(serde_json::json!({
                "url": "https://example.com",
                "method": "TRACE"
            }))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unreachable_host_is_error_text_not_fault() {
        let tool = HttpRequestTool::new();
        let result = tool
            .execute(serde_json::json!({
                "url": "http://127.0.0.1:1",
                "timeout_secs": 2
            }))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.contains("Request failed"));
    }
}
