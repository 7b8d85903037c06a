//! Adapter exposing one remote MCP tool as a registry tool.
//!
//! The exposed name is the composite `mcp_<client>_<tool>` so two clients
//! exposing identically-named remote tools never collide, and the
//! description is prefixed with the owning client's name for operator
//! legibility. Execution normalizes the protocol's heterogeneous result
//! shapes into plain text and converts every fault into error text — the
//! agent loop sees the same contract as for built-in tools.

use std::sync::Arc;

use async_trait::async_trait;
use rmcp::model::{CallToolResult, RawContent, ResourceContents, Tool as RemoteTool};
use tracing::debug;

use ferrobot_core::error::ToolError;
use ferrobot_core::tool::{Tool, ToolResult};

use crate::client::McpClient;

/// Wraps an MCP tool as a Ferrobot tool.
pub struct McpToolAdapter {
    client: Arc<McpClient>,
    remote_name: String,
    exposed_name: String,
    description: String,
    parameters: serde_json::Value,
}

impl McpToolAdapter {
    pub fn new(client: Arc<McpClient>, tool: RemoteTool) -> Self {
        let remote_name = tool.name.to_string();
        let exposed_name = format!("mcp_{}_{}", client.name(), remote_name);

        let base_description = tool
            .description
            .as_deref()
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Remote tool: {remote_name}"));
        let description = format!("[{}] {}", client.name(), base_description);

        let parameters = serde_json::to_value(tool.input_schema.as_ref())
            .unwrap_or_else(|_| serde_json::json!({"type": "object"}));

        Self {
            client,
            remote_name,
            exposed_name,
            description,
            parameters,
        }
    }

    /// The name the tool has on its own server.
    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }

    /// The collision-free name exposed to the registry and the model.
    pub fn exposed_name(&self) -> &str {
        &self.exposed_name
    }

    /// The name of the client owning this tool.
    pub fn client_name(&self) -> &str {
        self.client.name()
    }
}

#[async_trait]
impl Tool for McpToolAdapter {
    fn name(&self) -> &str {
        &self.exposed_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.parameters.clone()
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError> {
        debug!(tool = %self.exposed_name, "Invoking remote tool");

        match self.client.call_tool(&self.remote_name, arguments).await {
            Ok(result) => {
                let is_error = result.is_error.unwrap_or(false);
                let text = render_result(&result);
                Ok(if is_error {
                    ToolResult::error(text)
                } else {
                    ToolResult::ok(text)
                })
            }
            // The model-call contract is uniform with built-in tools: a
            // fault becomes error text, never a raised error.
            Err(e) => Ok(ToolResult::error(format!("Error: {e}"))),
        }
    }
}

/// Normalize a remote result into plain text.
///
/// Text blocks are concatenated with newlines; resource blocks render as a
/// short placeholder carrying the URI; other typed blocks render as a
/// generic placeholder. A result with no recognizable content at all is
/// dumped as formatted JSON so nothing is silently lost.
fn render_result(result: &CallToolResult) -> String {
    let mut parts: Vec<String> = Vec::new();

    for item in &result.content {
        match &item.raw {
            RawContent::Text(t) => parts.push(t.text.clone()),
            RawContent::Resource(r) => {
                parts.push(format!("[resource: {}]", resource_uri(&r.resource)));
            }
            _ => parts.push("[non-text content]".to_string()),
        }
    }

    if parts.is_empty() {
        return serde_json::to_string_pretty(result)
            .unwrap_or_else(|_| "(empty result)".to_string());
    }

    parts.join("\n")
}

fn resource_uri(resource: &ResourceContents) -> &str {
    match resource {
        ResourceContents::TextResourceContents { uri, .. } => uri,
        ResourceContents::BlobResourceContents { uri, .. } => uri,
    }
}
