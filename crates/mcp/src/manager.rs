//! MCP client manager — owns the set of configured clients.
//!
//! Every operation here is per-client isolated: a client that fails to
//! parse, connect, or list tools is logged and dropped from the active set
//! without affecting its siblings, and nothing the manager does can fail
//! the caller.

use std::collections::HashMap;
use std::sync::Arc;

use rmcp::model::Tool as RemoteTool;
use tracing::{debug, info, warn};

use ferrobot_config::{McpClientConfig, McpConfig};
use ferrobot_core::tool::ToolRegistry;

use crate::adapter::McpToolAdapter;
use crate::client::McpClient;

/// Manages multiple MCP client connections.
pub struct McpManager {
    /// Typed, enabled configurations, keyed by client name
    configs: HashMap<String, McpClientConfig>,

    /// Successfully connected clients (the active set)
    clients: HashMap<String, Arc<McpClient>>,

    /// Suppress subprocess diagnostics for stdio clients
    quiet: bool,
}

impl McpManager {
    /// Create a manager from typed client configurations.
    pub fn new(configs: HashMap<String, McpClientConfig>, quiet: bool) -> Self {
        Self {
            configs,
            clients: HashMap::new(),
            quiet,
        }
    }

    /// Create a manager from the raw configuration section.
    ///
    /// Each entry is parsed on its own: a malformed or disabled entry is
    /// logged and skipped, siblings are unaffected.
    pub fn from_config(config: &McpConfig, quiet: bool) -> Self {
        let mut configs = HashMap::new();

        for (name, raw) in &config.clients {
            match McpClientConfig::from_value(name, raw) {
                Ok(client) if client.enabled() => {
                    configs.insert(name.clone(), client);
                }
                Ok(_) => {
                    debug!(client = %name, "MCP client disabled, skipping");
                }
                Err(e) => {
                    warn!(client = %name, error = %e, "Invalid MCP client configuration, skipping");
                }
            }
        }

        Self::new(configs, quiet)
    }

    /// Whether any clients are configured (enabled and well-formed).
    pub fn has_clients(&self) -> bool {
        !self.configs.is_empty()
    }

    /// Connect to all configured MCP servers.
    ///
    /// A client enters the active set only once its initialize handshake
    /// has completed. Per-client failures are logged; siblings still start.
    pub async fn start(&mut self) {
        for (name, config) in &self.configs {
            let client = Arc::new(McpClient::new(name.clone(), config.clone(), self.quiet));
            match client.connect().await {
                Ok(()) => {
                    self.clients.insert(name.clone(), client);
                }
                Err(e) => {
                    warn!(client = %name, error = %e, "Failed to start MCP client");
                }
            }
        }

        info!(
            active = self.clients.len(),
            configured = self.configs.len(),
            "MCP manager started"
        );
    }

    /// Disconnect from all MCP servers and clear the active set.
    ///
    /// Per-client teardown failures are swallowed inside
    /// [`McpClient::disconnect`]; nothing here can fail the caller.
    pub async fn stop(&mut self) {
        for (_, client) in self.clients.drain() {
            client.disconnect().await;
        }
        info!("MCP manager stopped");
    }

    /// Get a connected MCP client by name.
    pub fn client(&self, name: &str) -> Option<Arc<McpClient>> {
        self.clients.get(name).cloned()
    }

    /// Names of the currently connected clients, sorted for determinism.
    pub fn active_clients(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.clients.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// List tools from all connected MCP servers.
    ///
    /// A listing failure for one client yields an empty list for that
    /// client only.
    pub async fn list_all_tools(&self) -> HashMap<String, Vec<RemoteTool>> {
        let mut all_tools = HashMap::new();
        for (name, client) in &self.clients {
            match client.list_tools().await {
                Ok(tools) => {
                    all_tools.insert(name.clone(), tools);
                }
                Err(e) => {
                    warn!(client = %name, error = %e, "Failed to list tools");
                    all_tools.insert(name.clone(), Vec::new());
                }
            }
        }
        all_tools
    }

    /// Adapt every (client, remote tool) pair into a registry tool.
    ///
    /// Exposed names are `mcp_<client>_<tool>`, so two clients exposing
    /// identically-named tools never collide. Clients are processed in
    /// sorted order so registration order is stable. Returns the number of
    /// tools registered.
    pub async fn register_tools(&self, registry: &mut ToolRegistry) -> usize {
        let all_tools = self.list_all_tools().await;
        let mut registered = 0;

        for name in self.active_clients() {
            let Some(client) = self.clients.get(name) else {
                continue;
            };
            let Some(tools) = all_tools.get(name) else {
                continue;
            };

            for tool in tools {
                let adapter = McpToolAdapter::new(client.clone(), tool.clone());
                debug!(tool = %adapter.exposed_name(), "Registering MCP tool");
                registry.register(Box::new(adapter));
                registered += 1;
            }
        }

        info!(count = registered, "Registered MCP tools");
        registered
    }

    /// One line per connected client, for the system prompt and operator
    /// output. `None` when nothing is connected.
    pub fn summary(&self) -> Option<String> {
        if self.clients.is_empty() {
            return None;
        }

        let lines: Vec<String> = self
            .active_clients()
            .into_iter()
            .filter_map(|name| self.clients.get(name))
            .map(|client| {
                format!(
                    "- **{}** ({}): `{}`",
                    client.name(),
                    client.config().transport_label(),
                    client.config().endpoint()
                )
            })
            .collect();

        Some(lines.join("\n"))
    }
}
