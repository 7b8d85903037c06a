//! MCP client — one connection to one MCP server.
//!
//! The transport is chosen by the explicit `transport` discriminator in the
//! client's configuration; there is no default. Connect failures are raised
//! to the caller (the manager decides what to do), disconnect is idempotent
//! and swallows teardown errors.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use rmcp::{
    RoleClient, ServiceExt,
    model::{
        CallToolRequestParams, CallToolResult, ClientCapabilities, ClientInfo, Implementation,
        Tool as RemoteTool,
    },
    service::RunningService,
    transport::{
        SseClientTransport, StreamableHttpClientTransport, TokioChildProcess,
        sse_client::SseClientConfig,
        streamable_http_client::StreamableHttpClientTransportConfig,
    },
};
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info};

use ferrobot_config::McpClientConfig;

/// MCP client errors.
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    #[error("MCP client '{0}' is not connected")]
    NotConnected(String),

    #[error("Tool call failed: {0}")]
    ToolCallFailed(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type McpResult<T> = Result<T, McpError>;

/// Manages a single MCP server connection.
pub struct McpClient {
    name: String,
    config: McpClientConfig,
    quiet: bool,
    service: Mutex<Option<RunningService<RoleClient, ClientInfo>>>,
}

impl McpClient {
    /// Create a client from its typed configuration. No connection is made
    /// until [`connect`](Self::connect).
    pub fn new(name: impl Into<String>, config: McpClientConfig, quiet: bool) -> Self {
        Self {
            name: name.into(),
            config,
            quiet,
            service: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &McpClientConfig {
        &self.config
    }

    pub async fn is_connected(&self) -> bool {
        self.service.lock().await.is_some()
    }

    /// Connect to the MCP server and complete the initialize handshake.
    ///
    /// Raised errors are the caller's to handle; the client never retries
    /// internally.
    pub async fn connect(&self) -> McpResult<()> {
        let config = self.config.clone();
        match config {
            McpClientConfig::Stdio {
                command, args, env, ..
            } => self.connect_stdio(&command, &args, &env).await,
            McpClientConfig::Sse {
                url,
                headers,
                connect_timeout_secs,
                read_timeout_secs,
                ..
            } => {
                self.connect_sse(&url, &headers, connect_timeout_secs, read_timeout_secs)
                    .await
            }
            McpClientConfig::StreamableHttp { url, headers, .. } => {
                self.connect_streamable_http(&url, &headers).await
            }
        }
    }

    /// Spawn the configured subprocess and speak the protocol over its
    /// standard streams. Quiet mode nulls the child's stderr; protocol
    /// traffic on stdin/stdout is untouched.
    async fn connect_stdio(
        &self,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> McpResult<()> {
        info!(client = %self.name, command, "Connecting to MCP server (stdio)");

        let mut cmd = Command::new(command);
        cmd.args(args);
        cmd.envs(env);
        if self.quiet {
            cmd.stderr(Stdio::null());
        }

        let transport = TokioChildProcess::new(cmd)?;
        self.initialize_over(transport).await
    }

    /// Open a long-lived HTTP event stream, with custom headers, a connect
    /// timeout, and a separate idle read timeout for the stream.
    async fn connect_sse(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> McpResult<()> {
        info!(client = %self.name, url, "Connecting to MCP server (sse)");

        let http = reqwest::Client::builder()
            .default_headers(build_header_map(&self.name, headers))
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .read_timeout(Duration::from_secs(read_timeout_secs))
            .build()
            .map_err(|e| McpError::ConnectionFailed(e.to_string()))?;

        let transport = SseClientTransport::start_with_client(
            http,
            SseClientConfig {
                sse_endpoint: url.to_string().into(),
                ..Default::default()
            },
        )
        .await
        .map_err(|e| McpError::ConnectionFailed(e.to_string()))?;

        self.initialize_over(transport).await
    }

    /// Direct request/response JSON-RPC over HTTP with custom headers. No
    /// persistent stream; teardown is handled by [`disconnect`](Self::disconnect),
    /// which tolerates servers without a termination endpoint.
    async fn connect_streamable_http(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> McpResult<()> {
        info!(client = %self.name, url, "Connecting to MCP server (streamable_http)");

        let http = reqwest::Client::builder()
            .default_headers(build_header_map(&self.name, headers))
            .build()
            .map_err(|e| McpError::ConnectionFailed(e.to_string()))?;

        let transport = StreamableHttpClientTransport::with_client(
            http,
            StreamableHttpClientTransportConfig {
                uri: url.to_string().into(),
                ..Default::default()
            },
        );

        self.initialize_over(transport).await
    }

    async fn initialize_over<T, E, A>(&self, transport: T) -> McpResult<()>
    where
        T: rmcp::transport::IntoTransport<RoleClient, E, A>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let service = client_info()
            .serve(transport)
            .await
            .map_err(|e| McpError::InitializationFailed(e.to_string()))?;

        *self.service.lock().await = Some(service);
        info!(client = %self.name, "Connected and initialized");
        Ok(())
    }

    /// Disconnect from the MCP server.
    ///
    /// Idempotent: calling on an already-disconnected client is a no-op.
    /// Teardown errors (including a missing server-side termination
    /// endpoint) are logged and swallowed — the client is shutting down.
    pub async fn disconnect(&self) {
        let service = self.service.lock().await.take();
        match service {
            Some(service) => {
                if let Err(e) = service.cancel().await {
                    debug!(client = %self.name, error = %e, "Ignoring error during disconnect");
                }
                info!(client = %self.name, "Disconnected");
            }
            None => debug!(client = %self.name, "Already disconnected"),
        }
    }

    /// List available tools from the MCP server.
    pub async fn list_tools(&self) -> McpResult<Vec<RemoteTool>> {
        let guard = self.service.lock().await;
        let service = guard
            .as_ref()
            .ok_or_else(|| McpError::NotConnected(self.name.clone()))?;

        let result = service
            .list_tools(Default::default())
            .await
            .map_err(|e| McpError::Protocol(e.to_string()))?;

        debug!(client = %self.name, count = result.tools.len(), "Listed remote tools");
        Ok(result.tools)
    }

    /// Call a tool on the MCP server.
    pub async fn call_tool(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> McpResult<CallToolResult> {
        let guard = self.service.lock().await;
        let service = guard
            .as_ref()
            .ok_or_else(|| McpError::NotConnected(self.name.clone()))?;

        let params = CallToolRequestParams {
            meta: None,
            name: tool_name.to_owned().into(),
            arguments: arguments.as_object().cloned(),
            task: None,
        };

        service
            .call_tool(params)
            .await
            .map_err(|e| McpError::ToolCallFailed(e.to_string()))
    }
}

fn client_info() -> ClientInfo {
    ClientInfo {
        meta: None,
        protocol_version: Default::default(),
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: "ferrobot".to_string(),
            title: Some("Ferrobot".to_string()),
            version: env!("CARGO_PKG_VERSION").to_string(),
            website_url: None,
            icons: None,
        },
    }
}

/// Build a reqwest header map from configured headers, skipping entries
/// that are not valid HTTP header names/values.
fn build_header_map(
    client_name: &str,
    headers: &HashMap<String, String>,
) -> reqwest::header::HeaderMap {
    use reqwest::header::{HeaderName, HeaderValue};

    let mut map = reqwest::header::HeaderMap::new();
    for (key, value) in headers {
        match (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => {
                tracing::warn!(client = %client_name, header = %key, "Skipping invalid header");
            }
        }
    }
    map
}
