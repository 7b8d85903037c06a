//! Configuration loading, validation, and management for Ferrobot.
//!
//! Loads configuration from `~/.ferrobot/config.toml` with environment
//! variable overrides. Validates all settings at startup.
//!
//! Remote MCP client entries are kept as raw tables and parsed per entry
//! into [`McpClientConfig`]: one malformed client must never fail the whole
//! config load — the manager logs and skips it while its siblings start.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.ferrobot/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the LLM provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Agent loop configuration
    #[serde(default)]
    pub agent: AgentConfig,

    /// Built-in tool configuration
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Remote MCP client configuration
    #[serde(default)]
    pub mcp: McpConfig,
}

fn default_api_base() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_base", &self.api_base)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("agent", &self.agent)
            .field("tools", &self.tools)
            .field("mcp", &self.mcp)
            .finish()
    }
}

/// Agent loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum model-call/tool-execution rounds per inbound message
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,

    /// Workspace directory for file tools (None = `~/.ferrobot/workspace`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
}

fn default_max_tool_iterations() -> u32 {
    20
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: default_max_tool_iterations(),
            workspace: None,
        }
    }
}

/// Built-in tool settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub exec: ExecToolConfig,
}

/// Shell exec tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecToolConfig {
    /// Command timeout in seconds
    #[serde(default = "default_exec_timeout")]
    pub timeout_secs: u64,

    /// If true, block commands that reference paths outside the workspace
    #[serde(default)]
    pub restrict_to_workspace: bool,
}

fn default_exec_timeout() -> u64 {
    60
}

impl Default for ExecToolConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_exec_timeout(),
            restrict_to_workspace: false,
        }
    }
}

/// Remote MCP client configuration.
///
/// Client entries stay as raw TOML tables here; [`McpClientConfig::from_value`]
/// parses them one at a time so a single bad entry is a per-client error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpConfig {
    /// Client name → raw configuration table
    #[serde(default)]
    pub clients: HashMap<String, toml::Value>,
}

/// Typed configuration for one remote MCP client, discriminated by the
/// required `transport` field. There is no default transport: a missing or
/// unrecognized discriminator fails this entry's parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum McpClientConfig {
    /// Subprocess speaking the protocol over its standard streams
    Stdio {
        #[serde(default)]
        enabled: bool,
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },

    /// Long-lived HTTP event stream
    Sse {
        #[serde(default)]
        enabled: bool,
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default = "default_connect_timeout")]
        connect_timeout_secs: u64,
        #[serde(default = "default_read_timeout")]
        read_timeout_secs: u64,
    },

    /// Direct request/response JSON-RPC over HTTP
    StreamableHttp {
        #[serde(default)]
        enabled: bool,
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

fn default_connect_timeout() -> u64 {
    5
}
fn default_read_timeout() -> u64 {
    300
}

impl McpClientConfig {
    /// Parse one raw client table into a typed config.
    pub fn from_value(name: &str, value: &toml::Value) -> Result<Self, ConfigError> {
        value
            .clone()
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::McpClient {
                name: name.to_string(),
                reason: e.to_string(),
            })
    }

    /// Whether this client should be started. Defaults to disabled.
    pub fn enabled(&self) -> bool {
        match self {
            Self::Stdio { enabled, .. }
            | Self::Sse { enabled, .. }
            | Self::StreamableHttp { enabled, .. } => *enabled,
        }
    }

    /// Short label for the transport kind, for logs and operator output.
    pub fn transport_label(&self) -> &'static str {
        match self {
            Self::Stdio { .. } => "stdio",
            Self::Sse { .. } => "sse",
            Self::StreamableHttp { .. } => "streamable_http",
        }
    }

    /// The endpoint shown to operators: the command for subprocess clients,
    /// the URL for HTTP clients.
    pub fn endpoint(&self) -> &str {
        match self {
            Self::Stdio { command, .. } => command,
            Self::Sse { url, .. } | Self::StreamableHttp { url, .. } => url,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (`~/.ferrobot/config.toml`).
    ///
    /// Also checks environment variables for API keys:
    /// - `FERROBOT_API_KEY` (highest priority)
    /// - `OPENROUTER_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        // Environment variable overrides (highest priority)
        if config.api_key.is_none() {
            config.api_key = std::env::var("FERROBOT_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("FERROBOT_MODEL") {
            config.default_model = model;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ferrobot")
    }

    /// Get the workspace directory for file tools.
    pub fn workspace_dir(&self) -> PathBuf {
        match &self.agent.workspace {
            Some(dir) => PathBuf::from(dir),
            None => Self::config_dir().join("workspace"),
        }
    }

    /// Get the session storage directory.
    pub fn sessions_dir() -> PathBuf {
        Self::config_dir().join("sessions")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_tool_iterations < 1 {
            return Err(ConfigError::ValidationError(
                "agent.max_tool_iterations must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: default_api_base(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            agent: AgentConfig::default(),
            tools: ToolsConfig::default(),
            mcp: McpConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Invalid MCP client '{name}': {reason}")]
    McpClient { name: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.agent.max_tool_iterations, 20);
        assert!(config.api_base.contains("openrouter.ai"));
        assert!(config.mcp.clients.is_empty());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_model, config.default_model);
        assert_eq!(
            parsed.agent.max_tool_iterations,
            config.agent.max_tool_iterations
        );
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_iterations_rejected() {
        let config = AppConfig {
            agent: AgentConfig {
                max_tool_iterations: 0,
                ..AgentConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        let config = result.unwrap();
        assert_eq!(config.default_model, default_model());
    }

    #[test]
    fn mcp_stdio_client_parsing() {
        let toml_str = r#"
[mcp.clients.fs]
transport = "stdio"
enabled = true
command = "npx"
args = ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"]

[mcp.clients.fs.env]
LOG_LEVEL = "error"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        let raw = config.mcp.clients.get("fs").unwrap();
        let client = McpClientConfig::from_value("fs", raw).unwrap();

        assert!(client.enabled());
        assert_eq!(client.transport_label(), "stdio");
        match client {
            McpClientConfig::Stdio {
                command, args, env, ..
            } => {
                assert_eq!(command, "npx");
                assert_eq!(args.len(), 3);
                assert_eq!(env.get("LOG_LEVEL").map(String::as_str), Some("error"));
            }
            other => panic!("Expected stdio client, got {other:?}"),
        }
    }

    #[test]
    fn mcp_sse_client_defaults() {
        let value: toml::Value = toml::from_str(
            r#"
transport = "sse"
enabled = true
url = "https://mcp.example.com/sse"
"#,
        )
        .unwrap();
        let client = McpClientConfig::from_value("web", &value).unwrap();
        match client {
            McpClientConfig::Sse {
                connect_timeout_secs,
                read_timeout_secs,
                headers,
                ..
            } => {
                assert_eq!(connect_timeout_secs, 5);
                assert_eq!(read_timeout_secs, 300);
                assert!(headers.is_empty());
            }
            other => panic!("Expected sse client, got {other:?}"),
        }
    }

    #[test]
    fn mcp_streamable_http_client_parsing() {
        let value: toml::Value = toml::from_str(
            r#"
transport = "streamable_http"
url = "https://mcp.example.com/rpc"

[headers]
Authorization = "Bearer token"
"#,
        )
        .unwrap();
        let client = McpClientConfig::from_value("rpc", &value).unwrap();
        // enabled defaults to false
        assert!(!client.enabled());
        assert_eq!(client.transport_label(), "streamable_http");
        assert_eq!(client.endpoint(), "https://mcp.example.com/rpc");
    }

    #[test]
    fn mcp_client_missing_transport_rejected() {
        let value: toml::Value = toml::from_str(
            r#"
enabled = true
command = "npx"
"#,
        )
        .unwrap();
        let err = McpClientConfig::from_value("fs", &value).unwrap_err();
        assert!(err.to_string().contains("fs"));
    }

    #[test]
    fn mcp_client_unknown_transport_rejected() {
        let value: toml::Value = toml::from_str(
            r#"
transport = "carrier_pigeon"
enabled = true
url = "https://example.com"
"#,
        )
        .unwrap();
        assert!(McpClientConfig::from_value("bird", &value).is_err());
    }

    #[test]
    fn mcp_stdio_missing_command_rejected() {
        let value: toml::Value = toml::from_str(
            r#"
transport = "stdio"
enabled = true
"#,
        )
        .unwrap();
        assert!(McpClientConfig::from_value("fs", &value).is_err());
    }

    #[test]
    fn one_bad_client_does_not_fail_config_load() {
        // The raw-table layer accepts anything; typing happens per entry.
        let toml_str = r#"
[mcp.clients.good]
transport = "stdio"
enabled = true
command = "npx"

[mcp.clients.bad]
transport = "carrier_pigeon"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.mcp.clients.len(), 2);
        assert!(
            McpClientConfig::from_value("good", config.mcp.clients.get("good").unwrap()).is_ok()
        );
        assert!(McpClientConfig::from_value("bad", config.mcp.clients.get("bad").unwrap()).is_err());
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
