//! CLI command implementations.

pub mod agent;
pub mod onboard;
pub mod run;
pub mod status;

use std::sync::Arc;

use anyhow::{Context, Result};
use ferrobot_agent::AgentLoop;
use ferrobot_config::AppConfig;
use ferrobot_core::bus::MessageBus;
use ferrobot_mcp::McpManager;
use ferrobot_providers::OpenAiCompatProvider;
use ferrobot_session::FileSessionStore;

/// Wire an agent loop from the loaded configuration.
pub(crate) fn build_agent(
    config: &AppConfig,
    quiet: bool,
) -> Result<(AgentLoop, Arc<MessageBus>)> {
    let api_key = config
        .api_key
        .clone()
        .context("No API key configured. Run `ferrobot onboard` or set FERROBOT_API_KEY.")?;

    let provider = Arc::new(
        OpenAiCompatProvider::new("openai_compat", &config.api_base, api_key)
            .context("Failed to construct provider")?,
    );

    let bus = Arc::new(MessageBus::new());
    let sessions = Arc::new(FileSessionStore::new(AppConfig::sessions_dir()));
    let tools = ferrobot_tools::default_registry(config.workspace_dir(), &config.tools.exec);
    let mcp = McpManager::from_config(&config.mcp, quiet);

    let agent = AgentLoop::new(
        bus.clone(),
        provider,
        sessions,
        tools,
        config.default_model.clone(),
    )
    .with_temperature(config.default_temperature)
    .with_max_tokens(config.default_max_tokens)
    .with_max_iterations(config.agent.max_tool_iterations)
    .with_mcp_manager(mcp);

    Ok((agent, bus))
}
