//! `ferrobot status` — show configuration status.

use anyhow::Result;
use ferrobot_config::{AppConfig, McpClientConfig};

pub async fn run() -> Result<()> {
    let config = AppConfig::load()?;

    println!("Ferrobot status");
    println!("  config dir:  {}", AppConfig::config_dir().display());
    println!("  workspace:   {}", config.workspace_dir().display());
    println!("  api base:    {}", config.api_base);
    println!("  model:       {}", config.default_model);
    println!(
        "  api key:     {}",
        if config.has_api_key() { "set" } else { "missing" }
    );
    println!(
        "  iterations:  {} max per message",
        config.agent.max_tool_iterations
    );

    if config.mcp.clients.is_empty() {
        println!("  mcp clients: none configured");
        return Ok(());
    }

    println!("  mcp clients:");
    let mut names: Vec<_> = config.mcp.clients.keys().collect();
    names.sort();
    for name in names {
        let raw = &config.mcp.clients[name];
        match McpClientConfig::from_value(name, raw) {
            Ok(client) => println!(
                "    {name}: {} `{}`{}",
                client.transport_label(),
                client.endpoint(),
                if client.enabled() { "" } else { " (disabled)" }
            ),
            Err(e) => println!("    {name}: INVALID — {e}"),
        }
    }

    Ok(())
}
