//! `ferrobot onboard` — initialize configuration and workspace.

use anyhow::{Context, Result};
use ferrobot_config::AppConfig;

pub async fn run() -> Result<()> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create {}", config_dir.display()))?;
    std::fs::create_dir_all(AppConfig::default().workspace_dir())
        .context("Failed to create workspace directory")?;
    std::fs::create_dir_all(AppConfig::sessions_dir())
        .context("Failed to create sessions directory")?;

    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    println!("Wrote default config to {}", config_path.display());
    println!("Set your API key there (or export FERROBOT_API_KEY) and run `ferrobot agent`.");
    Ok(())
}
