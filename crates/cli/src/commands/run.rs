//! `ferrobot run` — the bus-driven agent loop with the terminal attached.

use std::sync::Arc;

use anyhow::Result;
use ferrobot_channels::CliChannel;
use ferrobot_config::AppConfig;
use tracing::info;

use super::build_agent;

pub async fn run(quiet: bool) -> Result<()> {
    let config = AppConfig::load()?;
    let (mut agent, bus) = build_agent(&config, quiet)?;
    let handle = agent.handle();

    let loop_task = tokio::spawn(async move {
        agent.run().await;
    });

    let channel = CliChannel::new(Arc::clone(&bus));
    let printer = channel.spawn_output_printer();

    println!(
        "Ferrobot running ({}). Type a message, or 'exit' to stop.",
        config.default_model
    );

    // Stdin closing or Ctrl-C both end the run
    tokio::select! {
        _ = channel.pump_input() => {
            info!("Input closed");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received");
        }
    }

    handle.stop();
    // The loop observes the flag at its next poll boundary
    loop_task.await?;
    printer.abort();

    Ok(())
}
