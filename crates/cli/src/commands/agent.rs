//! `ferrobot agent` — single-shot or interactive chat via the direct path.

use anyhow::Result;
use ferrobot_config::AppConfig;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::build_agent;

const SESSION_KEY: &str = "cli:direct";

pub async fn run(message: Option<String>, quiet: bool) -> Result<()> {
    let config = AppConfig::load()?;
    let (mut agent, _bus) = build_agent(&config, quiet)?;

    if let Some(message) = message {
        let response = agent.process_direct(&message, SESSION_KEY).await?;
        println!("{response}");
        return Ok(());
    }

    // Interactive mode: one direct round-trip per line
    println!("Ferrobot ({}). Type 'exit' to quit.", config.default_model);
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        print_prompt();
        let Some(line) = lines.next_line().await? else {
            break; // EOF
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit" | "/exit" | "/quit" | ":q") {
            break;
        }

        match agent.process_direct(line, SESSION_KEY).await {
            Ok(response) => println!("{response}"),
            Err(e) => eprintln!("Error: {e}"),
        }
    }

    Ok(())
}

fn print_prompt() {
    use std::io::Write;
    print!("> ");
    let _ = std::io::stdout().flush();
}
