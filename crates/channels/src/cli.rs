//! CLI channel — bridges the terminal to the message bus.
//!
//! This is the simplest channel: each stdin line becomes an inbound message
//! on channel `cli`, and outbound messages print to stdout. Used by the
//! `ferrobot run` command.

use std::sync::Arc;

use ferrobot_core::bus::{InboundMessage, MessageBus};
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

/// The channel name and chat id this adapter publishes under.
pub const CHANNEL_NAME: &str = "cli";
pub const CHAT_ID: &str = "direct";

/// Terminal adapter for interactive use.
pub struct CliChannel {
    bus: Arc<MessageBus>,
}

impl CliChannel {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self { bus }
    }

    /// Read stdin lines onto the bus until EOF or an exit command.
    pub async fn pump_input(&self) {
        let stdin = io::stdin();
        let reader = BufReader::new(stdin);
        let mut lines = reader.lines();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    if is_exit_command(&line) {
                        break;
                    }
                    if let Err(e) = self.bus.publish_inbound(to_inbound(&line)).await {
                        warn!(error = %e, "Bus rejected inbound message");
                        break;
                    }
                }
                Ok(None) => break, // EOF (Ctrl+D)
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }

        debug!("CLI input closed");
    }

    /// Spawn a task printing outbound messages to stdout. Runs until the
    /// bus closes or the task is aborted.
    pub fn spawn_output_printer(&self) -> tokio::task::JoinHandle<()> {
        let bus = self.bus.clone();
        tokio::spawn(async move {
            while let Ok(msg) = bus.consume_outbound().await {
                if msg.channel != CHANNEL_NAME {
                    // No adapter for the target platform in this process;
                    // surface the message instead of dropping it.
                    println!("[{}:{}] {}", msg.channel, msg.chat_id, msg.content);
                    continue;
                }
                println!("{}", msg.content);
            }
        })
    }
}

fn is_exit_command(line: &str) -> bool {
    matches!(line, "exit" | "quit" | "/exit" | "/quit" | ":q")
}

fn to_inbound(line: &str) -> InboundMessage {
    InboundMessage::new(CHANNEL_NAME, "local_user", CHAT_ID, line)
}
