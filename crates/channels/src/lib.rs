//! Chat channel adapters for Ferrobot.
//!
//! A channel bridges one chat surface to the message bus: it publishes what
//! users send as inbound messages and delivers outbound messages back.
//! Platform adapters (webhooks, bot APIs) live outside this repository; the
//! built-in CLI channel covers the terminal.

pub mod cli;

pub use cli::CliChannel;
