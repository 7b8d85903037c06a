//! MCP (Model Context Protocol) integration for Ferrobot.
//!
//! Connects to external MCP servers over three transports — a subprocess
//! speaking over its standard streams, an HTTP event stream (SSE), or
//! direct HTTP JSON-RPC (streamable HTTP) — and exposes their tools to the
//! agent loop as ordinary [`ferrobot_core::Tool`]s.
//!
//! Failure isolation is the organizing principle: one client failing to
//! connect, list, or execute never takes down a sibling client, the
//! manager, or the agent loop.

pub mod adapter;
pub mod client;
pub mod manager;

pub use adapter::McpToolAdapter;
pub use client::{McpClient, McpError, McpResult};
pub use manager::McpManager;
