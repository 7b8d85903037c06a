//! Built-in tool implementations for Ferrobot.
//!
//! Tools give the agent the ability to interact with the world: read and
//! write workspace files, list directories, run shell commands, and fetch
//! URLs. Remote MCP tools are registered separately by the MCP manager.

pub mod file_read;
pub mod file_write;
pub mod http_request;
pub mod list_dir;
pub mod shell;
mod workspace;

use std::path::PathBuf;

use ferrobot_config::ExecToolConfig;
use ferrobot_core::tool::ToolRegistry;

/// Create a tool registry with all built-in tools, rooted at `workspace`.
///
/// Relative paths resolve against the workspace; when
/// `exec.restrict_to_workspace` is set, file and shell access outside it is
/// blocked.
pub fn default_registry(workspace: PathBuf, exec: &ExecToolConfig) -> ToolRegistry {
    let restrict = exec.restrict_to_workspace;

    let mut registry = ToolRegistry::new();
    registry.register(Box::new(file_read::FileReadTool::new(
        workspace.clone(),
        restrict,
    )));
    registry.register(Box::new(file_write::FileWriteTool::new(
        workspace.clone(),
        restrict,
    )));
    registry.register(Box::new(list_dir::ListDirTool::new(
        workspace.clone(),
        restrict,
    )));
    registry.register(Box::new(shell::ShellTool::new(
        workspace,
        exec.timeout_secs,
        restrict,
    )));
    registry.register(Box::new(http_request::HttpRequestTool::new()));
    registry
}
