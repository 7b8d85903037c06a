//! Shell tool — execute system commands.
//!
//! Runs commands through `sh -c` in the workspace directory, with a timeout
//! and optional workspace scoping.

use async_trait::async_trait;
use ferrobot_core::error::ToolError;
use ferrobot_core::tool::{Tool, ToolResult};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Execute shell commands with safety constraints.
pub struct ShellTool {
    workspace: PathBuf,
    timeout_secs: u64,
    restrict_to_workspace: bool,
}

impl ShellTool {
    pub fn new(workspace: PathBuf, timeout_secs: u64, restrict_to_workspace: bool) -> Self {
        Self {
            workspace,
            timeout_secs,
            restrict_to_workspace,
        }
    }

    /// Workspace scoping: reject commands that name absolute paths outside
    /// the workspace or traverse upward. Coarse by design — the command
    /// already runs with the workspace as its working directory.
    fn check_command(&self, command: &str) -> Result<(), ToolError> {
        if !self.restrict_to_workspace {
            return Ok(());
        }

        for token in command.split_whitespace() {
            let token = token.trim_matches(|c| c == '"' || c == '\'');
            if token.contains("..") {
                return Err(ToolError::PermissionDenied {
                    tool_name: "shell".into(),
                    reason: "parent-directory traversal is not allowed".into(),
                });
            }
            if token.starts_with('/') && !Path::new(token).starts_with(&self.workspace) {
                return Err(ToolError::PermissionDenied {
                    tool_name: "shell".into(),
                    reason: format!("path '{token}' is outside the workspace"),
                });
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the workspace and return stdout/stderr. \
         Use this for running programs, checking files, git operations, etc."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let command = arguments["command"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;

        self.check_command(command)?;

        debug!(command = %command, "Executing shell command");

        let mut child = Command::new("sh");
        child
            .args(["-c", command])
            .current_dir(&self.workspace)
            .kill_on_drop(true);

        let output = tokio::time::timeout(Duration::from_secs(self.timeout_secs), child.output())
            .await
            .map_err(|_| ToolError::Timeout {
                tool_name: "shell".into(),
                timeout_secs: self.timeout_secs,
            })?;

        match output {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let success = output.status.success();

                let result_text = if success {
                    if stderr.is_empty() {
                        stdout
                    } else {
                        format!("{stdout}\n[stderr]: {stderr}")
                    }
                } else {
                    let code = output.status.code().unwrap_or(-1);
                    warn!(command = %command, exit_code = code, "Command failed");
                    format!("[exit code: {code}]\n{stdout}\n{stderr}")
                };

                Ok(ToolResult {
                    success,
                    output: result_text.trim().to_string(),
                })
            }
            Err(e) => Err(ToolError::ExecutionFailed {
                tool_name: "shell".into(),
                reason: e.to_string(),
            }),
        }
    }
}
