use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tools::{FieldKind, FieldSpec, ObjectSpec, SideEffect, Tool, ToolError, ToolOutput};

/// Commands the agent is allowed to run. Anything else is refused before
/// a process is spawned.
const DEFAULT_ALLOWLIST: &[&str] = &[
    "ls", "pwd", "whoami", "date", "echo", "cat", "grep", "find", "df", "free", "uptime", "ps",
    "wc", "head", "tail",
];

/// Execute an allow-listed shell command and capture its output.
pub struct RunCommand {
    allowlist: Vec<String>,
}

impl RunCommand {
    pub fn new(allowlist: Vec<String>) -> Self {
        Self { allowlist }
    }
}

impl Default for RunCommand {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWLIST.iter().map(|s| s.to_string()).collect())
    }
}

#[async_trait]
impl Tool for RunCommand {
    fn name(&self) -> String {
        "run_command".into()
    }

    fn description(&self) -> String {
        format!(
            "Execute an allow-listed shell command. Allowed: {}",
            self.allowlist.join(", ")
        )
    }

    fn parameters(&self) -> ObjectSpec {
        ObjectSpec::new(vec![FieldSpec::required(
            "command",
            FieldKind::String,
            "Command line, e.g. \"ls -la\"",
        )])
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::Exec
    }

    async fn call(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let command_line = params
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::MissingParameter("command".into()))?;

        let mut parts = command_line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| ToolError::msg("Empty command"))?;
        if !self.allowlist.iter().any(|allowed| allowed == program) {
            return Err(ToolError::msg(format!(
                "Command not in allowlist: {program}"
            )));
        }

        let output = tokio::process::Command::new(program)
            .args(parts)
            .output()
            .await
            .map_err(ToolError::execution_error)?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        if !output.status.success() {
            return Err(ToolError::msg(format!(
                "Command {program} failed with exit code {exit_code}: {stderr}"
            )));
        }

        Ok(ToolOutput::message(stdout.clone()).with_data(json!({
            "command": command_line,
            "stdout": stdout,
            "stderr": stderr,
            "exit_code": exit_code,
        })))
    }
}
