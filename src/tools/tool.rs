use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{ObjectSpec, ToolError};

/// Side-effect class of a tool, used for logging and policy decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    Read,
    Write,
    Exec,
    Net,
}

/// What a handler hands back on success: a human-readable message plus
/// tool-specific fields that flow into the execution record as JSON.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub message: String,
    pub data: Value,
}

impl ToolOutput {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: Value::Null,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

impl From<String> for ToolOutput {
    fn from(message: String) -> Self {
        ToolOutput::message(message)
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the name of the tool, as referenced in model output.
    fn name(&self) -> String;

    /// Provides a description of what the tool does and when to use it.
    fn description(&self) -> String;

    /// Parameter object the tool accepts; validated before `call`.
    fn parameters(&self) -> ObjectSpec {
        ObjectSpec::empty()
    }

    fn side_effect(&self) -> SideEffect;

    /// Per-call timeout enforced by the router.
    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    /// Token-bucket key for rate limiting. Tools sharing a key share a
    /// budget.
    fn rate_key(&self) -> String {
        self.name()
    }

    /// Execute with validated parameters.
    async fn call(&self, params: Value) -> Result<ToolOutput, ToolError>;

    fn to_plain_description(&self) -> String {
        format!(
            "- {} | {}\n  {}",
            self.name(),
            self.parameters().describe(),
            self.description()
        )
    }
}
