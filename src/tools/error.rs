use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Error while running tool: {0}")]
    ExecutionError(Box<dyn std::error::Error + Send + Sync>),

    #[error("Input parsing error: {0}")]
    InputParseError(#[from] serde_json::Error),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Rate limit exceeded for {0}. Please try again later.")]
    RateLimited(String),

    #[error("Resource limit exceeded: {0}")]
    ResourceExhausted(String),

    #[error("missing required parameter `{0}`")]
    MissingParameter(String),

    #[error("invalid parameter `{name}`: expected {expected}")]
    InvalidParameter { name: String, expected: String },

    #[error("Tool {tool} timed out after {after:?}")]
    Timeout { tool: String, after: Duration },

    #[error("handler crashed")]
    HandlerPanicked,
}

impl ToolError {
    pub fn execution_error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ToolError::ExecutionError(Box::new(error))
    }

    pub fn msg(message: impl Into<String>) -> Self {
        ToolError::ExecutionError(message.into().into())
    }
}
