use thiserror::Error;

use crate::config::ConfigError;
use crate::history::HistoryError;
use crate::llm::LlmError;
use crate::tools::ToolError;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    LlmError(#[from] LlmError),

    #[error("Tool error: {0}")]
    ToolError(#[from] ToolError),

    #[error("History error: {0}")]
    HistoryError(#[from] HistoryError),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Serde json error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    #[error("Error: {0}")]
    OtherError(String),
}
