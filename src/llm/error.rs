use reqwest::Error as ReqwestError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;
use tokio::time::error::Elapsed;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Network request failed: {0}")]
    RequestError(#[from] ReqwestError),

    #[error("Backend API error: HTTP {status}")]
    ApiError { status: u16 },

    #[error("JSON serialization/deserialization error: {0}")]
    SerdeError(#[from] SerdeJsonError),

    #[error("Operation timed out")]
    Timeout(#[from] Elapsed),

    #[error("Failed to load model {0}")]
    ModelLoadFailed(String),

    #[error("Error: {0}")]
    OtherError(String),
}

impl LlmError {
    /// True for timeouts, both tokio-level and reqwest-level.
    pub fn is_timeout(&self) -> bool {
        match self {
            LlmError::Timeout(_) => true,
            LlmError::RequestError(e) => e.is_timeout(),
            _ => false,
        }
    }
}
