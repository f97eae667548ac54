use std::fmt::{self, Display};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A structured instruction extracted from model output, telling the agent
/// to invoke a named tool with JSON parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub params: Value,
    /// Byte offset of the `TOOL:` header in the model output this call was
    /// parsed from. Zero for synthesized calls.
    #[serde(default)]
    pub origin: usize,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, params: Value) -> Self {
        Self {
            name: name.into(),
            params,
            origin: 0,
        }
    }

    pub fn with_origin(mut self, origin: usize) -> Self {
        self.origin = origin;
        self
    }
}

impl Display for ToolCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TOOL: {} | PARAMS: {}", self.name, self.params)
    }
}

/// Result of dispatching one [`ToolCall`] through the tool router.
///
/// `output` carries tool-specific fields and is copied verbatim into the
/// execution record as a JSON blob.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutcome {
    pub name: String,
    pub params: Value,
    pub success: bool,
    pub message: String,
    pub output: Value,
    pub error: Option<String>,
    #[serde(skip)]
    pub duration: Duration,
}

impl ToolOutcome {
    pub fn success(name: impl Into<String>, params: Value, message: impl Into<String>, output: Value) -> Self {
        Self {
            name: name.into(),
            params,
            success: true,
            message: message.into(),
            output,
            error: None,
            duration: Duration::ZERO,
        }
    }

    pub fn failure(name: impl Into<String>, params: Value, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            name: name.into(),
            params,
            success: false,
            message: String::new(),
            output: Value::Null,
            error: Some(error),
            duration: Duration::ZERO,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_display_matches_wire_format() {
        let call = ToolCall::new("write_file", json!({"path": "a.txt"}));
        assert_eq!(
            call.to_string(),
            r#"TOOL: write_file | PARAMS: {"path":"a.txt"}"#
        );
    }
}
