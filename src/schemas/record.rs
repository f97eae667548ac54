use serde::{Deserialize, Serialize};

/// One row of the `executions` table. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: i64,
    /// RFC 3339 timestamp of insertion.
    pub ts: String,
    pub request: String,
    pub tier: Option<String>,
    pub intent: Option<String>,
    pub creative: bool,
    pub multi_file: bool,
    pub expected_ops: i64,
    /// `single-phase` or `two-phase`.
    pub mode: String,
    pub model_primary: Option<String>,
    pub model_plan: Option<String>,
    pub model_exec: Option<String>,
    pub success: bool,
    pub duration_seconds: f64,
    pub error_kind: Option<String>,
    pub error_msg: Option<String>,
    pub tool_call_count: i64,
    pub swap_seconds: f64,
    pub tokens: i64,
    pub session_id: Option<String>,
    pub agent_version: Option<String>,
}

/// Insert payload for [`ExecutionRecord`]; the store assigns id and
/// timestamp.
#[derive(Debug, Clone, Default)]
pub struct NewExecution {
    pub request: String,
    pub tier: Option<String>,
    pub intent: Option<String>,
    pub creative: bool,
    pub multi_file: bool,
    pub expected_ops: i64,
    pub mode: String,
    pub model_primary: Option<String>,
    pub model_plan: Option<String>,
    pub model_exec: Option<String>,
    pub success: bool,
    pub duration_seconds: f64,
    pub error_kind: Option<String>,
    pub error_msg: Option<String>,
    pub tool_call_count: i64,
    pub swap_seconds: f64,
    pub tokens: i64,
    pub session_id: Option<String>,
}

/// One row of the `tool_results` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultRow {
    pub id: i64,
    pub execution_id: i64,
    pub name: String,
    pub params_json: Option<String>,
    pub success: bool,
    pub duration_seconds: f64,
    pub error_msg: Option<String>,
    pub ts: String,
}
