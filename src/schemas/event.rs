use chrono::{DateTime, Utc};
use serde::Serialize;

/// Pipeline phase reported through [`EventKind::Status`] events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    Initializing,
    CallingLlm,
    TwoPhaseStart,
    Planning,
    Executing,
    EmergencyRetry,
}

impl ExecutionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionPhase::Initializing => "initializing",
            ExecutionPhase::CallingLlm => "calling_llm",
            ExecutionPhase::TwoPhaseStart => "two_phase_start",
            ExecutionPhase::Planning => "planning",
            ExecutionPhase::Executing => "executing",
            ExecutionPhase::EmergencyRetry => "emergency_retry",
        }
    }
}

/// Progress event broadcast through the event bus while a request runs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Status {
        phase: ExecutionPhase,
        model: Option<String>,
    },
    Thinking {
        chunk: String,
    },
    ToolCall {
        name: String,
        index: usize,
        total: usize,
    },
    ToolResult {
        name: String,
        success: bool,
        duration_ms: u64,
    },
    PlanningProgress {
        length: usize,
        preview: String,
    },
    Complete {
        duration_ms: u64,
    },
    Error {
        message: String,
    },
}

impl EventKind {
    /// Stable label used for history filtering.
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Status { .. } => "status",
            EventKind::Thinking { .. } => "thinking",
            EventKind::ToolCall { .. } => "tool_call",
            EventKind::ToolResult { .. } => "tool_result",
            EventKind::PlanningProgress { .. } => "planning_progress",
            EventKind::Complete { .. } => "complete",
            EventKind::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentEvent {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl AgentEvent {
    pub fn now(kind: EventKind) -> Self {
        Self {
            at: Utc::now(),
            kind,
        }
    }
}

impl From<EventKind> for AgentEvent {
    fn from(kind: EventKind) -> Self {
        AgentEvent::now(kind)
    }
}
