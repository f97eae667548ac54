use serde::Serialize;

/// Post-execution check result for a single tool call.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub verified: bool,
    pub issues: Vec<String>,
    pub suggestion: String,
}

impl VerificationResult {
    pub fn ok() -> Self {
        Self {
            verified: true,
            issues: Vec::new(),
            suggestion: String::new(),
        }
    }

    pub fn failed(issue: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self {
            verified: false,
            issues: vec![issue.into()],
            suggestion: suggestion.into(),
        }
    }
}

/// Aggregate over a batch of verifications.
#[derive(Debug, Clone, Serialize)]
pub struct BatchVerification {
    pub all_verified: bool,
    pub total: usize,
    pub verified: usize,
    pub failed: usize,
    pub failures: Vec<FailedAction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedAction {
    pub tool: String,
    pub issues: Vec<String>,
    pub suggestion: String,
}
