use std::future::Future;
use std::sync::Arc;

use indoc::formatdoc;

use crate::llm::ModelManager;
use crate::schemas::{Classification, Tier};

pub const MAX_ATTEMPTS: usize = 3;

/// Requests containing any of these escalate to the emergency model after
/// two failures.
const URGENCY_KEYWORDS: &[&str] = &["important", "critical", "urgent", "must", "required"];

/// A prior response at least this long counts as partial progress worth
/// the emergency swap.
const PARTIAL_RESPONSE_THRESHOLD: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Standard,
    Enhanced,
    Debugging,
}

/// What one attempt's execution reported back.
#[derive(Debug, Clone, Default)]
pub struct AttemptResult {
    pub success: bool,
    pub response: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub model: String,
    pub prompt_kind: PromptKind,
    pub success: bool,
    pub response: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RetryOutcome {
    pub success: bool,
    pub response: String,
    pub attempts: Vec<AttemptRecord>,
    pub final_model: String,
    pub escalated: bool,
}

/// Structural retry state machine: standard attempt, enhanced-prompt
/// attempt on the same model (zero swap cost), then an emergency-model
/// attempt gated on criticality.
pub struct ProgressiveRetry {
    manager: Arc<ModelManager>,
    execution_model: String,
    fixer_model: String,
}

impl ProgressiveRetry {
    pub fn new(
        manager: Arc<ModelManager>,
        execution_model: impl Into<String>,
        fixer_model: impl Into<String>,
    ) -> Self {
        Self {
            manager,
            execution_model: execution_model.into(),
            fixer_model: fixer_model.into(),
        }
    }

    /// Drive `execute` through up to [`MAX_ATTEMPTS`] attempts. The
    /// closure receives the prompt to run and the model to run it on.
    pub async fn run<F, Fut>(
        &self,
        task: &str,
        context_summary: Option<&str>,
        classification: Option<&Classification>,
        execute: F,
    ) -> RetryOutcome
    where
        F: Fn(String, String) -> Fut,
        Fut: Future<Output = AttemptResult>,
    {
        let mut attempts: Vec<AttemptRecord> = Vec::new();

        log::info!("Attempt 1: standard execution ({})", self.execution_model);
        let prompt = build_standard_prompt(task, context_summary);
        let result = execute(prompt, self.execution_model.clone()).await;
        attempts.push(record(&self.execution_model, PromptKind::Standard, &result));

        if result.success {
            log::info!("Task succeeded on first attempt");
            return finished(result.response, attempts, &self.execution_model, false);
        }

        log::warn!(
            "Attempt 1 failed: {}",
            result.error.as_deref().unwrap_or("Unknown error")
        );
        log::info!(
            "Attempt 2: enhanced prompt ({}, 0s swap)",
            self.execution_model
        );

        let prompt = build_enhanced_prompt(task, context_summary, &attempts);
        let result = execute(prompt, self.execution_model.clone()).await;
        attempts.push(record(&self.execution_model, PromptKind::Enhanced, &result));

        if result.success {
            log::info!("Task succeeded with enhanced prompt");
            return finished(result.response, attempts, &self.execution_model, false);
        }

        if !is_critical(task, classification, &attempts) {
            log::warn!("Task failed but not critical - giving up");
            return RetryOutcome {
                success: false,
                response: "Max retries exceeded (non-critical task)".into(),
                attempts,
                final_model: self.execution_model.clone(),
                escalated: false,
            };
        }

        log::warn!(
            "Attempt 2 failed - escalating to {} (swap)",
            self.fixer_model
        );
        if let Err(e) = self
            .manager
            .ensure_resident(&self.fixer_model, Some("emergency_retry"))
            .await
        {
            log::error!("Emergency model load failed: {e}");
        }

        let prompt = build_debugging_prompt(task, context_summary, &attempts);
        let result = execute(prompt, self.fixer_model.clone()).await;
        attempts.push(record(&self.fixer_model, PromptKind::Debugging, &result));

        if result.success {
            log::info!("Task succeeded with emergency model");
            finished(result.response, attempts, &self.fixer_model, true)
        } else {
            log::error!("All retry attempts exhausted");
            RetryOutcome {
                success: false,
                response: "All retry attempts failed".into(),
                attempts,
                final_model: self.fixer_model.clone(),
                escalated: true,
            }
        }
    }
}

fn record(model: &str, prompt_kind: PromptKind, result: &AttemptResult) -> AttemptRecord {
    AttemptRecord {
        model: model.to_string(),
        prompt_kind,
        success: result.success,
        response: result.response.clone(),
        error: result.error.clone(),
    }
}

fn finished(
    response: String,
    attempts: Vec<AttemptRecord>,
    final_model: &str,
    escalated: bool,
) -> RetryOutcome {
    RetryOutcome {
        success: true,
        response,
        attempts,
        final_model: final_model.to_string(),
        escalated,
    }
}

fn build_standard_prompt(task: &str, context_summary: Option<&str>) -> String {
    match context_summary {
        Some(summary) => format!("Task: {task}\n\nContext:\n{summary}\n"),
        None => format!("Task: {task}\n\n"),
    }
}

fn build_enhanced_prompt(
    task: &str,
    context_summary: Option<&str>,
    previous: &[AttemptRecord],
) -> String {
    let last_error = previous
        .last()
        .and_then(|a| a.error.as_deref())
        .unwrap_or("Unknown error");

    let context = context_summary
        .map(|s| format!("Context: {s}\n\n"))
        .unwrap_or_default();

    formatdoc! {"
        RETRY ATTEMPT - Previous attempt failed

        Original Task: {task}

        Previous Error: {last_error}

        INSTRUCTIONS:
        1. Carefully analyze why the previous attempt failed
        2. Use a different approach to solve the task
        3. Double-check your work before responding
        4. If the task requires file operations, verify paths exist

        {context}Please retry the task with these improvements:"
    }
}

fn build_debugging_prompt(
    task: &str,
    context_summary: Option<&str>,
    previous: &[AttemptRecord],
) -> String {
    let mut history = String::new();
    for (i, attempt) in previous.iter().enumerate() {
        history.push_str(&format!(
            "\nAttempt {} ({}):\n  Error: {}\n",
            i + 1,
            attempt.model,
            attempt.error.as_deref().unwrap_or("Failed")
        ));
        if !attempt.response.is_empty() {
            let preview: String = attempt.response.chars().take(200).collect();
            history.push_str(&format!("  Response: {preview}...\n"));
        }
    }

    let context = context_summary
        .map(|s| format!("Context: {s}\n\n"))
        .unwrap_or_default();

    formatdoc! {"
        EMERGENCY RETRY - Multiple failures detected

        Original Task: {task}

        FAILURE HISTORY:
        {history}
        DEEP ANALYSIS REQUIRED:
        1. Analyze all previous failure modes
        2. Identify root cause of failures
        3. Design a completely different approach
        4. Consider edge cases and potential issues
        5. Provide detailed reasoning for your solution

        {context}Use your advanced reasoning capabilities to solve this task:"
    }
}

/// The emergency swap is only worth it when the task signals urgency, was
/// classified complex, or a prior attempt showed partial progress.
fn is_critical(
    task: &str,
    classification: Option<&Classification>,
    attempts: &[AttemptRecord],
) -> bool {
    let task_lower = task.to_lowercase();
    if URGENCY_KEYWORDS.iter().any(|kw| task_lower.contains(kw)) {
        log::info!("Task marked as critical (urgency keywords)");
        return true;
    }

    if classification.is_some_and(|c| c.tier == Tier::Complex) {
        log::info!("Task marked as critical (complex tier)");
        return true;
    }

    if attempts
        .iter()
        .any(|a| a.response.len() >= PARTIAL_RESPONSE_THRESHOLD)
    {
        log::info!("Task marked as critical (partial progress detected)");
        return true;
    }

    log::info!("Task not critical - won't escalate to emergency model");
    false
}
