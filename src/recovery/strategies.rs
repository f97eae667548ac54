use std::future::Future;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use indoc::formatdoc;
use serde_json::Value;

use super::{ErrorClassification, ErrorClassifier, Strategy};

/// Backoff schedule for rate-limit and network retries, in seconds.
const BACKOFF_SECONDS: &[u64] = &[1, 2, 5, 10];

/// What the failed operation was doing, so a strategy can rebuild it.
#[derive(Debug, Clone, Default)]
pub struct RecoveryContext {
    pub user_message: String,
    pub tool_name: Option<String>,
    pub tool_params: Value,
}

#[derive(Debug, Clone)]
pub struct RecoveryOutcome {
    pub recovered: bool,
    pub result: Option<String>,
    pub classification: ErrorClassification,
    pub strategy_used: Option<Strategy>,
    pub attempts: u32,
}

#[derive(Debug, Clone)]
struct RecoveryAttempt {
    kind: &'static str,
    succeeded: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RecoveryStats {
    pub total_attempts: usize,
    pub successful: usize,
    pub failed: usize,
}

/// Looks up the strategy for a classified error and executes it.
///
/// Strategies are situational: they answer "what do we change before
/// retrying". The structural decision of whether to retry at all belongs
/// to the progressive-retry state machine; the two never recurse into
/// each other. Every strategy except backoff invokes the retry callback
/// exactly once.
pub struct RecoveryExecutor {
    workspace: PathBuf,
    max_retries: u32,
    classifier: ErrorClassifier,
    history: Mutex<Vec<RecoveryAttempt>>,
}

impl RecoveryExecutor {
    pub fn new(workspace: PathBuf, max_retries: u32) -> Self {
        Self {
            workspace,
            max_retries,
            classifier: ErrorClassifier::new(),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Classify `error_message` and run the matching recovery strategy.
    ///
    /// The retry callback receives a (possibly rewritten) prompt and the
    /// original tool params, and reports the retried operation's outcome.
    pub async fn attempt_recovery<F, Fut>(
        &self,
        error_message: &str,
        kind_hint: Option<&str>,
        context: &RecoveryContext,
        retry: F,
    ) -> RecoveryOutcome
    where
        F: Fn(String, Value) -> Fut,
        Fut: Future<Output = Result<String, String>>,
    {
        let classification = self.classifier.classify(error_message, kind_hint);

        if !classification.recoverable {
            log::warn!(
                "Error not recoverable: {}",
                classification.kind.as_str()
            );
            return self.record(RecoveryOutcome {
                recovered: false,
                result: None,
                classification,
                strategy_used: None,
                attempts: 0,
            });
        }

        log::info!("Executing recovery strategy: {}", classification.strategy.as_str());

        let outcome = match classification.strategy {
            Strategy::RepromptWithError => {
                let prompt = formatdoc! {"
                    The previous code had a syntax error:

                    Error: {error}

                    Original code that failed:
                    {code}

                    Please fix the syntax error and provide corrected code.",
                    error = classification.message,
                    code = truncated_content(&context.tool_params, 500),
                };
                self.retry_once(&classification, prompt, context, retry).await
            }
            Strategy::CreateMissingPath => self.create_missing_path(&classification, context, retry).await,
            Strategy::RetrySmallerScope => {
                let prompt = formatdoc! {"
                    The previous request timed out. Let's simplify:

                    Original request: {request}

                    Please complete this task with a simpler, more focused approach. \
                    Break into smaller steps if needed.",
                    request = context.user_message,
                };
                self.retry_once(&classification, prompt, context, retry).await
            }
            Strategy::ExponentialBackoff | Strategy::RetryWithBackoff => {
                self.retry_with_backoff(&classification, context, retry).await
            }
            Strategy::FixJsonFormat => {
                let prompt = formatdoc! {r#"
                    The previous response had invalid JSON:

                    Error: {error}

                    Please provide valid JSON parameters in the correct format:
                    TOOL: tool_name | PARAMS: {{"param": "value"}}

                    Ensure:
                    - Use double quotes for strings
                    - Escape special characters
                    - Use \n for newlines, not literal newlines"#,
                    error = classification.message,
                };
                self.retry_once(&classification, prompt, context, retry).await
            }
            Strategy::RepromptWithSchema => {
                let prompt = formatdoc! {"
                    The previous tool call had invalid parameters:

                    Tool: {tool}
                    Error: {error}

                    Please provide the correct parameters for this tool. \
                    Check the tool description for required parameters.",
                    tool = context.tool_name.as_deref().unwrap_or("unknown"),
                    error = classification.message,
                };
                self.retry_once(&classification, prompt, context, retry).await
            }
            // No in-process handler: model switching is the structural
            // retry machine's job, escalation is the caller's.
            Strategy::SwitchModel | Strategy::Escalate => RecoveryOutcome {
                recovered: false,
                result: None,
                classification,
                strategy_used: None,
                attempts: 0,
            },
        };

        self.record(outcome)
    }

    async fn retry_once<F, Fut>(
        &self,
        classification: &ErrorClassification,
        prompt: String,
        context: &RecoveryContext,
        retry: F,
    ) -> RecoveryOutcome
    where
        F: Fn(String, Value) -> Fut,
        Fut: Future<Output = Result<String, String>>,
    {
        match retry(prompt, context.tool_params.clone()).await {
            Ok(result) => RecoveryOutcome {
                recovered: true,
                result: Some(result),
                classification: classification.clone(),
                strategy_used: Some(classification.strategy),
                attempts: 1,
            },
            Err(e) => {
                log::error!(
                    "Recovery strategy {} failed: {e}",
                    classification.strategy.as_str()
                );
                RecoveryOutcome {
                    recovered: false,
                    result: None,
                    classification: classification.clone(),
                    strategy_used: Some(classification.strategy),
                    attempts: 1,
                }
            }
        }
    }

    async fn create_missing_path<F, Fut>(
        &self,
        classification: &ErrorClassification,
        context: &RecoveryContext,
        retry: F,
    ) -> RecoveryOutcome
    where
        F: Fn(String, Value) -> Fut,
        Fut: Future<Output = Result<String, String>>,
    {
        let Some(path) = context.tool_params.get("path").and_then(Value::as_str) else {
            return RecoveryOutcome {
                recovered: false,
                result: None,
                classification: classification.clone(),
                strategy_used: Some(Strategy::CreateMissingPath),
                attempts: 0,
            };
        };

        let full_path = self.workspace.join(path);
        if let Some(parent) = full_path.parent() {
            if !parent.exists() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    log::error!("Path recovery failed creating {}: {e}", parent.display());
                } else {
                    log::info!("Created directory: {}", parent.display());
                }
            }
        }

        self.retry_once(classification, context.user_message.clone(), context, retry)
            .await
    }

    async fn retry_with_backoff<F, Fut>(
        &self,
        classification: &ErrorClassification,
        context: &RecoveryContext,
        retry: F,
    ) -> RecoveryOutcome
    where
        F: Fn(String, Value) -> Fut,
        Fut: Future<Output = Result<String, String>>,
    {
        let max_attempts = (BACKOFF_SECONDS.len() as u32).min(self.max_retries) as usize;

        for (attempt, wait) in BACKOFF_SECONDS.iter().take(max_attempts).enumerate() {
            log::info!(
                "Waiting {wait}s before retry {}/{max_attempts}",
                attempt + 1
            );
            tokio::time::sleep(Duration::from_secs(*wait)).await;

            match retry(context.user_message.clone(), context.tool_params.clone()).await {
                Ok(result) => {
                    return RecoveryOutcome {
                        recovered: true,
                        result: Some(result),
                        classification: classification.clone(),
                        strategy_used: Some(classification.strategy),
                        attempts: attempt as u32 + 1,
                    }
                }
                Err(e) => {
                    if attempt + 1 == max_attempts {
                        log::error!("Backoff recovery failed after {max_attempts} attempts: {e}");
                    }
                }
            }
        }

        RecoveryOutcome {
            recovered: false,
            result: None,
            classification: classification.clone(),
            strategy_used: Some(classification.strategy),
            attempts: max_attempts as u32,
        }
    }

    fn record(&self, outcome: RecoveryOutcome) -> RecoveryOutcome {
        if outcome.strategy_used.is_some() {
            self.history
                .lock()
                .expect("recovery history poisoned")
                .push(RecoveryAttempt {
                    kind: outcome.classification.kind.as_str(),
                    succeeded: outcome.recovered,
                });
        }
        outcome
    }

    pub fn stats(&self) -> RecoveryStats {
        let history = self.history.lock().expect("recovery history poisoned");
        let successful = history.iter().filter(|a| a.succeeded).count();
        RecoveryStats {
            total_attempts: history.len(),
            successful,
            failed: history.len() - successful,
        }
    }

    pub fn stats_by_kind(&self) -> std::collections::HashMap<&'static str, (usize, usize)> {
        let history = self.history.lock().expect("recovery history poisoned");
        let mut by_kind: std::collections::HashMap<&'static str, (usize, usize)> =
            std::collections::HashMap::new();
        for attempt in history.iter() {
            let entry = by_kind.entry(attempt.kind).or_default();
            entry.0 += 1;
            if attempt.succeeded {
                entry.1 += 1;
            }
        }
        by_kind
    }
}

fn truncated_content(params: &Value, limit: usize) -> String {
    params
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or("")
        .chars()
        .take(limit)
        .collect()
}
