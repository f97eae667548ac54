use std::time::Instant;

use serde_json::json;

use crate::executor::{AttemptResult, SinglePhaseInput};
use crate::recovery::RecoveryContext;
use crate::schemas::{Classification, NewExecution, RoutePlan, ToolOutcome};
use crate::tokens::TokenPhase;

use super::{AgentError, Role, Runtime};

/// What one routed execution produced, before history recording.
struct ChatReport {
    response: String,
    success: bool,
    mode: &'static str,
    model_primary: Option<String>,
    model_plan: Option<String>,
    model_exec: Option<String>,
    tool_outcomes: Vec<ToolOutcome>,
    error_kind: Option<String>,
    error_msg: Option<String>,
}

impl Runtime {
    /// Entry point: classify, gather context, route, execute, verify,
    /// retry, recover, record. Always returns a printable response; user
    /// visible failures start with `Error:`.
    pub async fn chat(&self, user_message: &str) -> String {
        let start = Instant::now();

        self.sessions
            .lock()
            .expect("session store poisoned")
            .add_message(Role::User, user_message);

        let classification = self.classifier.classify(user_message);
        log::info!(
            "Classification: {} - {} (confidence {:.2})",
            classification.tier,
            classification.reasoning,
            classification.confidence
        );

        let swap_before = self.manager.status().await.total_swap_seconds;

        let report = match self.chat_inner(user_message, &classification).await {
            Ok(report) => report,
            Err(e) => self.recover_from(user_message, e).await,
        };

        let swap_seconds = self.manager.status().await.total_swap_seconds - swap_before;
        let tokens = self
            .accountant
            .lock()
            .expect("token accountant poisoned")
            .total() as i64;

        if let Some(history) = &self.history {
            let record = NewExecution {
                request: user_message.to_string(),
                tier: Some(classification.tier.as_str().to_string()),
                intent: None,
                creative: classification.characteristics.creative,
                multi_file: classification.characteristics.multi_file,
                expected_ops: classification.characteristics.expected_ops as i64,
                mode: report.mode.to_string(),
                model_primary: report.model_primary.clone(),
                model_plan: report.model_plan.clone(),
                model_exec: report.model_exec.clone(),
                success: report.success,
                duration_seconds: start.elapsed().as_secs_f64(),
                error_kind: report.error_kind.clone(),
                error_msg: report.error_msg.clone(),
                tool_call_count: report.tool_outcomes.len() as i64,
                swap_seconds,
                tokens,
                session_id: Some(
                    self.sessions
                        .lock()
                        .expect("session store poisoned")
                        .current_session_id()
                        .to_string(),
                ),
            };

            match history.log_execution(&record).await {
                Ok(execution_id) => {
                    for outcome in &report.tool_outcomes {
                        if let Err(e) = history.log_tool_result(execution_id, outcome).await {
                            log::error!("Failed to log tool result: {e}");
                        }
                    }
                }
                Err(e) => log::error!("Failed to log execution: {e}"),
            }
        }

        self.metrics.record_request(report.success);
        self.sessions
            .lock()
            .expect("session store poisoned")
            .add_message(Role::Assistant, &report.response);

        report.response
    }

    async fn chat_inner(
        &self,
        user_message: &str,
        classification: &Classification,
    ) -> Result<ChatReport, AgentError> {
        // Context is gathered bounded and budget-compressed before any
        // model sees it.
        let context = self.gatherer.gather(user_message).await;
        let context_block = {
            let mut accountant = self.accountant.lock().expect("token accountant poisoned");
            accountant.reset();
            let budget = accountant.budget_for(TokenPhase::ContextGathering);
            drop(accountant);

            use crate::context::ContextCompressor as _;
            let compressed = self.compressor.compress(context, budget);
            let block = compressed.format_for_model();

            let mut accountant = self.accountant.lock().expect("token accountant poisoned");
            accountant.track(TokenPhase::ContextGathering, &block);
            block
        };

        let plan = self.model_router.route(classification);

        self.manager
            .ensure_resident(&plan.primary, Some("execution"))
            .await?;

        if plan.two_phase {
            self.run_two_phase(user_message, classification, &plan).await
        } else {
            self.run_single_phase(user_message, classification, &plan, &context_block)
                .await
        }
    }

    /// Shared failure path for both executors: hand the request to the
    /// progressive-retry machine and fold its outcome into a report for
    /// the given execution mode.
    #[allow(clippy::too_many_arguments)]
    async fn retry_after_failure(
        &self,
        user_message: &str,
        classification: &Classification,
        issues: String,
        mode: &'static str,
        model_plan: Option<String>,
        model_exec: Option<String>,
        tool_outcomes: Vec<ToolOutcome>,
        failure_kind: &'static str,
    ) -> ChatReport {
        log::warn!("Execution unverified ({issues}); entering retry");

        let retry_outcome = self
            .retry
            .run(
                user_message,
                Some(&issues),
                Some(classification),
                |prompt, model| async move {
                    let session_context = self
                        .sessions
                        .lock()
                        .expect("session store poisoned")
                        .context_block();
                    let result = self
                        .single_phase
                        .execute(SinglePhaseInput {
                            user_message: &prompt,
                            model: &model,
                            session_context: &session_context,
                            project_rules: None,
                            context_block: "",
                        })
                        .await;

                    match result {
                        Ok(exec) => {
                            let verified =
                                self.verifier.verify_batch(&exec.tool_outcomes).all_verified;
                            AttemptResult {
                                success: exec.success && verified,
                                response: exec.response,
                                error: if exec.success && verified {
                                    None
                                } else {
                                    Some("verification failed".into())
                                },
                            }
                        }
                        Err(e) => AttemptResult {
                            success: false,
                            response: String::new(),
                            error: Some(e.to_string()),
                        },
                    }
                },
            )
            .await;

        let success = retry_outcome.success;
        let response = if success {
            retry_outcome.response
        } else {
            format!("Error: {}", retry_outcome.response)
        };

        ChatReport {
            response,
            success,
            mode,
            model_primary: Some(retry_outcome.final_model),
            model_plan,
            model_exec,
            tool_outcomes,
            error_kind: if success {
                None
            } else {
                Some(failure_kind.into())
            },
            error_msg: if success { None } else { Some(issues) },
        }
    }

    async fn run_single_phase(
        &self,
        user_message: &str,
        classification: &Classification,
        plan: &RoutePlan,
        context_block: &str,
    ) -> Result<ChatReport, AgentError> {
        let session_context = self
            .sessions
            .lock()
            .expect("session store poisoned")
            .context_block();

        let outcome = self
            .single_phase
            .execute(SinglePhaseInput {
                user_message,
                model: &plan.primary,
                session_context: &session_context,
                project_rules: None,
                context_block,
            })
            .await?;

        self.accountant
            .lock()
            .expect("token accountant poisoned")
            .track(TokenPhase::Execution, &outcome.response);

        let batch = self.verifier.verify_batch(&outcome.tool_outcomes);
        if outcome.success && batch.all_verified {
            return Ok(ChatReport {
                response: outcome.response,
                success: true,
                mode: "single-phase",
                model_primary: Some(plan.primary.clone()),
                model_plan: None,
                model_exec: None,
                tool_outcomes: outcome.tool_outcomes,
                error_kind: None,
                error_msg: None,
            });
        }

        // Verification failed or a tool failed: hand the request to the
        // progressive-retry machine.
        let issues = batch
            .failures
            .iter()
            .map(|f| format!("{}: {}", f.tool, f.issues.join(", ")))
            .chain(
                outcome
                    .tool_outcomes
                    .iter()
                    .filter(|o| !o.success)
                    .map(|o| {
                        format!(
                            "{}: {}",
                            o.name,
                            o.error.as_deref().unwrap_or("failed")
                        )
                    }),
            )
            .collect::<Vec<_>>()
            .join("; ");

        Ok(self
            .retry_after_failure(
                user_message,
                classification,
                issues,
                "single-phase",
                None,
                None,
                outcome.tool_outcomes,
                "tool_dispatch_failed",
            )
            .await)
    }

    async fn run_two_phase(
        &self,
        user_message: &str,
        classification: &Classification,
        plan: &RoutePlan,
    ) -> Result<ChatReport, AgentError> {
        let planning_model = plan.planning.clone().unwrap_or_else(|| plan.primary.clone());
        let execution_model = plan
            .execution
            .clone()
            .unwrap_or_else(|| self.model_router.execution_model().to_string());

        let outcome = self
            .two_phase
            .execute(user_message, &planning_model, &execution_model)
            .await;

        {
            let mut accountant = self.accountant.lock().expect("token accountant poisoned");
            accountant.track(TokenPhase::Planning, &outcome.plan);
            accountant.track(TokenPhase::Execution, &outcome.execution_result);
        }

        if !outcome.success {
            // Same escalation ladder as single-phase: a failed phase is
            // just another unverified execution.
            let error = outcome
                .error
                .clone()
                .unwrap_or_else(|| "two-phase execution failed".into());
            let failure_kind = if outcome.execution.is_none() {
                "planning_phase_failed"
            } else {
                "tool_dispatch_failed"
            };
            return Ok(self
                .retry_after_failure(
                    user_message,
                    classification,
                    error,
                    "two-phase",
                    Some(planning_model),
                    Some(execution_model),
                    outcome.tool_outcomes,
                    failure_kind,
                )
                .await);
        }

        let batch = self.verifier.verify_batch(&outcome.tool_outcomes);

        if batch.all_verified {
            let response = format!(
                "TWO-PHASE EXECUTION COMPLETE\n\nPlanning model: {planning_model}\nExecution model: {execution_model}\n\n{}",
                outcome.execution_result
            );
            Ok(ChatReport {
                response,
                success: true,
                mode: "two-phase",
                model_primary: Some(planning_model.clone()),
                model_plan: Some(planning_model),
                model_exec: Some(execution_model),
                tool_outcomes: outcome.tool_outcomes,
                error_kind: None,
                error_msg: None,
            })
        } else {
            let issues = batch
                .failures
                .iter()
                .map(|f| format!("{}: {}", f.tool, f.issues.join(", ")))
                .collect::<Vec<_>>()
                .join("; ");
            Ok(self
                .retry_after_failure(
                    user_message,
                    classification,
                    issues,
                    "two-phase",
                    Some(planning_model),
                    Some(execution_model),
                    outcome.tool_outcomes,
                    "tool_dispatch_failed",
                )
                .await)
        }
    }

    /// Exception path: classify the failure and let the recovery executor
    /// take one shot at it through a single-phase retry callback.
    async fn recover_from(&self, user_message: &str, error: AgentError) -> ChatReport {
        log::error!("Error in chat: {error}");

        let context = RecoveryContext {
            user_message: user_message.to_string(),
            tool_name: None,
            tool_params: json!({}),
        };

        let recovery = self
            .recovery
            .attempt_recovery(&error.to_string(), None, &context, |prompt, _params| {
                let model = self.model_router.execution_model().to_string();
                async move {
                    let result = self
                        .single_phase
                        .execute(SinglePhaseInput {
                            user_message: &prompt,
                            model: &model,
                            session_context: "",
                            project_rules: None,
                            context_block: "",
                        })
                        .await;
                    match result {
                        Ok(exec) if exec.success => Ok(exec.response),
                        Ok(exec) => Err(exec.response),
                        Err(e) => Err(e.to_string()),
                    }
                }
            })
            .await;

        let error_kind = recovery.classification.kind.as_str().to_string();

        if recovery.recovered {
            log::info!("Recovered from {error_kind} via {:?}", recovery.strategy_used);
            return ChatReport {
                response: recovery.result.unwrap_or_default(),
                success: true,
                mode: "single-phase",
                model_primary: Some(self.model_router.execution_model().to_string()),
                model_plan: None,
                model_exec: None,
                tool_outcomes: Vec::new(),
                error_kind: None,
                error_msg: None,
            };
        }

        self.bus.publish(crate::schemas::EventKind::Error {
            message: error.to_string(),
        });

        ChatReport {
            response: format!("Error: {error}"),
            success: false,
            mode: "single-phase",
            model_primary: None,
            model_plan: None,
            model_exec: None,
            tool_outcomes: Vec::new(),
            error_kind: Some(error_kind),
            error_msg: Some(error.to_string()),
        }
    }
}
