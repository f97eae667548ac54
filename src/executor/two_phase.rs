use std::sync::Arc;
use std::time::{Duration, Instant};

use indoc::formatdoc;
use tokio_stream::StreamExt;

use crate::config::Settings;
use crate::events::EventBus;
use crate::llm::{CallOptions, ModelManager};
use crate::parser::ToolCallParser;
use crate::schemas::{EventKind, ExecutionPhase, ToolOutcome};
use crate::tools::ToolRouter;

/// Emit a planning-progress event every this many stream chunks.
const PROGRESS_EVERY_CHUNKS: usize = 10;

#[derive(Debug, Clone)]
pub struct PhaseReport {
    pub model: String,
    pub duration: Duration,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TwoPhaseOutcome {
    pub success: bool,
    pub plan: String,
    pub execution_result: String,
    pub tool_outcomes: Vec<ToolOutcome>,
    pub error: Option<String>,
    pub planning: PhaseReport,
    pub execution: Option<PhaseReport>,
}

/// Plan with a reasoning model, then act with a code model.
///
/// The plan is streamed: chunks are assembled into the full plan text
/// while progress events fan out to subscribers in parallel. A planning
/// failure short-circuits the run; phase two never starts without a plan.
pub struct TwoPhaseExecutor {
    manager: Arc<ModelManager>,
    tool_router: Arc<ToolRouter>,
    bus: Arc<EventBus>,
    parser: ToolCallParser,
    settings: Arc<Settings>,
}

impl TwoPhaseExecutor {
    pub fn new(
        manager: Arc<ModelManager>,
        tool_router: Arc<ToolRouter>,
        bus: Arc<EventBus>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            manager,
            tool_router,
            bus,
            parser: ToolCallParser::new(),
            settings,
        }
    }

    pub async fn execute(
        &self,
        user_message: &str,
        planning_model: &str,
        execution_model: &str,
    ) -> TwoPhaseOutcome {
        log::info!("Two-phase execution starting");
        self.bus.publish(EventKind::Status {
            phase: ExecutionPhase::TwoPhaseStart,
            model: None,
        });

        log::info!("Phase 1: planning with {planning_model}");
        self.bus.publish(EventKind::Status {
            phase: ExecutionPhase::Planning,
            model: Some(planning_model.to_string()),
        });

        let planning = self.planning_phase(user_message, planning_model).await;
        let (plan, planning_report) = match planning {
            Ok((plan, report)) => (plan, report),
            Err(report) => {
                let error = format!(
                    "Planning phase failed: {}",
                    report.error.as_deref().unwrap_or("unknown")
                );
                self.bus.publish(EventKind::Error {
                    message: error.clone(),
                });
                return TwoPhaseOutcome {
                    success: false,
                    plan: String::new(),
                    execution_result: String::new(),
                    tool_outcomes: Vec::new(),
                    error: Some(error),
                    planning: report,
                    execution: None,
                };
            }
        };

        log::info!("Planning complete. Plan length: {} chars", plan.len());

        log::info!("Phase 2: execution with {execution_model}");
        self.bus.publish(EventKind::Status {
            phase: ExecutionPhase::Executing,
            model: Some(execution_model.to_string()),
        });

        let outcome = self
            .execution_phase(user_message, &plan, execution_model)
            .await;

        match outcome {
            Ok((result, outcomes, report)) => {
                let success = report.success;
                if success {
                    log::info!("Two-phase execution completed successfully");
                    self.bus.publish(EventKind::Complete {
                        duration_ms: (planning_report.duration + report.duration).as_millis()
                            as u64,
                    });
                } else {
                    self.bus.publish(EventKind::Error {
                        message: report
                            .error
                            .clone()
                            .unwrap_or_else(|| "execution phase failed".into()),
                    });
                }
                TwoPhaseOutcome {
                    success,
                    plan,
                    execution_result: result,
                    tool_outcomes: outcomes,
                    error: if success { None } else { report.error.clone() },
                    planning: planning_report,
                    execution: Some(report),
                }
            }
            Err(report) => {
                let error = format!(
                    "Execution phase failed: {}",
                    report.error.as_deref().unwrap_or("unknown")
                );
                self.bus.publish(EventKind::Error {
                    message: error.clone(),
                });
                TwoPhaseOutcome {
                    success: false,
                    plan,
                    execution_result: String::new(),
                    tool_outcomes: Vec::new(),
                    error: Some(error),
                    planning: planning_report,
                    execution: Some(report),
                }
            }
        }
    }

    /// Stream the plan from the reasoning model, publishing progress as
    /// chunks arrive.
    async fn planning_phase(
        &self,
        user_message: &str,
        planning_model: &str,
    ) -> Result<(String, PhaseReport), PhaseReport> {
        let prompt = formatdoc! {"
            You are an expert software architect and creative designer.

            User request: {user_message}

            Create a DETAILED implementation plan. Include:

            1. **File Structure**: What files to create and their purpose
            2. **Content Design**: Specific content, styling approaches, color schemes
            3. **Implementation Details**: Key features, code structure, best practices

            Be specific and creative. Provide actual content ideas, not placeholders.

            Format your response as a clear, structured plan:"
        };

        let start = Instant::now();
        let timeout = Duration::from_secs(self.settings.ollama.planning_timeout);
        let options = CallOptions {
            temperature: Some(0.8),
            num_predict: Some(1024),
            num_ctx: Some(8192),
            timeout: Some(timeout),
        };

        let mut stream = match self
            .manager
            .call_stream(planning_model, &prompt, options)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                log::error!("Planning phase error: {e}");
                return Err(PhaseReport {
                    model: planning_model.to_string(),
                    duration: start.elapsed(),
                    success: false,
                    error: Some(e.to_string()),
                });
            }
        };

        let mut plan = String::new();
        let mut chunk_count = 0usize;

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(chunk) => {
                    plan.push_str(&chunk.response);
                    chunk_count += 1;
                    if chunk_count % PROGRESS_EVERY_CHUNKS == 0 {
                        let preview: String = plan
                            .chars()
                            .rev()
                            .take(100)
                            .collect::<Vec<_>>()
                            .into_iter()
                            .rev()
                            .collect();
                        self.bus.publish(EventKind::PlanningProgress {
                            length: plan.len(),
                            preview,
                        });
                    }
                }
                Err(e) => {
                    log::error!("Planning stream error: {e}");
                    return Err(PhaseReport {
                        model: planning_model.to_string(),
                        duration: start.elapsed(),
                        success: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let plan = self.parser.strip_thinking(&plan);

        Ok((
            plan,
            PhaseReport {
                model: planning_model.to_string(),
                duration: start.elapsed(),
                success: true,
                error: None,
            },
        ))
    }

    /// Feed the full plan to the code model and dispatch what it emits.
    async fn execution_phase(
        &self,
        original_request: &str,
        plan: &str,
        execution_model: &str,
    ) -> Result<(String, Vec<ToolOutcome>, PhaseReport), PhaseReport> {
        let prompt = formatdoc! {r#"
            Task: {original_request}

            Plan to implement:
            {plan}

            Generate file creation tool calls in this format:
            TOOL: write_file | PARAMS: {{"path": "filename.ext", "content": "actual code here"}}

            Output tool calls only:"#
        };

        let start = Instant::now();
        let ollama = &self.settings.ollama;
        let options = CallOptions {
            temperature: Some(0.3),
            num_predict: Some(ollama.num_predict as i32),
            num_ctx: Some(ollama.num_ctx),
            timeout: Some(Duration::from_secs(ollama.execution_timeout)),
        };

        let response = match self.manager.call(execution_model, &prompt, options).await {
            Ok(response) => response,
            Err(e) => {
                log::error!("Execution phase error: {e}");
                return Err(PhaseReport {
                    model: execution_model.to_string(),
                    duration: start.elapsed(),
                    success: false,
                    error: Some(e.to_string()),
                });
            }
        };

        let tool_calls = self.parser.parse(&response);
        if tool_calls.is_empty() {
            return Err(PhaseReport {
                model: execution_model.to_string(),
                duration: start.elapsed(),
                success: false,
                error: Some("No tool calls generated".into()),
            });
        }

        log::info!("Executing {} tool calls from plan", tool_calls.len());

        let total = tool_calls.len();
        let mut outcomes = Vec::with_capacity(total);
        for (index, call) in tool_calls.iter().enumerate() {
            self.bus.publish(EventKind::ToolCall {
                name: call.name.clone(),
                index,
                total,
            });
            let outcome = self.tool_router.dispatch(call).await;
            self.bus.publish(EventKind::ToolResult {
                name: call.name.clone(),
                success: outcome.success,
                duration_ms: outcome.duration.as_millis() as u64,
            });
            outcomes.push(outcome);
        }

        let succeeded = outcomes.iter().filter(|o| o.success).count();
        let result = format!("Executed {succeeded}/{total} tool calls successfully");

        Ok((
            result,
            outcomes,
            PhaseReport {
                model: execution_model.to_string(),
                duration: start.elapsed(),
                // Partial tool-call failure fails the phase.
                success: succeeded == total,
                error: if succeeded == total {
                    None
                } else {
                    Some(format!("{}/{total} tool calls failed", total - succeeded))
                },
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crate::config::{RateLimitSettings, ResourceQuotas, Settings};
    use crate::llm::LlmClient;
    use crate::metrics::MetricsCollector;
    use crate::tools::{
        ObjectSpec, RateLimiter, ResourceMonitor, SideEffect, Tool, ToolError, ToolOutput,
        ToolRegistry,
    };

    use super::*;

    struct Recorder;

    #[async_trait]
    impl Tool for Recorder {
        fn name(&self) -> String {
            "write_file".into()
        }

        fn description(&self) -> String {
            "records calls".into()
        }

        fn parameters(&self) -> ObjectSpec {
            ObjectSpec::empty()
        }

        fn side_effect(&self) -> SideEffect {
            SideEffect::Write
        }

        async fn call(&self, params: Value) -> Result<ToolOutput, ToolError> {
            let path = params["path"].as_str().unwrap_or("?");
            Ok(ToolOutput::message(format!("wrote {path}")))
        }
    }

    fn executor_for(server_url: String) -> (TwoPhaseExecutor, Arc<EventBus>) {
        let settings = Arc::new(
            Settings::from_yaml(
                r#"
agent:
  name: taskforge
  workspace: ./workspace
ollama:
  model: "qwen2.5-coder:7b"
"#,
            )
            .unwrap(),
        );

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Recorder));

        let tool_router = Arc::new(ToolRouter::new(
            Arc::new(registry),
            RateLimiter::new(&RateLimitSettings::default()),
            ResourceMonitor::disabled(ResourceQuotas::default()),
            Arc::new(MetricsCollector::new()),
        ));
        let manager = Arc::new(ModelManager::new(
            LlmClient::new(server_url),
            "60m",
            Duration::from_secs(5),
        ));
        let bus = Arc::new(EventBus::new());

        (
            TwoPhaseExecutor::new(manager, tool_router, bus.clone(), settings),
            bus,
        )
    }

    fn ndjson_plan(chunks: &[&str]) -> String {
        let mut body = String::new();
        for chunk in chunks {
            body.push_str(
                &serde_json::to_string(&json!({"response": chunk, "done": false})).unwrap(),
            );
            body.push('\n');
        }
        body.push_str(&serde_json::to_string(&json!({"response": "", "done": true})).unwrap());
        body.push('\n');
        body
    }

    #[tokio::test]
    async fn test_successful_two_phase_run() {
        let mut server = mockito::Server::new_async().await;
        // Residency warm-ups for both models.
        server
            .mock("POST", "/api/generate")
            .match_body(mockito::Matcher::Regex(r#""prompt":"""#.to_string()))
            .with_status(200)
            .with_body(r#"{"response": "", "done": true}"#)
            .expect(2)
            .create_async()
            .await;
        // Streaming planning call.
        server
            .mock("POST", "/api/generate")
            .match_body(mockito::Matcher::Regex("software architect".to_string()))
            .with_status(200)
            .with_body(ndjson_plan(&["1. index.html\n", "2. styles.css\n", "3. script.js\n"]))
            .create_async()
            .await;
        // Execution call.
        server
            .mock("POST", "/api/generate")
            .match_body(mockito::Matcher::Regex("Plan to implement".to_string()))
            .with_status(200)
            .with_body(
                serde_json::to_string(&json!({
                    "response": concat!(
                        "TOOL: write_file | PARAMS: {\"path\": \"index.html\", \"content\": \"<html>\"}\n",
                        "TOOL: write_file | PARAMS: {\"path\": \"styles.css\", \"content\": \"body {}\"}\n",
                        "TOOL: write_file | PARAMS: {\"path\": \"script.js\", \"content\": \"//\"}\n",
                    ),
                    "done": true
                }))
                .unwrap(),
            )
            .create_async()
            .await;

        let (executor, bus) = executor_for(server.url());
        let outcome = executor
            .execute("design a landing page", "openthinker3-7b", "qwen2.5-coder:7b")
            .await;

        assert!(outcome.success, "error: {:?}", outcome.error);
        assert!(outcome.plan.contains("index.html"));
        assert_eq!(outcome.tool_outcomes.len(), 3);
        assert_eq!(outcome.execution_result, "Executed 3/3 tool calls successfully");
        assert!(outcome.planning.success);
        assert!(outcome.execution.as_ref().unwrap().success);

        let labels: Vec<&str> = bus.history(None).iter().map(|e| e.kind.label()).collect();
        assert_eq!(labels[0], "status"); // two_phase_start
        assert_eq!(labels[1], "status"); // planning
        assert!(labels.contains(&"complete"));
    }

    #[tokio::test]
    async fn test_planning_failure_skips_execution() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .with_status(500)
            .create_async()
            .await;

        let (executor, _bus) = executor_for(server.url());
        let outcome = executor
            .execute("design something", "openthinker3-7b", "qwen2.5-coder:7b")
            .await;

        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap().starts_with("Planning phase failed"));
        assert!(outcome.execution.is_none());
        assert!(outcome.tool_outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_no_tool_calls_fails_execution_phase() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .match_body(mockito::Matcher::Regex(r#""prompt":"""#.to_string()))
            .with_status(200)
            .with_body(r#"{"response": "", "done": true}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/api/generate")
            .match_body(mockito::Matcher::Regex("software architect".to_string()))
            .with_status(200)
            .with_body(ndjson_plan(&["a plan with no actionable steps"]))
            .create_async()
            .await;
        server
            .mock("POST", "/api/generate")
            .match_body(mockito::Matcher::Regex("Plan to implement".to_string()))
            .with_status(200)
            .with_body(r#"{"response": "I cannot do that.", "done": true}"#)
            .create_async()
            .await;

        let (executor, _bus) = executor_for(server.url());
        let outcome = executor
            .execute("design something", "openthinker3-7b", "qwen2.5-coder:7b")
            .await;

        assert!(!outcome.success);
        assert!(outcome
            .error
            .as_deref()
            .unwrap()
            .contains("No tool calls generated"));
        assert!(!outcome.plan.is_empty());
    }

    #[tokio::test]
    async fn test_think_blocks_are_stripped_from_plan() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .match_body(mockito::Matcher::Regex(r#""prompt":"""#.to_string()))
            .with_status(200)
            .with_body(r#"{"response": "", "done": true}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/api/generate")
            .match_body(mockito::Matcher::Regex("software architect".to_string()))
            .with_status(200)
            .with_body(ndjson_plan(&["<think>musing", " about it</think>", "Step 1: do it"]))
            .create_async()
            .await;
        server
            .mock("POST", "/api/generate")
            .match_body(mockito::Matcher::Regex("Plan to implement".to_string()))
            .with_status(200)
            .with_body(
                serde_json::to_string(&json!({
                    "response": "TOOL: write_file | PARAMS: {\"path\": \"a.txt\", \"content\": \"x\"}",
                    "done": true
                }))
                .unwrap(),
            )
            .create_async()
            .await;

        let (executor, _bus) = executor_for(server.url());
        let outcome = executor
            .execute("design", "openthinker3-7b", "qwen2.5-coder:7b")
            .await;

        assert_eq!(outcome.plan, "Step 1: do it");
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn test_planning_progress_events_are_published() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .match_body(mockito::Matcher::Regex(r#""prompt":"""#.to_string()))
            .with_status(200)
            .with_body(r#"{"response": "", "done": true}"#)
            .create_async()
            .await;
        let chunks: Vec<String> = (0..25).map(|i| format!("chunk {i} ")).collect();
        let chunk_refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
        server
            .mock("POST", "/api/generate")
            .match_body(mockito::Matcher::Regex("software architect".to_string()))
            .with_status(200)
            .with_body(ndjson_plan(&chunk_refs))
            .create_async()
            .await;
        server
            .mock("POST", "/api/generate")
            .match_body(mockito::Matcher::Regex("Plan to implement".to_string()))
            .with_status(200)
            .with_body(
                serde_json::to_string(&json!({
                    "response": "TOOL: write_file | PARAMS: {\"path\": \"a\", \"content\": \"b\"}",
                    "done": true
                }))
                .unwrap(),
            )
            .create_async()
            .await;

        let (executor, bus) = executor_for(server.url());
        executor
            .execute("design", "openthinker3-7b", "qwen2.5-coder:7b")
            .await;

        // 26 chunks (25 content + final) => progress at chunks 10 and 20.
        let progress = bus.history(Some("planning_progress"));
        assert_eq!(progress.len(), 2);
    }
}
