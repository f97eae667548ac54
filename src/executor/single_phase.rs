use std::sync::Arc;
use std::time::{Duration, Instant};

use indoc::formatdoc;

use crate::config::Settings;
use crate::events::EventBus;
use crate::llm::{CallOptions, LlmError, ModelManager};
use crate::parser::ToolCallParser;
use crate::schemas::{EventKind, ExecutionPhase, ToolCall, ToolOutcome};
use crate::tools::ToolRouter;

/// Timeout for the one-shot reasoning-model recovery call.
const RECOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything a single-phase run needs besides the executor's own handles.
pub struct SinglePhaseInput<'a> {
    pub user_message: &'a str,
    pub model: &'a str,
    pub session_context: &'a str,
    pub project_rules: Option<&'a str>,
    pub context_block: &'a str,
}

#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub response: String,
    pub tool_outcomes: Vec<ToolOutcome>,
    pub success: bool,
}

/// One generate → parse → execute round with a single model.
///
/// The model handles reasoning and tool generation in one pass; there is
/// no inner loop. Callers that want retries re-enter through the
/// progressive-retry machine.
pub struct SinglePhaseExecutor {
    manager: Arc<ModelManager>,
    tool_router: Arc<ToolRouter>,
    bus: Arc<EventBus>,
    parser: ToolCallParser,
    settings: Arc<Settings>,
}

impl SinglePhaseExecutor {
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

    pub async fn execute(&self, input: SinglePhaseInput<'_>) -> Result<ExecutionOutcome, LlmError> {
        let start = Instant::now();

        self.bus.publish(EventKind::Status {
            phase: ExecutionPhase::Initializing,
            model: Some(input.model.to_string()),
        });

        let system_prompt = self.build_system_prompt(&input);
        let full_prompt = format!(
            "{system_prompt}\n\nUser: {}\n\nAssistant:",
            input.user_message
        );

        self.bus.publish(EventKind::Status {
            phase: ExecutionPhase::CallingLlm,
            model: Some(input.model.to_string()),
        });

        let ollama = &self.settings.ollama;
        let response = match self
            .manager
            .call(
                input.model,
                &full_prompt,
                CallOptions {
                    temperature: Some(ollama.temperature),
                    num_ctx: Some(ollama.num_ctx),
                    num_predict: Some(ollama.num_predict as i32),
                    timeout: Some(Duration::from_secs(ollama.timeout)),
                },
            )
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.bus.publish(EventKind::Error {
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        for thought in self.parser.extract_thinking(&response) {
            let preview: String = thought.chars().take(300).collect();
            log::info!("[reasoning block]: {preview}");
            self.bus.publish(EventKind::Thinking { chunk: thought });
        }

        let tool_calls = self.parser.parse(&response);

        let outcome = if tool_calls.is_empty() {
            self.handle_no_tool_calls(&input, &response).await
        } else {
            let action_text = self.parser.strip_thinking(&response);
            let prefix = action_text
                .find("TOOL:")
                .map(|pos| action_text[..pos].trim().to_string())
                .filter(|s| !s.is_empty());
            let outcomes = self.dispatch_all(&tool_calls).await;
            let response = render_response(prefix, &outcomes);
            let success = outcomes.iter().all(|o| o.success);
            ExecutionOutcome {
                response,
                tool_outcomes: outcomes,
                success,
            }
        };

        self.bus.publish(EventKind::Complete {
            duration_ms: start.elapsed().as_millis() as u64,
        });

        Ok(outcome)
    }

    async fn dispatch_all(&self, tool_calls: &[ToolCall]) -> Vec<ToolOutcome> {
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

        outcomes
    }

    /// A reasoning model that thought but never acted gets exactly one
    /// follow-up at low temperature asking for tool calls only. If that
    /// still yields nothing, the reasoning summary becomes the response.
    async fn handle_no_tool_calls(
        &self,
        input: &SinglePhaseInput<'_>,
        response: &str,
    ) -> ExecutionOutcome {
        let is_reasoning = self.settings.ollama.is_reasoning_model(input.model);
        let thought_without_acting = is_reasoning
            && response.to_lowercase().contains("<think>")
            && !response.to_uppercase().contains("TOOL:");

        if !thought_without_acting {
            return ExecutionOutcome {
                response: response.to_string(),
                tool_outcomes: Vec::new(),
                success: true,
            };
        }

        log::warn!("Reasoning model produced thinking but no tool calls - attempting recovery");

        let followup = formatdoc! {"
            Request: {request}

            Output the tool call needed to complete this request.
            Format: TOOL: tool_name | PARAMS: {{\"param\": \"value\"}}
            Output only the tool call:",
            request = input.user_message,
        };

        let recovery_response = self
            .manager
            .call(
                input.model,
                &followup,
                CallOptions {
                    temperature: Some(0.1),
                    num_predict: Some(512),
                    timeout: Some(RECOVERY_TIMEOUT),
                    ..Default::default()
                },
            )
            .await
            .unwrap_or_default();

        let recovered_calls = self.parser.parse(&recovery_response);
        if recovered_calls.is_empty() {
            log::warn!("Recovery produced no valid tool calls");
            let summary: String = response.chars().take(500).collect();
            return ExecutionOutcome {
                response: format!(
                    "I analyzed the task but couldn't generate valid tool calls.\n\n\
                     Reasoning summary: {summary}"
                ),
                tool_outcomes: Vec::new(),
                success: true,
            };
        }

        log::info!(
            "Recovery successful - found {} tool calls",
            recovered_calls.len()
        );
        let outcomes = self.dispatch_all(&recovered_calls).await;
        let success = outcomes.iter().all(|o| o.success);
        let response = render_response(
            Some("[Recovered tool execution after reasoning]".to_string()),
            &outcomes,
        );

        ExecutionOutcome {
            response,
            tool_outcomes: outcomes,
            success,
        }
    }

    fn build_system_prompt(&self, input: &SinglePhaseInput<'_>) -> String {
        let reasoning_instructions = if self.settings.ollama.is_reasoning_model(input.model) {
            formatdoc! {"

                REASONING MODEL - IMPORTANT
                You can think step-by-step using <think>...</think> tags, but you MUST \
                also output tool calls.

                Response structure:
                1. <think>Your reasoning here</think> (optional)
                2. TOOL: tool_name | PARAMS: {{\"param\": \"value\"}} (REQUIRED)

                Never output ONLY thinking - always follow with actual TOOL calls.
            "}
        } else {
            String::new()
        };

        let rules_section = input
            .project_rules
            .map(|rules| format!("\nPROJECT-SPECIFIC RULES:\n{rules}\n"))
            .unwrap_or_default();

        formatdoc! {r#"
            You are {name}, an AI assistant with access to various tools.
            You can execute commands, manage files, search information, and more.
            Your workspace is: {workspace}

            {session_context}
            {context_block}
            {rules_section}
            {reasoning_instructions}
            {tools_description}

            TOOL USAGE FORMAT:
            To use a tool, respond EXACTLY in this format:
            TOOL: tool_name | PARAMS: {{"param1": "value1", "param2": "value2"}}

            CRITICAL JSON FORMATTING RULES:
            - Parameters MUST be valid JSON
            - For multi-line strings, use \n for newlines (e.g., "line1\nline2")
            - NEVER use triple quotes in JSON - they are invalid
            - Always escape backslashes and quotes inside strings
            - Use RELATIVE paths (e.g., "my_app/src/main.py")

            You can call multiple tools in one response. After tool execution, you'll see the results.

            FILE WRITING RULES:
            - Use write_file ONLY for creating NEW files - it overwrites completely
            - Use edit_file to modify existing files (append, prepend, replace, replace_once)

            IMPORTANT: Always acknowledge the user's request with a brief conversational response BEFORE tool calls.

            Example:
            User: Create hello.txt with 'Hello World'
            Assistant: I'll create that file for you.
            TOOL: write_file | PARAMS: {{"path": "hello.txt", "content": "Hello World"}}

            Respond helpfully to user requests. Execute tools when needed."#,
            name = self.settings.agent.name,
            workspace = self.settings.agent.workspace.display(),
            session_context = input.session_context,
            context_block = input.context_block,
            rules_section = rules_section,
            reasoning_instructions = reasoning_instructions,
            tools_description = self.tool_router.registry().describe_all(),
        }
    }
}

fn render_response(prefix: Option<String>, outcomes: &[ToolOutcome]) -> String {
    let mut parts = Vec::new();
    if let Some(prefix) = prefix {
        parts.push(prefix);
    }

    for outcome in outcomes {
        parts.push(format!("\n[Executed: {}]", outcome.name));
        if outcome.success {
            if outcome.message.is_empty() {
                parts.push(outcome.output.to_string());
            } else {
                parts.push(outcome.message.clone());
            }
        } else {
            parts.push(format!(
                "Error: {}",
                outcome.error.as_deref().unwrap_or("Unknown error")
            ));
        }
    }

    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crate::config::{RateLimitSettings, ResourceQuotas};
    use crate::metrics::MetricsCollector;
    use crate::schemas::AgentEvent;
    use crate::tools::{
        ObjectSpec, RateLimiter, ResourceMonitor, SideEffect, Tool, ToolError, ToolOutput,
        ToolRegistry,
    };

    use super::*;

    struct StubTool {
        name: &'static str,
        fail: bool,
    }

    #[async_trait]
    impl Tool for StubTool {
        fn name(&self) -> String {
            self.name.into()
        }

        fn description(&self) -> String {
            "stub".into()
        }

        fn parameters(&self) -> ObjectSpec {
            ObjectSpec::empty()
        }

        fn side_effect(&self) -> SideEffect {
            SideEffect::Read
        }

        async fn call(&self, _params: Value) -> Result<ToolOutput, ToolError> {
            if self.fail {
                Err(ToolError::msg("stub failure"))
            } else {
                Ok(ToolOutput::message(format!("{} done", self.name)))
            }
        }
    }

    fn executor_for(server_url: String, model: &str) -> (SinglePhaseExecutor, Arc<EventBus>) {
        let settings = Arc::new(
            crate::config::Settings::from_yaml(&format!(
                r#"
agent:
  name: taskforge
  workspace: ./workspace
ollama:
  model: "{model}"
"#
            ))
            .unwrap(),
        );

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(StubTool {
            name: "alpha",
            fail: false,
        }));
        registry.register(Arc::new(StubTool {
            name: "beta",
            fail: false,
        }));
        registry.register(Arc::new(StubTool {
            name: "broken",
            fail: true,
        }));

        let tool_router = Arc::new(ToolRouter::new(
            Arc::new(registry),
            RateLimiter::new(&RateLimitSettings::default()),
            ResourceMonitor::disabled(ResourceQuotas::default()),
            Arc::new(MetricsCollector::new()),
        ));

        let manager = Arc::new(ModelManager::new(
            crate::llm::LlmClient::new(server_url),
            "60m",
            Duration::from_secs(5),
        ));
        let bus = Arc::new(EventBus::new());

        (
            SinglePhaseExecutor::new(manager, tool_router, bus.clone(), settings),
            bus,
        )
    }

    fn input<'a>(user_message: &'a str, model: &'a str) -> SinglePhaseInput<'a> {
        SinglePhaseInput {
            user_message,
            model,
            session_context: "",
            project_rules: None,
            context_block: "",
        }
    }

    fn collect_labels(bus: &EventBus) -> Vec<&'static str> {
        bus.history(None).iter().map(|e| e.kind.label()).collect()
    }

    async fn mock_response(server: &mut mockito::ServerGuard, body: &str) {
        server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body(
                serde_json::to_string(&json!({"response": body, "done": true})).unwrap(),
            )
            .create_async()
            .await;
    }

    #[tokio::test]
    async fn test_two_tool_calls_emit_ordered_events() {
        let mut server = mockito::Server::new_async().await;
        mock_response(
            &mut server,
            "Working on it.\nTOOL: alpha | PARAMS: {}\nTOOL: beta | PARAMS: {}",
        )
        .await;

        let (executor, bus) = executor_for(server.url(), "qwen2.5-coder:7b");
        let outcome = executor
            .execute(input("run both tools", "qwen2.5-coder:7b"))
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.tool_outcomes.len(), 2);
        assert_eq!(
            collect_labels(&bus),
            vec![
                "status",
                "status",
                "tool_call",
                "tool_result",
                "tool_call",
                "tool_result",
                "complete",
            ]
        );
    }

    #[tokio::test]
    async fn test_response_concatenates_prefix_and_statuses() {
        let mut server = mockito::Server::new_async().await;
        mock_response(&mut server, "Working on it.\nTOOL: alpha | PARAMS: {}").await;

        let (executor, _bus) = executor_for(server.url(), "qwen2.5-coder:7b");
        let outcome = executor
            .execute(input("run alpha", "qwen2.5-coder:7b"))
            .await
            .unwrap();

        assert!(outcome.response.starts_with("Working on it."));
        assert!(outcome.response.contains("[Executed: alpha]"));
        assert!(outcome.response.contains("alpha done"));
    }

    #[tokio::test]
    async fn test_failed_tool_marks_outcome_unsuccessful() {
        let mut server = mockito::Server::new_async().await;
        mock_response(&mut server, "TOOL: broken | PARAMS: {}").await;

        let (executor, _bus) = executor_for(server.url(), "qwen2.5-coder:7b");
        let outcome = executor
            .execute(input("break", "qwen2.5-coder:7b"))
            .await
            .unwrap();

        assert!(!outcome.success);
        assert!(outcome.response.contains("Error:"));
    }

    #[tokio::test]
    async fn test_prose_only_response_passes_through() {
        let mut server = mockito::Server::new_async().await;
        mock_response(&mut server, "Nothing to execute, here is an answer.").await;

        let (executor, bus) = executor_for(server.url(), "qwen2.5-coder:7b");
        let outcome = executor
            .execute(input("just chat", "qwen2.5-coder:7b"))
            .await
            .unwrap();

        assert!(outcome.success);
        assert!(outcome.tool_outcomes.is_empty());
        assert_eq!(outcome.response, "Nothing to execute, here is an answer.");
        assert_eq!(
            collect_labels(&bus),
            vec!["status", "status", "complete"]
        );
    }

    #[tokio::test]
    async fn test_thinking_blocks_become_events() {
        let mut server = mockito::Server::new_async().await;
        mock_response(
            &mut server,
            "<think>planning my move</think>TOOL: alpha | PARAMS: {}",
        )
        .await;

        let (executor, bus) = executor_for(server.url(), "qwen2.5-coder:7b");
        executor
            .execute(input("go", "qwen2.5-coder:7b"))
            .await
            .unwrap();

        let thinking = bus.history(Some("thinking"));
        assert_eq!(thinking.len(), 1);
        match &thinking[0].kind {
            EventKind::Thinking { chunk } => assert_eq!(chunk, "planning my move"),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_reasoning_model_recovery_followup() {
        // Three distinguishable backend calls: the residency warm-up, the
        // first generate (thinking only), and the recovery follow-up.
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .match_body(mockito::Matcher::Regex(r#""prompt":"""#.to_string()))
            .with_status(200)
            .with_body(r#"{"response": "", "done": true}"#)
            .expect(1)
            .create_async()
            .await;
        server
            .mock("POST", "/api/generate")
            .match_body(mockito::Matcher::Regex("User: call alpha".to_string()))
            .with_status(200)
            .with_body(
                serde_json::to_string(
                    &json!({"response": "<think>I should call alpha but I will not</think>", "done": true}),
                )
                .unwrap(),
            )
            .expect(1)
            .create_async()
            .await;
        server
            .mock("POST", "/api/generate")
            .match_body(mockito::Matcher::Regex("Output only the tool call".to_string()))
            .with_status(200)
            .with_body(
                serde_json::to_string(&json!({"response": "TOOL: alpha | PARAMS: {}", "done": true}))
                    .unwrap(),
            )
            .expect(1)
            .create_async()
            .await;

        let (executor, _bus) = executor_for(server.url(), "openthinker3-7b");
        let outcome = executor
            .execute(input("call alpha", "openthinker3-7b"))
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.tool_outcomes.len(), 1);
        assert!(outcome.response.contains("[Recovered tool execution after reasoning]"));
    }

    #[tokio::test]
    async fn test_subscriber_sees_tool_names() {
        let mut server = mockito::Server::new_async().await;
        mock_response(&mut server, "TOOL: alpha | PARAMS: {}").await;

        let (executor, bus) = executor_for(server.url(), "qwen2.5-coder:7b");
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        bus.subscribe(move |event: &AgentEvent| {
            if let EventKind::ToolCall { name, .. } = &event.kind {
                seen_clone.lock().unwrap().push(name.clone());
            }
        });

        executor
            .execute(input("go", "qwen2.5-coder:7b"))
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["alpha".to_string()]);
    }
}
