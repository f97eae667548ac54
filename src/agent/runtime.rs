use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::Settings;
use crate::classifier::TaskClassifier;
use crate::context::{ContextGatherer, DefaultCompressor};
use crate::events::EventBus;
use crate::executor::{ProgressiveRetry, SinglePhaseExecutor, TwoPhaseExecutor};
use crate::history::ExecutionHistory;
use crate::llm::{LlmClient, ModelManager};
use crate::metrics::MetricsCollector;
use crate::recovery::RecoveryExecutor;
use crate::routing::ModelRouter;
use crate::tokens::TokenAccountant;
use crate::tools::builtin::register_builtin_tools;
use crate::tools::{RateLimiter, ResourceMonitor, Tool, ToolRegistry, ToolRouter};
use crate::verify::{ActionVerifier, SyntaxChecker};

use super::{AgentError, SessionStore};

/// Messages retained across sessions before pruning kicks in.
const SESSION_MESSAGE_BUDGET: usize = 200;

/// Maximum attempts the recovery executor may spend inside one strategy.
const RECOVERY_MAX_RETRIES: u32 = 3;

/// Owns every subsystem of the agent: event bus, tool registry and
/// router, model manager, executors, verifier, retry and recovery
/// machines, history store and metrics. There is no global mutable state;
/// everything hangs off this value.
pub struct Runtime {
    pub(super) settings: Arc<Settings>,
    pub(super) bus: Arc<EventBus>,
    pub(super) tool_router: Arc<ToolRouter>,
    pub(super) manager: Arc<ModelManager>,
    pub(super) model_router: ModelRouter,
    pub(super) classifier: TaskClassifier,
    pub(super) gatherer: ContextGatherer,
    pub(super) compressor: DefaultCompressor,
    pub(super) verifier: ActionVerifier,
    pub(super) retry: ProgressiveRetry,
    pub(super) recovery: RecoveryExecutor,
    pub(super) history: Option<ExecutionHistory>,
    pub(super) metrics: Arc<MetricsCollector>,
    pub(super) sessions: Mutex<SessionStore>,
    pub(super) accountant: Mutex<TokenAccountant>,
    pub(super) single_phase: SinglePhaseExecutor,
    pub(super) two_phase: TwoPhaseExecutor,
}

impl Runtime {
    pub fn builder(settings: Settings) -> RuntimeBuilder {
        RuntimeBuilder::new(settings)
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn manager(&self) -> &Arc<ModelManager> {
        &self.manager
    }

    pub fn history(&self) -> Option<&ExecutionHistory> {
        self.history.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn export_metrics(&self) -> std::io::Result<std::path::PathBuf> {
        let path = std::path::Path::new("logs/metrics.json").to_path_buf();
        self.metrics.export(&path)?;
        Ok(path)
    }
}

/// Constructs a [`Runtime`] from settings plus optional embedder-provided
/// capabilities (extra tools, a syntax checker).
pub struct RuntimeBuilder {
    settings: Settings,
    extra_tools: Vec<Arc<dyn Tool>>,
    syntax_checker: Option<Box<dyn SyntaxChecker>>,
    in_memory_history: bool,
    sample_resources: bool,
}

impl RuntimeBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            extra_tools: Vec::new(),
            syntax_checker: None,
            in_memory_history: false,
            sample_resources: true,
        }
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.extra_tools.push(tool);
        self
    }

    pub fn with_syntax_checker(mut self, checker: Box<dyn SyntaxChecker>) -> Self {
        self.syntax_checker = Some(checker);
        self
    }

    /// Keep the execution history in memory instead of on disk.
    pub fn with_in_memory_history(mut self) -> Self {
        self.in_memory_history = true;
        self
    }

    /// Skip host resource sampling before tool dispatch.
    pub fn without_resource_sampling(mut self) -> Self {
        self.sample_resources = false;
        self
    }

    pub async fn build(self) -> Result<Runtime, AgentError> {
        let settings = Arc::new(self.settings);

        std::fs::create_dir_all(&settings.agent.workspace)
            .map_err(|e| AgentError::OtherError(format!("cannot create workspace: {e}")))?;
        log::info!("Workspace ready: {}", settings.agent.workspace.display());

        let mut registry = ToolRegistry::new();
        register_builtin_tools(&mut registry, &settings);
        for tool in self.extra_tools {
            registry.register(tool);
        }
        let registry = Arc::new(registry);

        let metrics = Arc::new(MetricsCollector::new());
        let resources = if self.sample_resources {
            ResourceMonitor::new(
                settings.security.resource_quotas.clone(),
                settings.agent.workspace.clone(),
            )
        } else {
            ResourceMonitor::disabled(settings.security.resource_quotas.clone())
        };
        let tool_router = Arc::new(ToolRouter::new(
            registry.clone(),
            RateLimiter::new(&settings.security.rate_limits),
            resources,
            metrics.clone(),
        ));

        let client = LlmClient::new(settings.ollama.api_url());
        let manager = Arc::new(ModelManager::new(
            client,
            settings.ollama.keep_alive.clone(),
            Duration::from_secs(settings.ollama.timeout),
        ));
        log::info!("Backend API: {}", settings.ollama.api_url());

        let model_router = ModelRouter::new(settings.ollama.multi_model.models.clone());
        let bus = Arc::new(EventBus::new());

        let gatherer = ContextGatherer::new(registry.clone(), settings.agent.workspace.clone());

        let mut verifier = ActionVerifier::new(settings.agent.workspace.clone());
        if let Some(checker) = self.syntax_checker {
            verifier = verifier.with_syntax_checker(checker);
        }

        let retry = ProgressiveRetry::new(
            manager.clone(),
            model_router.execution_model(),
            model_router.fixer_model(),
        );
        let recovery =
            RecoveryExecutor::new(settings.agent.workspace.clone(), RECOVERY_MAX_RETRIES);

        let history = if settings.execution_history.enabled {
            let store = if self.in_memory_history {
                ExecutionHistory::in_memory().await?
            } else {
                ExecutionHistory::open(&settings.execution_history.db_path).await?
            };
            Some(store)
        } else {
            None
        };

        let single_phase = SinglePhaseExecutor::new(
            manager.clone(),
            tool_router.clone(),
            bus.clone(),
            settings.clone(),
        );
        let two_phase = TwoPhaseExecutor::new(
            manager.clone(),
            tool_router.clone(),
            bus.clone(),
            settings.clone(),
        );

        log::info!("Agent initialized: {}", settings.agent.name);

        Ok(Runtime {
            settings,
            bus,
            tool_router,
            manager,
            model_router,
            classifier: TaskClassifier::new(),
            gatherer,
            compressor: DefaultCompressor,
            verifier,
            retry,
            recovery,
            history,
            metrics,
            sessions: Mutex::new(SessionStore::new(SESSION_MESSAGE_BUDGET)),
            accountant: Mutex::new(TokenAccountant::default()),
            single_phase,
            two_phase,
        })
    }
}
