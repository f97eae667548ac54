use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::ConfigError;

/// Runtime configuration, read once at startup.
///
/// Settings mirror the YAML layout:
///
/// ```yaml
/// agent:
///   name: taskforge
///   workspace: ./workspace
/// ollama:
///   host: 127.0.0.1
///   port: 11434
///   model: qwen2.5-coder:7b
///   multi_model:
///     models:
///       reasoning: { name: openthinker3-7b }
///       execution: { name: "qwen2.5-coder:7b" }
///       fixer: { name: "deepseek-r1:14b" }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub agent: AgentSettings,
    pub ollama: OllamaSettings,
    #[serde(default)]
    pub security: SecuritySettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub execution_history: HistorySettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentSettings {
    pub name: String,
    pub workspace: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OllamaSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Fallback model when multi-model routing is not configured.
    pub model: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive: String,
    #[serde(default = "default_num_ctx")]
    pub num_ctx: u32,
    #[serde(default = "default_num_predict")]
    pub num_predict: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Per-call timeout in seconds for plain generate calls.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_planning_timeout")]
    pub planning_timeout: u64,
    #[serde(default = "default_execution_timeout")]
    pub execution_timeout: u64,
    #[serde(default)]
    pub multi_model: MultiModelSettings,
    /// Substrings that mark a model name as a reasoning model.
    #[serde(default = "default_reasoning_markers")]
    pub reasoning_markers: Vec<String>,
}

impl OllamaSettings {
    pub fn api_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn is_reasoning_model(&self, model: &str) -> bool {
        let lower = model.to_lowercase();
        self.reasoning_markers.iter().any(|m| lower.contains(m))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MultiModelSettings {
    #[serde(default)]
    pub models: ModelRoles,
    #[serde(default)]
    pub streaming: StreamingSettings,
}

impl Default for MultiModelSettings {
    fn default() -> Self {
        Self {
            models: ModelRoles::default(),
            streaming: StreamingSettings::default(),
        }
    }
}

/// The three logical model roles. Each maps to a concrete backend model.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelRoles {
    pub reasoning: ModelRole,
    pub execution: ModelRole,
    pub fixer: ModelRole,
}

impl Default for ModelRoles {
    fn default() -> Self {
        Self {
            reasoning: ModelRole {
                name: "openthinker3-7b".into(),
            },
            execution: ModelRole {
                name: "qwen2.5-coder:7b".into(),
            },
            fixer: ModelRole {
                name: "deepseek-r1:14b".into(),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelRole {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamingSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub show_thinking: bool,
    #[serde(default = "default_true")]
    pub use_rich_progress: bool,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            show_thinking: false,
            use_rich_progress: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecuritySettings {
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default)]
    pub rate_limits: RateLimitSettings,
    #[serde(default)]
    pub resource_quotas: ResourceQuotas,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            rate_limits: RateLimitSettings::default(),
            resource_quotas: ResourceQuotas::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_rate_limit")]
    pub default_per_minute: u32,
    /// Per-tool overrides, keyed as `<tool>_per_minute`.
    #[serde(flatten)]
    pub per_tool: HashMap<String, u32>,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            default_per_minute: default_rate_limit(),
            per_tool: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceQuotas {
    #[serde(default = "default_max_cpu")]
    pub max_cpu_percent: f32,
    #[serde(default = "default_max_memory")]
    pub max_memory_mb: u64,
    /// Minimum free disk space required, in MB.
    #[serde(default = "default_max_disk")]
    pub max_disk_mb: u64,
}

impl Default for ResourceQuotas {
    fn default() -> Self {
        Self {
            max_cpu_percent: default_max_cpu(),
            max_memory_mb: default_max_memory(),
            max_disk_mb: default_max_disk(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    #[serde(default = "default_max_log_size")]
    pub max_log_size: u64,
    #[serde(default = "default_backup_count")]
    pub backup_count: u32,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_file: default_log_file(),
            max_log_size: default_max_log_size(),
            backup_count: default_backup_count(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistorySettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_history_path")]
    pub db_path: PathBuf,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: default_history_path(),
        }
    }
}

impl Settings {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_yaml::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.name.trim().is_empty() {
            return Err(ConfigError::Invalid("agent.name must not be empty".into()));
        }
        if self.agent.workspace.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "agent.workspace must not be empty".into(),
            ));
        }
        if self.ollama.model.trim().is_empty() {
            return Err(ConfigError::Invalid("ollama.model must not be empty".into()));
        }
        if self.ollama.port == 0 {
            return Err(ConfigError::Invalid("ollama.port must be non-zero".into()));
        }
        url::Url::parse(&self.ollama.api_url())
            .map_err(|e| ConfigError::Invalid(format!("invalid ollama host/port: {e}")))?;
        Ok(())
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    11434
}

fn default_keep_alive() -> String {
    "60m".into()
}

fn default_num_ctx() -> u32 {
    8192
}

fn default_num_predict() -> u32 {
    2048
}

fn default_temperature() -> f32 {
    0.7
}

fn default_timeout() -> u64 {
    120
}

fn default_planning_timeout() -> u64 {
    180
}

fn default_execution_timeout() -> u64 {
    240
}

fn default_reasoning_markers() -> Vec<String> {
    ["openthinker", "deepseek-r1", "qwen-r1", "qwq", "thinking", "reasoning", "r1", "-r-"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_true() -> bool {
    true
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

fn default_rate_limit() -> u32 {
    60
}

fn default_max_cpu() -> f32 {
    90.0
}

fn default_max_memory() -> u64 {
    2048
}

fn default_max_disk() -> u64 {
    10240
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_file() -> PathBuf {
    PathBuf::from("logs/agent.log")
}

fn default_max_log_size() -> u64 {
    10 * 1024 * 1024
}

fn default_backup_count() -> u32 {
    5
}

fn default_history_path() -> PathBuf {
    PathBuf::from("logs/execution_history.db")
}
