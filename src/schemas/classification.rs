use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Coarse complexity bucket driving model routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Simple,
    Standard,
    Complex,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Simple => "simple",
            Tier::Standard => "standard",
            Tier::Complex => "complex",
        }
    }
}

impl Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the request should be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStrategy {
    /// One pass with the execution model only; no swap overhead.
    ExecutorOnly,
    /// Plan with the reasoning model, then execute with the code model.
    PlanThenExecute,
}

impl RouteStrategy {
    /// Execution-mode label as recorded in the history store.
    pub fn mode(&self) -> &'static str {
        match self {
            RouteStrategy::ExecutorOnly => "single-phase",
            RouteStrategy::PlanThenExecute => "two-phase",
        }
    }
}

/// Request traits derived from keyword and regex probes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Characteristics {
    pub multi_file: bool,
    pub creative: bool,
    pub file_count: u32,
    pub expected_ops: u32,
}

/// Output of the task classifier. Fully deterministic for a given request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub tier: Tier,
    pub route: RouteStrategy,
    /// Predicted model swap cost in seconds for the chosen route.
    pub estimated_swap_seconds: f64,
    pub confidence: f64,
    pub reasoning: String,
    pub characteristics: Characteristics,
}

/// Model selection derived from a [`Classification`].
#[derive(Debug, Clone, PartialEq)]
pub struct RoutePlan {
    pub two_phase: bool,
    pub primary: String,
    pub planning: Option<String>,
    pub execution: Option<String>,
}
