use crate::config::ModelRoles;
use crate::schemas::{Classification, RoutePlan, Tier};

/// Translates a classification into concrete model selection.
///
/// Strategy: keep the execution model resident for the bulk of requests
/// (zero swap overhead) and only bring in the reasoning model for work
/// that benefits from an explicit planning pass.
#[derive(Debug, Clone)]
pub struct ModelRouter {
    roles: ModelRoles,
}

impl ModelRouter {
    pub fn new(roles: ModelRoles) -> Self {
        Self { roles }
    }

    /// Two-phase iff the tier is complex, or the tier is standard with
    /// both creative wording and multi-file scope.
    pub fn route(&self, classification: &Classification) -> RoutePlan {
        let ch = &classification.characteristics;
        let two_phase = match classification.tier {
            Tier::Complex => true,
            Tier::Standard => ch.creative && ch.multi_file,
            Tier::Simple => false,
        };

        if two_phase {
            log::info!(
                "[{}] two-phase execution: {} (plan) -> {} (execute)",
                classification.tier,
                self.roles.reasoning.name,
                self.roles.execution.name
            );
            RoutePlan {
                two_phase: true,
                primary: self.roles.reasoning.name.clone(),
                planning: Some(self.roles.reasoning.name.clone()),
                execution: Some(self.roles.execution.name.clone()),
            }
        } else {
            log::info!(
                "[{}] single-phase execution: {} (0s swap overhead)",
                classification.tier,
                self.roles.execution.name
            );
            RoutePlan {
                two_phase: false,
                primary: self.roles.execution.name.clone(),
                planning: None,
                execution: None,
            }
        }
    }

    pub fn planning_model(&self) -> &str {
        &self.roles.reasoning.name
    }

    pub fn execution_model(&self) -> &str {
        &self.roles.execution.name
    }

    /// Emergency model for the final retry escalation.
    pub fn fixer_model(&self) -> &str {
        &self.roles.fixer.name
    }
}
