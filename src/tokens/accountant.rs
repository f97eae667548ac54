use std::collections::HashMap;
use std::fmt::Write as _;

/// Deterministic token estimate: roughly four bytes per token. Documented
/// approximation, intentionally conservative.
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenPhase {
    ContextGathering,
    Planning,
    Execution,
    Verification,
    SystemPrompt,
}

impl TokenPhase {
    pub const ALL: [TokenPhase; 5] = [
        TokenPhase::ContextGathering,
        TokenPhase::Planning,
        TokenPhase::Execution,
        TokenPhase::Verification,
        TokenPhase::SystemPrompt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPhase::ContextGathering => "context_gathering",
            TokenPhase::Planning => "planning",
            TokenPhase::Execution => "execution",
            TokenPhase::Verification => "verification",
            TokenPhase::SystemPrompt => "system_prompt",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenUsage {
    pub tokens: usize,
    pub remaining: isize,
    pub within_budget: bool,
    pub usage_percent: f64,
}

/// Tracks estimated token usage per pipeline phase against a context
/// window, so prompts for small-context models stay inside their budget.
pub struct TokenAccountant {
    max_tokens: usize,
    usage: HashMap<TokenPhase, usize>,
}

impl TokenAccountant {
    pub const DEFAULT_MAX_TOKENS: usize = 8000;

    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            usage: HashMap::new(),
        }
    }

    /// Record the content assigned to a phase, replacing any prior figure
    /// for that phase.
    pub fn track(&mut self, phase: TokenPhase, content: &str) -> TokenUsage {
        let tokens = estimate_tokens(content);
        self.usage.insert(phase, tokens);

        let total = self.total();
        let within_budget = total < self.max_tokens;
        if !within_budget {
            log::warn!(
                "Context budget exceeded: {total}/{} tokens used",
                self.max_tokens
            );
        }

        TokenUsage {
            tokens,
            remaining: self.max_tokens as isize - total as isize,
            within_budget,
            usage_percent: total as f64 / self.max_tokens as f64 * 100.0,
        }
    }

    pub fn total(&self) -> usize {
        self.usage.values().sum()
    }

    pub fn can_fit(&self, additional_tokens: usize) -> bool {
        self.total() + additional_tokens < self.max_tokens
    }

    /// Recommended budget per phase for an 8K window: 25% gathering, 25%
    /// planning, 31% execution, 12% verification, 6% system prompt.
    pub fn budget_for(&self, phase: TokenPhase) -> usize {
        match phase {
            TokenPhase::ContextGathering => 2000,
            TokenPhase::Planning => 2000,
            TokenPhase::Execution => 2500,
            TokenPhase::Verification => 1000,
            TokenPhase::SystemPrompt => 500,
        }
    }

    pub fn usage_report(&self) -> String {
        let total = self.total();
        let mut report = String::new();
        let _ = writeln!(report, "Token Usage Report");
        let _ = writeln!(report, "==================");
        let _ = writeln!(report, "Max tokens: {}", self.max_tokens);
        let _ = writeln!(
            report,
            "Total used: {total} ({:.1}%)",
            total as f64 / self.max_tokens as f64 * 100.0
        );
        let _ = writeln!(
            report,
            "Remaining:  {}",
            self.max_tokens as isize - total as isize
        );
        let _ = writeln!(report);
        let _ = writeln!(report, "Phase breakdown:");
        for phase in TokenPhase::ALL {
            let _ = writeln!(
                report,
                "  {:<18} {} tokens",
                phase.as_str(),
                self.usage.get(&phase).copied().unwrap_or(0)
            );
        }
        let status = if total < self.max_tokens {
            "within budget"
        } else {
            "OVER BUDGET"
        };
        let _ = writeln!(report, "\nStatus: {status}");
        report
    }

    pub fn reset(&mut self) {
        self.usage.clear();
    }
}

impl Default for TokenAccountant {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_TOKENS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_is_bytes_over_four() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens(&"x".repeat(4000)), 1000);
    }

    #[test]
    fn test_track_accumulates_across_phases() {
        let mut accountant = TokenAccountant::new(100);
        let usage = accountant.track(TokenPhase::Planning, &"a".repeat(200));
        assert_eq!(usage.tokens, 50);
        assert!(usage.within_budget);

        let usage = accountant.track(TokenPhase::Execution, &"b".repeat(240));
        assert_eq!(usage.tokens, 60);
        assert!(!usage.within_budget);
        assert_eq!(usage.remaining, -10);
    }

    #[test]
    fn test_retracking_a_phase_replaces_it() {
        let mut accountant = TokenAccountant::new(1000);
        accountant.track(TokenPhase::Planning, &"a".repeat(400));
        accountant.track(TokenPhase::Planning, &"a".repeat(40));
        assert_eq!(accountant.total(), 10);
    }

    #[test]
    fn test_phase_budgets_sum_to_max() {
        let accountant = TokenAccountant::default();
        let total: usize = TokenPhase::ALL.iter().map(|p| accountant.budget_for(*p)).sum();
        assert_eq!(total, TokenAccountant::DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_reset_clears_usage() {
        let mut accountant = TokenAccountant::default();
        accountant.track(TokenPhase::SystemPrompt, "hello world");
        accountant.reset();
        assert_eq!(accountant.total(), 0);
    }
}
