use regex::Regex;

use crate::schemas::{Characteristics, Classification, RouteStrategy, Tier};

use super::patterns::*;

/// Swap cost assumed for a plan-then-execute route, in seconds. Matches the
/// measured disk-to-VRAM load time of a 7B model on consumer hardware.
const TWO_PHASE_SWAP_ESTIMATE: f64 = 2.5;

/// Classifies a request into a tier and route strategy.
///
/// Pure function over the request text: same input, same output. The goal
/// is to keep the bulk of traffic on the resident execution model and only
/// pay the planning-model swap when the task genuinely needs it.
pub struct TaskClassifier {
    multi_file: Vec<Regex>,
    explicit_file_count: Regex,
}

impl TaskClassifier {
    pub fn new() -> Self {
        Self {
            multi_file: MULTI_FILE_PATTERNS
                .iter()
                .map(|p| Regex::new(p).expect("multi-file pattern"))
                .collect(),
            explicit_file_count: Regex::new(r"\b(\d+)\s+files?\b").expect("file count pattern"),
        }
    }

    pub fn classify(&self, request: &str) -> Classification {
        let message = request.to_lowercase();

        let multi_file = self.check_multi_file(&message);
        let creative = CREATIVE_KEYWORDS.iter().any(|kw| message.contains(kw));
        let file_count = self.estimate_file_count(&message, multi_file);
        let expected_ops = estimate_operations(&message, file_count);

        let characteristics = Characteristics {
            multi_file,
            creative,
            file_count,
            expected_ops,
        };

        let tier = classify_tier(&message, &characteristics);
        let route = match tier {
            Tier::Complex => RouteStrategy::PlanThenExecute,
            _ => RouteStrategy::ExecutorOnly,
        };
        let estimated_swap_seconds = match route {
            RouteStrategy::PlanThenExecute => TWO_PHASE_SWAP_ESTIMATE,
            RouteStrategy::ExecutorOnly => 0.0,
        };

        Classification {
            tier,
            route,
            estimated_swap_seconds,
            confidence: confidence(&message, tier),
            reasoning: build_reasoning(tier, &characteristics),
            characteristics,
        }
    }

    fn check_multi_file(&self, message: &str) -> bool {
        if self.multi_file.iter().any(|re| re.is_match(message)) {
            return true;
        }
        extension_mentions(message) >= 2
    }

    fn estimate_file_count(&self, message: &str, multi_file: bool) -> u32 {
        if let Some(caps) = self.explicit_file_count.captures(message) {
            if let Ok(count) = caps[1].parse::<u32>() {
                return count;
            }
        }

        // "an application" implies a handful of files even when none are
        // named explicitly.
        if message.contains("application") || message.contains("app") {
            3
        } else if multi_file {
            2
        } else {
            1
        }
    }
}

impl Default for TaskClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn extension_mentions(message: &str) -> usize {
    FILE_EXTENSIONS
        .iter()
        .filter(|ext| message.contains(*ext))
        .count()
}

fn estimate_operations(message: &str, file_count: u32) -> u32 {
    let mut op_count = OPERATION_KEYWORDS
        .iter()
        .filter(|kw| message.contains(*kw))
        .count() as u32;

    // Build/create tasks with a named deliverable are never single-step.
    let builds = message.contains("build") || message.contains("create");
    let deliverable = ["component", "module", "system", "page"]
        .iter()
        .any(|kw| message.contains(kw));
    if builds && deliverable {
        op_count = op_count.max(2);
    }

    op_count.max(file_count)
}

/// First match wins; complex probes run before standard, standard before
/// simple, so an ambiguous request lands on the stronger tier.
fn classify_tier(message: &str, ch: &Characteristics) -> Tier {
    if COMPLEX_PATTERNS.iter().any(|p| message.contains(p)) {
        return Tier::Complex;
    }
    if COMPLEX_KEYWORDS.iter().any(|kw| message.contains(kw)) {
        return Tier::Complex;
    }
    if ch.multi_file && ch.creative {
        return Tier::Complex;
    }
    if ch.file_count >= 4 {
        return Tier::Complex;
    }
    if ch.expected_ops >= 5 {
        return Tier::Complex;
    }

    if STANDARD_PATTERNS.iter().any(|p| message.contains(p)) {
        return Tier::Standard;
    }
    if STANDARD_KEYWORDS.iter().any(|kw| message.contains(kw)) {
        return Tier::Standard;
    }
    if ch.multi_file {
        return Tier::Standard;
    }
    if ch.expected_ops >= 3 {
        return Tier::Standard;
    }

    if SIMPLE_PATTERNS.iter().any(|p| message.contains(p)) {
        return Tier::Simple;
    }
    if SIMPLE_KEYWORDS.iter().any(|kw| message.contains(kw)) {
        return Tier::Simple;
    }
    if ch.expected_ops <= 1 {
        return Tier::Simple;
    }

    Tier::Standard
}

fn confidence(message: &str, tier: Tier) -> f64 {
    let word_count = message.split_whitespace().count();
    let base = if word_count < 5 {
        0.7
    } else if word_count < 10 {
        0.85
    } else {
        0.95
    };

    // Complex requests carry strong keywords; short simple requests are
    // the ambiguous ones.
    match tier {
        Tier::Complex => (base + 0.05_f64).min(1.0),
        Tier::Simple => (base - 0.05_f64).max(0.6),
        Tier::Standard => base,
    }
}

fn build_reasoning(tier: Tier, ch: &Characteristics) -> String {
    let mut reasons: Vec<String> = Vec::new();

    match tier {
        Tier::Simple => {
            reasons.push("Single straightforward operation".into());
            if ch.file_count <= 1 {
                reasons.push("involves one file".into());
            }
            if !ch.creative {
                reasons.push("no creative thinking needed".into());
            }
        }
        Tier::Standard => {
            reasons.push("Multi-step but well-defined task".into());
            if ch.file_count <= 2 {
                reasons.push(format!("involves {} file(s)", ch.file_count));
            }
            if ch.expected_ops <= 4 {
                reasons.push(format!("~{} operations", ch.expected_ops));
            }
        }
        Tier::Complex => {
            if ch.multi_file && ch.creative {
                reasons.push("Multi-file creative project".into());
            } else if ch.file_count >= 4 {
                reasons.push(format!("Large scope ({} files)", ch.file_count));
            } else if ch.creative {
                reasons.push("Requires creative/architectural thinking".into());
            } else {
                reasons.push("Complex task requiring planning".into());
            }
        }
    }

    reasons.join(" - ")
}
