use crate::tokens::estimate_tokens;

use super::GatheredContext;

/// Pluggable context compression. Implementations must be idempotent on
/// inputs that already fit the budget.
pub trait ContextCompressor: Send + Sync {
    fn compress(&self, context: GatheredContext, budget_tokens: usize) -> GatheredContext;
}

/// Default compressor: keeps the load-bearing parts of a context in a
/// fixed priority order.
///
/// 1. project structure, truncated to 500 chars
/// 2. top 5 relevant file paths
/// 3. first 200 chars of up to 3 dependency manifests
/// 4. top 3 pattern descriptions
pub struct DefaultCompressor;

const MAX_STRUCTURE_CHARS: usize = 500;
const MAX_FILES: usize = 5;
const MAX_DEPENDENCIES: usize = 3;
const MAX_DEPENDENCY_CHARS: usize = 200;
const MAX_PATTERNS: usize = 3;

impl ContextCompressor for DefaultCompressor {
    fn compress(&self, context: GatheredContext, budget_tokens: usize) -> GatheredContext {
        let current = estimate_tokens(&context.format_for_model());
        if current <= budget_tokens {
            return context;
        }

        log::info!("Context too large ({current} > {budget_tokens} tokens), compressing...");

        let mut compressed = context;

        if compressed.project_structure.len() > MAX_STRUCTURE_CHARS {
            let truncated: String = compressed
                .project_structure
                .chars()
                .take(MAX_STRUCTURE_CHARS)
                .collect();
            compressed.project_structure = format!("{truncated}...");
        }

        compressed.relevant_files.truncate(MAX_FILES);

        let kept: Vec<String> = compressed
            .dependencies
            .keys()
            .take(MAX_DEPENDENCIES)
            .cloned()
            .collect();
        compressed.dependencies.retain(|name, _| kept.contains(name));
        for snippet in compressed.dependencies.values_mut() {
            if snippet.len() > MAX_DEPENDENCY_CHARS {
                *snippet = snippet.chars().take(MAX_DEPENDENCY_CHARS).collect();
            }
        }

        compressed.patterns_found.truncate(MAX_PATTERNS);

        let after = estimate_tokens(&compressed.format_for_model());
        log::info!("Compressed context {current} -> {after} tokens");

        compressed
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn oversized_context() -> GatheredContext {
        let mut dependencies = BTreeMap::new();
        for i in 0..6 {
            dependencies.insert(format!("manifest{i}.json"), "x".repeat(800));
        }
        GatheredContext {
            relevant_files: (0..30).map(|i| format!("src/file{i}.py")).collect(),
            project_structure: "d".repeat(2000),
            dependencies,
            patterns_found: (0..8).map(|i| format!("pattern {i}")).collect(),
            summary: "big".into(),
        }
    }

    #[test]
    fn test_compression_applies_bounds() {
        let compressed = DefaultCompressor.compress(oversized_context(), 100);
        assert!(compressed.project_structure.len() <= MAX_STRUCTURE_CHARS + 3);
        assert_eq!(compressed.relevant_files.len(), MAX_FILES);
        assert_eq!(compressed.dependencies.len(), MAX_DEPENDENCIES);
        assert!(compressed
            .dependencies
            .values()
            .all(|s| s.len() <= MAX_DEPENDENCY_CHARS));
        assert_eq!(compressed.patterns_found.len(), MAX_PATTERNS);
    }

    #[test]
    fn test_small_input_is_untouched() {
        let context = GatheredContext {
            relevant_files: vec!["a.py".into()],
            project_structure: "small".into(),
            dependencies: BTreeMap::new(),
            patterns_found: vec![],
            summary: "tiny".into(),
        };
        let compressed = DefaultCompressor.compress(context.clone(), 10_000);
        assert_eq!(compressed, context);
    }

    #[test]
    fn test_compression_is_idempotent() {
        let once = DefaultCompressor.compress(oversized_context(), 100);
        let twice = DefaultCompressor.compress(once.clone(), 100);
        assert_eq!(once, twice);
    }
}
