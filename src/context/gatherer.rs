use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use regex::Regex;
use serde_json::{json, Value};

use crate::tools::ToolRegistry;

/// Closed set of tech terms probed in requests. Quoted phrases from the
/// request are added on top, capped at five keywords total.
const TECH_KEYWORDS: &[&str] = &[
    "react", "vue", "angular", "python", "javascript", "typescript", "html", "css", "api",
    "database", "function", "class", "component", "dashboard", "chart", "form", "button", "modal",
    "table",
];

/// Dependency manifests probed at the workspace root; the first 500 chars
/// of each are kept.
const DEPENDENCY_MANIFESTS: &[&str] = &[
    "package.json",
    "requirements.txt",
    "Pipfile",
    "pom.xml",
    "build.gradle",
    "Cargo.toml",
];

const MAX_KEYWORDS: usize = 5;
const MAX_RELEVANT_FILES: usize = 10;
const MAX_DEPENDENCY_FILES: usize = 3;
const MAX_PATTERNS: usize = 3;
const MANIFEST_SNIPPET_CHARS: usize = 500;

/// Bounded context snapshot for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatheredContext {
    pub relevant_files: Vec<String>,
    pub project_structure: String,
    pub dependencies: BTreeMap<String, String>,
    pub patterns_found: Vec<String>,
    pub summary: String,
}

impl GatheredContext {
    /// Compact text block embedded into prompts.
    pub fn format_for_model(&self) -> String {
        let mut out = String::from("=== GATHERED CONTEXT ===\n\n");

        if !self.summary.is_empty() {
            out.push_str(&format!("Summary: {}\n\n", self.summary));
        }
        if !self.project_structure.is_empty() {
            out.push_str(&format!("{}\n\n", self.project_structure));
        }
        if !self.dependencies.is_empty() {
            out.push_str("Dependencies found:\n");
            for name in self.dependencies.keys() {
                out.push_str(&format!("  - {name}\n"));
            }
        }
        if !self.relevant_files.is_empty() {
            out.push_str(&format!("\nRelevant files ({}):\n", self.relevant_files.len()));
            for file in self.relevant_files.iter().take(5) {
                out.push_str(&format!("  - {file}\n"));
            }
        }
        if !self.patterns_found.is_empty() {
            out.push_str("\nCode patterns:\n");
            for pattern in &self.patterns_found {
                out.push_str(&format!("  - {pattern}\n"));
            }
        }

        out.push_str("\n=== END CONTEXT ===\n");
        out
    }
}

/// Produces a [`GatheredContext`] for a request by consuming registered
/// search tools. The gatherer never walks the filesystem for content
/// itself; only the dependency-manifest probe reads files directly.
pub struct ContextGatherer {
    registry: Arc<ToolRegistry>,
    workspace: PathBuf,
    quoted: Regex,
}

impl ContextGatherer {
    pub fn new(registry: Arc<ToolRegistry>, workspace: PathBuf) -> Self {
        Self {
            registry,
            workspace,
            quoted: Regex::new(r#""([^"]*)""#).expect("quoted phrase regex"),
        }
    }

    pub async fn gather(&self, request: &str) -> GatheredContext {
        log::info!("Gathering context...");
        let mut context = GatheredContext::default();

        let keywords = self.extract_keywords(request);
        log::info!("Keywords extracted: {keywords:?}");

        if !keywords.is_empty() {
            context.relevant_files = self.search_relevant_files(&keywords).await;
        }

        let request_lower = request.to_lowercase();
        if ["create", "new", "build", "generate"]
            .iter()
            .any(|kw| request_lower.contains(kw))
        {
            context.project_structure = self.project_structure().await;
        }

        context.dependencies = self.probe_dependencies();
        context.patterns_found = self.find_code_patterns().await;
        context.summary = summarize(&context);

        log::info!(
            "Context gathered: {} files, {} patterns",
            context.relevant_files.len(),
            context.patterns_found.len()
        );

        context
    }

    fn extract_keywords(&self, request: &str) -> Vec<String> {
        let request_lower = request.to_lowercase();
        let mut keywords: Vec<String> = TECH_KEYWORDS
            .iter()
            .filter(|kw| request_lower.contains(*kw))
            .map(|kw| kw.to_string())
            .collect();

        for caps in self.quoted.captures_iter(request) {
            let phrase = caps[1].trim().to_string();
            if !phrase.is_empty() && !keywords.contains(&phrase) {
                keywords.push(phrase);
            }
        }

        keywords.truncate(MAX_KEYWORDS);
        keywords
    }

    async fn search_relevant_files(&self, keywords: &[String]) -> Vec<String> {
        let Some(search) = self.registry.get("search_content") else {
            log::warn!("search_content tool not registered; skipping file search");
            return Vec::new();
        };

        let mut files = Vec::new();
        for keyword in keywords {
            let result = search.call(json!({"query": keyword})).await;
            if let Ok(output) = result {
                if let Some(found) = output.data.get("files").and_then(Value::as_array) {
                    for file in found.iter().filter_map(Value::as_str) {
                        if !files.contains(&file.to_string()) {
                            files.push(file.to_string());
                        }
                    }
                }
            }
        }

        files.truncate(MAX_RELEVANT_FILES);
        files
    }

    async fn project_structure(&self) -> String {
        let Some(list) = self.registry.get("list_directory") else {
            return "Project structure: Unknown".into();
        };

        match list.call(json!({"path": "."})).await {
            Ok(output) => {
                let entries = output
                    .data
                    .get("entries")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();

                let dirs: Vec<&str> = entries
                    .iter()
                    .filter(|e| e["type"] == "directory")
                    .filter_map(|e| e["name"].as_str())
                    .take(10)
                    .collect();
                let files: Vec<&str> = entries
                    .iter()
                    .filter(|e| e["type"] == "file")
                    .filter_map(|e| e["name"].as_str())
                    .take(10)
                    .collect();

                format!(
                    "Project structure:\nDirectories: {}\nFiles: {}",
                    dirs.join(", "),
                    files.join(", ")
                )
            }
            Err(e) => {
                log::warn!("Could not get project structure: {e}");
                "Project structure: Unknown".into()
            }
        }
    }

    fn probe_dependencies(&self) -> BTreeMap<String, String> {
        let mut dependencies = BTreeMap::new();
        for manifest in DEPENDENCY_MANIFESTS {
            if dependencies.len() >= MAX_DEPENDENCY_FILES {
                break;
            }
            let path = self.workspace.join(manifest);
            if let Ok(content) = std::fs::read_to_string(&path) {
                let snippet: String = content.chars().take(MANIFEST_SNIPPET_CHARS).collect();
                dependencies.insert(manifest.to_string(), snippet);
            }
        }
        dependencies
    }

    async fn find_code_patterns(&self) -> Vec<String> {
        let Some(search) = self.registry.get("search_content") else {
            return Vec::new();
        };

        let probes = [
            ("function", "Functions found"),
            ("class", "Classes found"),
            ("import", "Import patterns"),
            ("export", "Export patterns"),
        ];

        let mut patterns = Vec::new();
        for (token, description) in probes {
            if patterns.len() >= MAX_PATTERNS {
                break;
            }
            if let Ok(output) = search.call(json!({"query": token})).await {
                let count = output
                    .data
                    .get("count")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                if count > 0 {
                    patterns.push(format!("{description}: {count} files"));
                }
            }
        }

        patterns
    }
}

fn summarize(context: &GatheredContext) -> String {
    let mut parts = Vec::new();

    if !context.relevant_files.is_empty() {
        parts.push(format!(
            "Found {} relevant files",
            context.relevant_files.len()
        ));
    }
    if !context.dependencies.is_empty() {
        parts.push(format!(
            "Dependencies: {}",
            context
                .dependencies
                .keys()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    if !context.patterns_found.is_empty() {
        parts.push(format!("Patterns: {}", context.patterns_found.join(", ")));
    }
    if !context.project_structure.is_empty() {
        parts.push("Project structure analyzed".into());
    }

    if parts.is_empty() {
        "No context gathered".into()
    } else {
        parts.join(" | ")
    }
}
