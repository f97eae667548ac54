use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tools::{FieldKind, FieldSpec, ObjectSpec, SideEffect, Tool, ToolError, ToolOutput};

use super::Workspace;

/// Directories never worth searching.
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules", "target", "__pycache__", ".venv"];

const MAX_RESULTS: usize = 100;

fn walk_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if path.is_dir() {
                if !SKIPPED_DIRS.contains(&name.as_str()) && !name.starts_with('.') {
                    stack.push(path);
                }
            } else {
                files.push(path);
            }
        }
    }

    files.sort();
    files
}

fn relative_to<'a>(path: &'a Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string()
}

/// Find files matching a glob pattern, e.g. `*.py` or `src/**/*.js`.
pub struct FindFiles {
    workspace: Arc<Workspace>,
}

impl FindFiles {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for FindFiles {
    fn name(&self) -> String {
        "find_files".into()
    }

    fn description(&self) -> String {
        "Find files matching a glob pattern, e.g. \"*.py\" or \"src/**/*.js\".".into()
    }

    fn parameters(&self) -> ObjectSpec {
        ObjectSpec::new(vec![FieldSpec::required(
            "pattern",
            FieldKind::String,
            "Glob pattern, relative to the workspace",
        )])
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::Read
    }

    async fn call(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let pattern = params
            .get("pattern")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::MissingParameter("pattern".into()))?;

        let matcher = glob::Pattern::new(pattern)
            .map_err(|e| ToolError::InvalidParameter {
                name: "pattern".into(),
                expected: format!("valid glob pattern ({e})"),
            })?;

        let root = self.workspace.root().to_path_buf();
        let files: Vec<String> = walk_files(&root)
            .iter()
            .map(|p| relative_to(p, &root))
            .filter(|rel| {
                matcher.matches(rel)
                    || Path::new(rel)
                        .file_name()
                        .map(|n| matcher.matches(&n.to_string_lossy()))
                        .unwrap_or(false)
            })
            .take(MAX_RESULTS)
            .collect();

        Ok(
            ToolOutput::message(format!("Found {} files matching {pattern}", files.len()))
                .with_data(json!({"pattern": pattern, "files": files, "count": files.len()})),
        )
    }
}

/// Search file contents for a query string, grep style.
pub struct SearchContent {
    workspace: Arc<Workspace>,
}

impl SearchContent {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for SearchContent {
    fn name(&self) -> String {
        "search_content".into()
    }

    fn description(&self) -> String {
        "Search file contents for a query string; returns matching files and lines.".into()
    }

    fn parameters(&self) -> ObjectSpec {
        ObjectSpec::new(vec![
            FieldSpec::required("query", FieldKind::String, "Text to search for"),
            FieldSpec::optional(
                "file_pattern",
                FieldKind::String,
                "Restrict to files matching this glob",
            ),
        ])
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::Read
    }

    async fn call(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let query = params
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::MissingParameter("query".into()))?;
        let file_pattern = params
            .get("file_pattern")
            .and_then(Value::as_str)
            .map(glob::Pattern::new)
            .transpose()
            .map_err(|e| ToolError::InvalidParameter {
                name: "file_pattern".into(),
                expected: format!("valid glob pattern ({e})"),
            })?;

        let query_lower = query.to_lowercase();
        let root = self.workspace.root().to_path_buf();

        let mut files = Vec::new();
        let mut matches = Vec::new();

        for path in walk_files(&root) {
            let rel = relative_to(&path, &root);
            if let Some(matcher) = &file_pattern {
                let name_matches = Path::new(&rel)
                    .file_name()
                    .map(|n| matcher.matches(&n.to_string_lossy()))
                    .unwrap_or(false);
                if !matcher.matches(&rel) && !name_matches {
                    continue;
                }
            }

            let Ok(content) = std::fs::read_to_string(&path) else {
                continue; // binary or unreadable
            };

            let mut hit = false;
            for (line_no, line) in content.lines().enumerate() {
                if line.to_lowercase().contains(&query_lower) {
                    if !hit {
                        files.push(rel.clone());
                        hit = true;
                    }
                    if matches.len() < MAX_RESULTS {
                        matches.push(json!({
                            "file": rel.clone(),
                            "line": line_no + 1,
                            "text": line.trim(),
                        }));
                    }
                }
            }

            if files.len() >= MAX_RESULTS {
                break;
            }
        }

        Ok(ToolOutput::message(format!(
            "Found \"{query}\" in {} files",
            files.len()
        ))
        .with_data(json!({
            "query": query,
            "files": files,
            "matches": matches,
            "count": files.len(),
        })))
    }
}
