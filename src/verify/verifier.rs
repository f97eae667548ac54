use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::schemas::{BatchVerification, FailedAction, ToolOutcome, VerificationResult};

/// Optional language syntax check, injected by the embedder. The verifier
/// works without one; file checks then stop at existence and size.
pub trait SyntaxChecker: Send + Sync {
    /// Whether this checker knows the language of `path`.
    fn handles(&self, path: &Path) -> bool;

    /// Ok when the source parses; Err carries a short diagnostic.
    fn check(&self, source: &str) -> Result<(), String>;
}

/// Post-execution verification: did the declared side effects of each tool
/// call actually happen?
pub struct ActionVerifier {
    workspace: PathBuf,
    syntax: Option<Box<dyn SyntaxChecker>>,
}

impl ActionVerifier {
    pub fn new(workspace: PathBuf) -> Self {
        Self {
            workspace,
            syntax: None,
        }
    }

    pub fn with_syntax_checker(mut self, checker: Box<dyn SyntaxChecker>) -> Self {
        self.syntax = Some(checker);
        self
    }

    pub fn verify(&self, outcome: &ToolOutcome) -> VerificationResult {
        if !outcome.success {
            return VerificationResult::failed(
                format!(
                    "Tool reported failure: {}",
                    outcome.error.as_deref().unwrap_or("Unknown")
                ),
                "Retry with corrected parameters",
            );
        }

        match outcome.name.as_str() {
            "write_file" => self.verify_write_file(&outcome.params),
            "edit_file" => self.verify_edit_file(&outcome.params),
            "create_folder" => self.verify_create_folder(&outcome.params),
            "delete_file" => self.verify_delete_file(&outcome.params),
            // Other tools have no filesystem post-condition to probe.
            _ => VerificationResult::ok(),
        }
    }

    pub fn verify_batch(&self, outcomes: &[ToolOutcome]) -> BatchVerification {
        let mut batch = BatchVerification {
            all_verified: true,
            total: outcomes.len(),
            verified: 0,
            failed: 0,
            failures: Vec::new(),
        };

        for outcome in outcomes {
            let result = self.verify(outcome);
            if result.verified {
                batch.verified += 1;
            } else {
                batch.failed += 1;
                batch.all_verified = false;
                log::warn!(
                    "Verification failed for {}: {:?}",
                    outcome.name,
                    result.issues
                );
                batch.failures.push(FailedAction {
                    tool: outcome.name.clone(),
                    issues: result.issues,
                    suggestion: result.suggestion,
                });
            }
        }

        log::info!(
            "Batch verification: {}/{} succeeded",
            batch.verified,
            batch.total
        );
        batch
    }

    fn verify_write_file(&self, params: &Value) -> VerificationResult {
        let Some(path) = params.get("path").and_then(Value::as_str) else {
            return VerificationResult::failed("No file path provided", "");
        };

        let full_path = self.workspace.join(path);
        if !full_path.exists() {
            return VerificationResult::failed(
                format!("File not found after write: {path}"),
                "Retry write_file with same parameters",
            );
        }

        let expected_content = params.get("content").and_then(Value::as_str).unwrap_or("");
        let size = full_path.metadata().map(|m| m.len()).unwrap_or(0);
        if !expected_content.is_empty() && size == 0 {
            return VerificationResult::failed(
                format!("File is empty: {path}"),
                "Content may not have been written",
            );
        }

        if let Some(result) = self.check_syntax(&full_path, path) {
            return result;
        }

        log::info!("Verified: {path} written successfully");
        VerificationResult::ok()
    }

    fn verify_edit_file(&self, params: &Value) -> VerificationResult {
        let Some(path) = params.get("path").and_then(Value::as_str) else {
            return VerificationResult::failed("No file path provided", "");
        };

        let full_path = self.workspace.join(path);
        if !full_path.exists() {
            return VerificationResult::failed(
                format!("File not found after edit: {path}"),
                "File may have been deleted accidentally",
            );
        }

        if let Some(result) = self.check_syntax(&full_path, path) {
            return result;
        }

        log::info!("Verified: {path} edited successfully");
        VerificationResult::ok()
    }

    fn verify_create_folder(&self, params: &Value) -> VerificationResult {
        let Some(path) = params.get("path").and_then(Value::as_str) else {
            return VerificationResult::failed("No folder path provided", "");
        };

        let full_path = self.workspace.join(path);
        if !full_path.exists() {
            return VerificationResult::failed(
                format!("Folder not found after creation: {path}"),
                "Retry create_folder",
            );
        }
        if !full_path.is_dir() {
            return VerificationResult::failed(
                format!("Path exists but is not a folder: {path}"),
                "Delete file and retry create_folder",
            );
        }

        VerificationResult::ok()
    }

    fn verify_delete_file(&self, params: &Value) -> VerificationResult {
        let Some(path) = params.get("path").and_then(Value::as_str) else {
            return VerificationResult::failed("No file path provided", "");
        };

        let full_path = self.workspace.join(path);
        if full_path.exists() {
            return VerificationResult::failed(
                format!("File still exists after delete: {path}"),
                "Retry delete_file",
            );
        }

        VerificationResult::ok()
    }

    /// Some when a syntax check ran and failed.
    fn check_syntax(&self, full_path: &Path, display_path: &str) -> Option<VerificationResult> {
        let checker = self.syntax.as_ref()?;
        if !checker.handles(full_path) {
            return None;
        }
        let source = std::fs::read_to_string(full_path).ok()?;
        match checker.check(&source) {
            Ok(()) => None,
            Err(diagnostic) => Some(VerificationResult::failed(
                format!("Syntax error in {display_path}: {diagnostic}"),
                "Fix syntax and rewrite file",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn write_outcome(path: &str, content: &str) -> ToolOutcome {
        ToolOutcome::success(
            "write_file",
            json!({"path": path, "content": content}),
            "",
            Value::Null,
        )
    }

    struct ColonChecker;

    impl SyntaxChecker for ColonChecker {
        fn handles(&self, path: &Path) -> bool {
            path.extension().is_some_and(|ext| ext == "py")
        }

        fn check(&self, source: &str) -> Result<(), String> {
            // Toy stand-in for a real parser: every def line needs a colon.
            for (i, line) in source.lines().enumerate() {
                if line.trim_start().starts_with("def ") && !line.trim_end().ends_with(':') {
                    return Err(format!("Line {}: expected ':'", i + 1));
                }
            }
            Ok(())
        }
    }

    #[test]
    fn test_written_file_verifies() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("out.txt"), "content").unwrap();

        let verifier = ActionVerifier::new(dir.path().to_path_buf());
        let result = verifier.verify(&write_outcome("out.txt", "content"));
        assert!(result.verified);
    }

    #[test]
    fn test_missing_file_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        let verifier = ActionVerifier::new(dir.path().to_path_buf());
        let result = verifier.verify(&write_outcome("never_written.txt", "content"));
        assert!(!result.verified);
        assert!(result.issues[0].contains("not found"));
    }

    #[test]
    fn test_empty_file_with_nonempty_content_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("zero.txt"), "").unwrap();

        let verifier = ActionVerifier::new(dir.path().to_path_buf());
        let result = verifier.verify(&write_outcome("zero.txt", "expected content"));
        assert!(!result.verified);
        assert!(result.issues[0].contains("empty"));
    }

    #[test]
    fn test_empty_file_with_empty_content_passes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("zero.txt"), "").unwrap();

        let verifier = ActionVerifier::new(dir.path().to_path_buf());
        assert!(verifier.verify(&write_outcome("zero.txt", "")).verified);
    }

    #[test]
    fn test_syntax_checker_rejects_bad_python() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("add.py"), "def add(a, b)\n    return a + b\n").unwrap();

        let verifier =
            ActionVerifier::new(dir.path().to_path_buf()).with_syntax_checker(Box::new(ColonChecker));
        let result = verifier.verify(&write_outcome("add.py", "def add(a, b)\n    return a + b\n"));
        assert!(!result.verified);
        assert!(result.issues[0].contains("Syntax error"));
        assert_eq!(result.suggestion, "Fix syntax and rewrite file");
    }

    #[test]
    fn test_without_checker_python_file_passes_on_existence() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("add.py"), "def add(a, b)\n    return a + b\n").unwrap();

        let verifier = ActionVerifier::new(dir.path().to_path_buf());
        assert!(verifier
            .verify(&write_outcome("add.py", "def add(a, b)"))
            .verified);
    }

    #[test]
    fn test_create_folder_post_conditions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("made")).unwrap();
        std::fs::write(dir.path().join("not_a_dir"), "x").unwrap();

        let verifier = ActionVerifier::new(dir.path().to_path_buf());

        let ok = ToolOutcome::success("create_folder", json!({"path": "made"}), "", Value::Null);
        assert!(verifier.verify(&ok).verified);

        let not_dir =
            ToolOutcome::success("create_folder", json!({"path": "not_a_dir"}), "", Value::Null);
        let result = verifier.verify(&not_dir);
        assert!(!result.verified);
        assert!(result.issues[0].contains("not a folder"));
    }

    #[test]
    fn test_delete_file_must_be_gone() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("still_here.txt"), "x").unwrap();

        let verifier = ActionVerifier::new(dir.path().to_path_buf());

        let gone =
            ToolOutcome::success("delete_file", json!({"path": "was_deleted.txt"}), "", Value::Null);
        assert!(verifier.verify(&gone).verified);

        let lingering =
            ToolOutcome::success("delete_file", json!({"path": "still_here.txt"}), "", Value::Null);
        assert!(!verifier.verify(&lingering).verified);
    }

    #[test]
    fn test_unknown_tool_trusts_success_flag() {
        let dir = tempfile::tempdir().unwrap();
        let verifier = ActionVerifier::new(dir.path().to_path_buf());

        let ok = ToolOutcome::success("ping", json!({"host": "x"}), "", Value::Null);
        assert!(verifier.verify(&ok).verified);

        let failed = ToolOutcome::failure("ping", json!({"host": "x"}), "unreachable");
        assert!(!verifier.verify(&failed).verified);
    }

    #[test]
    fn test_verify_batch_aggregates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.txt"), "x").unwrap();

        let verifier = ActionVerifier::new(dir.path().to_path_buf());
        let batch = verifier.verify_batch(&[
            write_outcome("good.txt", "x"),
            write_outcome("missing.txt", "x"),
        ]);

        assert!(!batch.all_verified);
        assert_eq!(batch.total, 2);
        assert_eq!(batch.verified, 1);
        assert_eq!(batch.failed, 1);
        assert_eq!(batch.failures[0].tool, "write_file");
    }
}
