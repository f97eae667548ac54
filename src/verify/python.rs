use std::path::Path;
use std::sync::Mutex;

use tree_sitter::Parser;

use super::SyntaxChecker;

/// Python syntax checker backed by tree-sitter. Registered with the
/// verifier when the `syntax-check` feature is enabled.
pub struct PythonSyntaxChecker {
    parser: Mutex<Parser>,
}

impl PythonSyntaxChecker {
    pub fn new() -> Result<Self, String> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| format!("failed to load Python grammar: {e}"))?;
        Ok(Self {
            parser: Mutex::new(parser),
        })
    }
}

impl SyntaxChecker for PythonSyntaxChecker {
    fn handles(&self, path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == "py")
    }

    fn check(&self, source: &str) -> Result<(), String> {
        let mut parser = self.parser.lock().expect("python parser poisoned");
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| "parser returned no tree".to_string())?;

        let root = tree.root_node();
        if root.has_error() {
            // Report the first error node's position for the reprompt.
            let mut cursor = root.walk();
            let mut stack = vec![root];
            while let Some(node) = stack.pop() {
                if node.is_error() || node.is_missing() {
                    let point = node.start_position();
                    return Err(format!(
                        "Line {}: invalid syntax near column {}",
                        point.row + 1,
                        point.column + 1
                    ));
                }
                stack.extend(node.children(&mut cursor));
            }
            return Err("invalid syntax".into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_python_passes() {
        let checker = PythonSyntaxChecker::new().unwrap();
        assert!(checker.check("def add(a, b):\n    return a + b\n").is_ok());
    }

    #[test]
    fn test_missing_colon_fails() {
        let checker = PythonSyntaxChecker::new().unwrap();
        let err = checker
            .check("def add(a, b)\n    return a + b\n")
            .unwrap_err();
        assert!(err.contains("Line"));
    }

    #[test]
    fn test_handles_only_python_files() {
        let checker = PythonSyntaxChecker::new().unwrap();
        assert!(checker.handles(Path::new("script.py")));
        assert!(!checker.handles(Path::new("script.js")));
    }
}
