/// Escape lone backslashes that do not start a valid JSON escape sequence.
///
/// Models frequently emit Windows-style paths (`"code\file.py"`) inside
/// JSON string values; doubling the stray backslash turns them into valid
/// JSON without touching `\n`, `\t`, `\"` and friends.
pub fn escape_stray_backslashes(s: &str) -> String {
    const VALID_ESCAPES: &[char] = &['"', '\\', '/', 'b', 'f', 'n', 'r', 't', 'u'];

    let chars: Vec<char> = s.chars().collect();
    let mut fixed = String::with_capacity(s.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '\\' {
            match chars.get(i + 1) {
                Some(next) if VALID_ESCAPES.contains(next) => {
                    // Valid escape, keep the pair as-is.
                    fixed.push('\\');
                    fixed.push(*next);
                    i += 2;
                    continue;
                }
                _ => {
                    fixed.push_str("\\\\");
                    i += 1;
                    continue;
                }
            }
        }
        fixed.push(c);
        i += 1;
    }

    fixed
}

/// Collapse triple quotes to a single quote. Code models sometimes carry
/// Python-style `"""` literals into JSON parameter values.
pub fn collapse_triple_quotes(s: &str) -> String {
    s.replace("\"\"\"", "\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows_path_gets_escaped() {
        let fixed = escape_stray_backslashes(r#"{"path": "code\file.py"}"#);
        assert_eq!(fixed, r#"{"path": "code\\file.py"}"#);
        assert!(serde_json::from_str::<serde_json::Value>(&fixed).is_ok());
    }

    #[test]
    fn test_valid_escapes_are_untouched() {
        let input = r#"{"content": "line1\nline2\t\"quoted\""}"#;
        assert_eq!(escape_stray_backslashes(input), input);
    }

    #[test]
    fn test_already_doubled_backslash_is_kept() {
        let input = r#"{"path": "a\\b"}"#;
        assert_eq!(escape_stray_backslashes(input), input);
    }

    #[test]
    fn test_trailing_backslash() {
        assert_eq!(escape_stray_backslashes(r"end\"), r"end\\");
    }

    #[test]
    fn test_collapse_triple_quotes() {
        let input = r#"{"content": """def f(): pass"""}"#;
        assert_eq!(
            collapse_triple_quotes(input),
            r#"{"content": "def f(): pass"}"#
        );
    }
}
