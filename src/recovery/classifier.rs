use regex::RegexBuilder;

/// Failure categories the recovery executor knows how to act on, plus a
/// few internal kinds that only appear in execution records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    SyntaxError,
    FileNotFound,
    PermissionDenied,
    Timeout,
    RateLimit,
    ModelError,
    JsonParseError,
    InvalidParams,
    NetworkError,
    Unknown,
    // Internal kinds; never produced by pattern matching.
    ClassificationFailed,
    ToolDispatchFailed,
    PlanningPhaseFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SyntaxError => "syntax_error",
            ErrorKind::FileNotFound => "file_not_found",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::ModelError => "model_error",
            ErrorKind::JsonParseError => "json_parse_error",
            ErrorKind::InvalidParams => "invalid_params",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::Unknown => "unknown",
            ErrorKind::ClassificationFailed => "classification_failed",
            ErrorKind::ToolDispatchFailed => "tool_dispatch_failed",
            ErrorKind::PlanningPhaseFailed => "planning_phase_failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    RepromptWithError,
    CreateMissingPath,
    Escalate,
    RetrySmallerScope,
    ExponentialBackoff,
    SwitchModel,
    FixJsonFormat,
    RepromptWithSchema,
    RetryWithBackoff,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::RepromptWithError => "reprompt_with_error",
            Strategy::CreateMissingPath => "create_missing_path",
            Strategy::Escalate => "escalate",
            Strategy::RetrySmallerScope => "retry_smaller_scope",
            Strategy::ExponentialBackoff => "exponential_backoff",
            Strategy::SwitchModel => "switch_model",
            Strategy::FixJsonFormat => "fix_json_format",
            Strategy::RepromptWithSchema => "reprompt_with_schema",
            Strategy::RetryWithBackoff => "retry_with_backoff",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ErrorClassification {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub recoverable: bool,
    pub strategy: Strategy,
    pub confidence: f64,
    /// Original message, truncated to 200 chars.
    pub message: String,
}

/// Ordered pattern table: first matching kind wins.
const PATTERN_TABLE: &[(ErrorKind, &[&str])] = &[
    (
        ErrorKind::SyntaxError,
        &[
            r"SyntaxError",
            r"IndentationError",
            r"invalid syntax",
            r"unexpected EOF",
        ],
    ),
    (
        ErrorKind::FileNotFound,
        &[
            r"FileNotFoundError",
            r"No such file",
            r"cannot find the path",
            r"does not exist",
        ],
    ),
    (
        ErrorKind::PermissionDenied,
        &[
            r"PermissionError",
            r"denied",
            r"operation not permitted",
        ],
    ),
    (
        ErrorKind::Timeout,
        &[
            r"TimeoutError",
            r"timed out",
            r"timeout after",
            r"Connection timeout",
            r"Read timeout",
        ],
    ),
    (
        ErrorKind::RateLimit,
        &[r"rate limit", r"too many requests", r"429", r"quota exceeded"],
    ),
    (
        ErrorKind::ModelError,
        &[
            r"model.*not found",
            r"Ollama.*error",
            r"model.*unavailable",
            r"failed to load model",
        ],
    ),
    (
        ErrorKind::JsonParseError,
        &[
            r"JSONDecodeError",
            r"invalid JSON",
            r"Expecting property name",
            r"Expecting value",
        ],
    ),
    (
        ErrorKind::InvalidParams,
        &[
            r"missing required parameter",
            r"invalid parameter",
            r"KeyError",
            r"required.*not provided",
        ],
    ),
    (
        ErrorKind::NetworkError,
        &[
            r"ConnectionError",
            r"Connection refused",
            r"Network.*unreachable",
            r"unreachable",
            r"Failed to establish",
        ],
    ),
];

fn severity_of(kind: ErrorKind) -> Severity {
    match kind {
        ErrorKind::RateLimit => Severity::Low,
        ErrorKind::PermissionDenied
        | ErrorKind::ModelError
        | ErrorKind::NetworkError => Severity::High,
        _ => Severity::Medium,
    }
}

fn strategy_of(kind: ErrorKind) -> Strategy {
    match kind {
        ErrorKind::SyntaxError => Strategy::RepromptWithError,
        ErrorKind::FileNotFound => Strategy::CreateMissingPath,
        ErrorKind::PermissionDenied => Strategy::Escalate,
        ErrorKind::Timeout => Strategy::RetrySmallerScope,
        ErrorKind::RateLimit => Strategy::ExponentialBackoff,
        ErrorKind::ModelError => Strategy::SwitchModel,
        ErrorKind::JsonParseError => Strategy::FixJsonFormat,
        ErrorKind::InvalidParams => Strategy::RepromptWithSchema,
        ErrorKind::NetworkError => Strategy::RetryWithBackoff,
        _ => Strategy::Escalate,
    }
}

fn recoverable(kind: ErrorKind) -> bool {
    !matches!(
        kind,
        ErrorKind::PermissionDenied
            | ErrorKind::Unknown
            | ErrorKind::ClassificationFailed
            | ErrorKind::ToolDispatchFailed
            | ErrorKind::PlanningPhaseFailed
    )
}

/// Regex-matches error text (message plus optional exception-kind hint)
/// against the ordered pattern table.
pub struct ErrorClassifier {
    patterns: Vec<(ErrorKind, Vec<regex::Regex>)>,
}

impl ErrorClassifier {
    pub fn new() -> Self {
        let patterns = PATTERN_TABLE
            .iter()
            .map(|(kind, raw)| {
                let compiled = raw
                    .iter()
                    .map(|p| {
                        RegexBuilder::new(p)
                            .case_insensitive(true)
                            .build()
                            .expect("error pattern")
                    })
                    .collect();
                (*kind, compiled)
            })
            .collect();
        Self { patterns }
    }

    pub fn classify(&self, message: &str, kind_hint: Option<&str>) -> ErrorClassification {
        let search_text = format!("{} {message}", kind_hint.unwrap_or(""));

        let kind = self
            .patterns
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|re| re.is_match(&search_text)))
            .map(|(kind, _)| *kind)
            .unwrap_or(ErrorKind::Unknown);

        let classification = ErrorClassification {
            kind,
            severity: severity_of(kind),
            recoverable: recoverable(kind),
            strategy: strategy_of(kind),
            confidence: self.confidence(kind, &search_text),
            message: message.chars().take(200).collect(),
        };

        log::info!(
            "Error classified: type={}, severity={:?}, recoverable={}, strategy={}",
            classification.kind.as_str(),
            classification.severity,
            classification.recoverable,
            classification.strategy.as_str()
        );

        classification
    }

    fn confidence(&self, kind: ErrorKind, search_text: &str) -> f64 {
        if kind == ErrorKind::Unknown {
            return 0.5;
        }

        let mut confidence: f64 = 0.7;
        let matches = self
            .patterns
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, patterns)| patterns.iter().filter(|re| re.is_match(search_text)).count())
            .unwrap_or(0);
        if matches > 1 {
            confidence = (confidence + 0.1).min(1.0);
        }
        (confidence * 100.0).round() / 100.0
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(message: &str) -> ErrorClassification {
        ErrorClassifier::new().classify(message, None)
    }

    #[test]
    fn test_pattern_table_rows() {
        let rows = [
            ("SyntaxError: invalid syntax", ErrorKind::SyntaxError),
            ("No such file or directory: a.txt", ErrorKind::FileNotFound),
            ("Permission denied: /etc", ErrorKind::PermissionDenied),
            ("operation timed out", ErrorKind::Timeout),
            ("rate limit exceeded, retry later", ErrorKind::RateLimit),
            ("HTTP 429", ErrorKind::RateLimit),
            ("model qwen not found", ErrorKind::ModelError),
            ("Expecting value: line 1 column 1", ErrorKind::JsonParseError),
            ("missing required parameter `path`", ErrorKind::InvalidParams),
            ("Network is unreachable", ErrorKind::NetworkError),
            ("something entirely different", ErrorKind::Unknown),
        ];

        for (message, expected) in rows {
            assert_eq!(classify(message).kind, expected, "for: {message}");
        }
    }

    #[test]
    fn test_severity_and_recoverability() {
        let c = classify("rate limit exceeded");
        assert_eq!(c.severity, Severity::Low);
        assert!(c.recoverable);
        assert_eq!(c.strategy, Strategy::ExponentialBackoff);

        let c = classify("Permission denied");
        assert_eq!(c.severity, Severity::High);
        assert!(!c.recoverable);
        assert_eq!(c.strategy, Strategy::Escalate);

        // Model errors are high severity yet still recoverable: the fix is
        // switching models, not giving up.
        let c = classify("Ollama internal error");
        assert_eq!(c.severity, Severity::High);
        assert!(c.recoverable);
        assert_eq!(c.strategy, Strategy::SwitchModel);
    }

    #[test]
    fn test_first_match_wins() {
        // Both a timeout and a network pattern appear; timeout is earlier
        // in the table.
        let c = classify("Connection timeout while host unreachable");
        assert_eq!(c.kind, ErrorKind::Timeout);
    }

    #[test]
    fn test_kind_hint_participates_in_matching() {
        let c = ErrorClassifier::new().classify("something failed", Some("TimeoutError"));
        assert_eq!(c.kind, ErrorKind::Timeout);
    }

    #[test]
    fn test_unknown_is_not_recoverable() {
        let c = classify("mystery");
        assert!(!c.recoverable);
        assert_eq!(c.confidence, 0.5);
    }

    #[test]
    fn test_message_is_truncated() {
        let long = "x".repeat(500);
        assert_eq!(classify(&long).message.len(), 200);
    }
}
