//! Keyword and pattern tables backing the task classifier.
//!
//! Tier assignment is deliberately keyword-driven: it must be cheap,
//! deterministic and explainable, since every request passes through it
//! before a model is even selected.

/// Single-file, straightforward operations. Execution model only.
pub const SIMPLE_PATTERNS: &[&str] = &[
    "add a function",
    "add function",
    "fix typo",
    "fix this typo",
    "format code",
    "format this",
    "rename variable",
    "rename this",
    "add comment",
    "add comments",
    "update docstring",
    "delete file",
    "remove file",
    "read file",
    "show file",
    "list files",
    "search for",
    "find file",
];

pub const SIMPLE_KEYWORDS: &[&str] = &[
    "typo", "rename", "delete", "remove", "read", "show", "list", "search", "find", "display",
    "print",
];

/// Multi-step but well-defined work. Still execution model only.
pub const STANDARD_PATTERNS: &[&str] = &[
    "build a component",
    "create a component",
    "refactor this",
    "refactor function",
    "debug this",
    "fix this error",
    "add error handling",
    "write test",
    "write tests",
    "update function",
    "modify function",
    "improve function",
];

pub const STANDARD_KEYWORDS: &[&str] = &[
    "refactor",
    "debug",
    "test",
    "component",
    "module",
    "error handling",
    "validation",
    "logging",
];

/// Architectural thinking required; the planning-model swap pays off.
pub const COMPLEX_PATTERNS: &[&str] = &[
    "design architecture",
    "design system",
    "create application",
    "create app",
    "build application",
    "build system",
    "build complete",
    "full application",
    "full system",
    "design algorithm",
    "solve problem",
    "complex problem",
    "design pattern",
];

pub const COMPLEX_KEYWORDS: &[&str] = &[
    "architecture",
    "design",
    "algorithm",
    "system",
    "application",
    "framework",
    "platform",
    "solution",
    "strategy",
    "approach",
    "methodology",
    "authentication",
    "database",
    "microservices",
    "api",
    "backend",
    "full stack",
];

pub const CREATIVE_KEYWORDS: &[&str] = &[
    "creative",
    "unique",
    "modern",
    "beautiful",
    "stylish",
    "innovative",
    "custom",
    "original",
    "artistic",
    "elegant",
];

pub const MULTI_FILE_PATTERNS: &[&str] = &[
    r"\b(?:html|css|js)\b.*\b(?:and|with|,)\b.*\b(?:html|css|js)\b",
    r"\b\d+\s+files?\b",
    r"\bwith\s+(?:html|css|js|styling|scripts?)\b",
    r"\binclude.*(?:html|css|js)\b",
];

pub const FILE_EXTENSIONS: &[&str] = &[
    "html", "css", "js", "py", "txt", "json", "yaml", "jsx", "tsx",
];

pub const OPERATION_KEYWORDS: &[&str] = &[
    "create", "write", "edit", "update", "delete", "modify", "add", "remove", "refactor", "build",
    "generate",
];
