use regex::{Regex, RegexBuilder};
use serde_json::Value;

use crate::schemas::ToolCall;

use super::{collapse_triple_quotes, escape_stray_backslashes};

/// Extracts `TOOL: name | PARAMS: {json}` calls from raw model output.
///
/// Reasoning models wrap deliberation in `<think>…</think>` blocks; those
/// are stripped before scanning so a tool call mentioned inside the
/// reasoning is never executed. JSON payloads get two repair passes before
/// a call is given up on: stray-backslash escaping and triple-quote
/// collapsing.
pub struct ToolCallParser {
    header: Regex,
    think: Regex,
    think_capture: Regex,
}

impl ToolCallParser {
    pub fn new() -> Self {
        let header = RegexBuilder::new(r"TOOL:\s*(\w+)\s*\|\s*PARAMS:\s*")
            .case_insensitive(true)
            .build()
            .expect("tool header regex");
        let think = RegexBuilder::new(r"<think>.*?</think>")
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .build()
            .expect("think regex");
        let think_capture = RegexBuilder::new(r"<think>(.*?)</think>")
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .build()
            .expect("think capture regex");
        Self {
            header,
            think,
            think_capture,
        }
    }

    /// Parse all tool calls from a model response, in source order. An
    /// empty list is a valid result; a damaged call is skipped, not fatal.
    pub fn parse(&self, response: &str) -> Vec<ToolCall> {
        let action_text = self.strip_thinking(response);
        self.parse_action_text(&action_text)
    }

    /// Remove `<think>…</think>` blocks, leaving only actionable content.
    pub fn strip_thinking(&self, response: &str) -> String {
        self.think.replace_all(response, "").trim().to_string()
    }

    /// All `<think>` block bodies, for surfacing as thinking events.
    pub fn extract_thinking(&self, response: &str) -> Vec<String> {
        self.think_capture
            .captures_iter(response)
            .map(|caps| caps[1].trim().to_string())
            .collect()
    }

    fn parse_action_text(&self, text: &str) -> Vec<ToolCall> {
        let mut calls = Vec::new();

        for header in self.header.captures_iter(text) {
            let whole = header.get(0).expect("match 0");
            let name = header[1].to_string();
            let json_start = whole.end();

            let Some(raw) = find_json_object(&text[json_start..]) else {
                log::error!("Could not find closing brace for tool {name}");
                continue;
            };

            match parse_params(raw) {
                Some(params) => {
                    calls.push(ToolCall::new(name, params).with_origin(whole.start()));
                }
                None => {
                    log::error!(
                        "Failed to parse tool params for {name}: {}",
                        &raw[..raw.len().min(100)]
                    );
                }
            }
        }

        calls
    }
}

impl Default for ToolCallParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Locate the balanced JSON object at the start of `text` (after optional
/// whitespace) by brace counting with string and escape awareness.
fn find_json_object(text: &str) -> Option<&str> {
    let offset = text.len() - text.trim_start().len();
    let body = &text[offset..];
    if !body.starts_with('{') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in body.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&body[..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Parse a raw JSON payload, trying the repair passes in order. Only
/// objects are accepted; tool parameters are always a JSON object.
fn parse_params(raw: &str) -> Option<Value> {
    let attempts = [
        raw.to_string(),
        escape_stray_backslashes(raw),
        collapse_triple_quotes(&escape_stray_backslashes(raw)),
    ];

    for attempt in &attempts {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(attempt) {
            return Some(value);
        }
    }

    None
}
