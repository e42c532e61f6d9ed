//! Response validation — classify LLM output against the turn's policy
//!
//! Three violation kinds are recognized: a text-only reply when tools
//! were required, a low-quality answer (hedged code facts without
//! `[file:line]` citations), and a textual tool-call escape after the
//! circuit breaker forced `tool_choice = none`. Corrections share one
//! forcing-retry budget managed by the caller.

use regex::Regex;

use crate::llm::LlmResponse;

/// Literal placed over every stripped escape pattern
pub const BLOCKED_MARKER: &str = "[Tool call blocked by circuit breaker]";

/// System-prompt suffix for the desperation retry after an escape
pub const ANTI_TOOL_CALL_PROMPT: &str = "Tool use is disabled for this reply. Do not write \
     tool-call syntax, tool names with arguments, or bracketed tool markers of any form. \
     Answer in plain prose from the evidence you already have.";

/// Policy the current turn imposes on the response
#[derive(Debug, Clone, Default)]
pub struct ValidationPolicy {
    /// The turn expected tool calls
    pub require_tools: bool,
    /// Tool the router considers right for the query
    pub expected_tool: Option<String>,
    /// `tool_choice = none` was forced (breaker or final completion)
    pub forced_none: bool,
    /// A repetition guard fired earlier in the session
    pub circuit_breaker_active: bool,
    /// Completion turns must carry `[file:line]` citations
    pub require_citations: bool,
}

/// Classification of one response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid,
    /// Text-only reply where tools were required
    ToolMissing { correction: String },
    /// Hedged code facts without citations
    Quality { correction: String },
    /// Tool-call-shaped text after tools were forced off
    ToolCallEscape,
}

const HEDGING_WORDS: &[&str] = &[
    "probably",
    "likely",
    "i think",
    "it seems",
    "might be",
    "maybe",
    "presumably",
    "i believe",
];

/// Response validator with patterns compiled once at construction
pub struct ResponseValidator {
    escape_patterns: Vec<Regex>,
    citation: Regex,
}

impl ResponseValidator {
    /// Build a validator aware of the registered tool names
    pub fn new(tool_names: &[String]) -> Self {
        let mut escape_patterns = vec![
            Regex::new(r"\[Tool call:[^\]]*\]").unwrap(),
            Regex::new(r"Calling tool:\s*\S+").unwrap(),
            Regex::new(r"(?s)<tool>.*?</tool>").unwrap(),
        ];
        if !tool_names.is_empty() {
            let names = tool_names
                .iter()
                .map(|n| regex::escape(n))
                .collect::<Vec<_>>()
                .join("|");
            escape_patterns
                .push(Regex::new(&format!(r"\b(?:{})\s*\([^)\n]*\)?", names)).unwrap());
        }
        Self {
            escape_patterns,
            citation: Regex::new(r"\[[^\[\]]+:\d+\]").unwrap(),
        }
    }

    /// Classify a response against the policy
    pub fn classify(&self, response: &LlmResponse, policy: &ValidationPolicy) -> Validation {
        if !response.tool_calls.is_empty() {
            return Validation::Valid;
        }

        if (policy.forced_none || policy.circuit_breaker_active)
            && self.contains_tool_call_pattern(&response.content)
        {
            return Validation::ToolCallEscape;
        }

        // When a breaker fired, scolding the model for not using tools
        // would retrigger the repetition it was stopped for
        if policy.require_tools && !policy.circuit_breaker_active && !policy.forced_none {
            let tool_hint = match &policy.expected_tool {
                Some(tool) => format!("Call the '{}' tool now", tool),
                None => "Call one of the available tools now".to_string(),
            };
            return Validation::ToolMissing {
                correction: format!(
                    "You replied with text, but this question requires looking at the \
                     codebase first. {} instead of answering from memory.",
                    tool_hint
                ),
            };
        }

        if policy.require_citations && !response.content.trim().is_empty() {
            let lowered = response.content.to_lowercase();
            let hedged = HEDGING_WORDS.iter().any(|w| lowered.contains(w));
            let cited = self.citation.is_match(&response.content);
            if hedged && !cited {
                return Validation::Quality {
                    correction: "State code facts precisely, with file and line citations.\n\
                         BAD:  \"The config is probably loaded somewhere in main.\"\n\
                         GOOD: \"The config is loaded in main [src/main.rs:42].\"\n\
                         Rewrite your answer citing every claim as [file:line]."
                        .to_string(),
                };
            }
        }

        Validation::Valid
    }

    /// Whether the text contains any tool-call escape pattern
    pub fn contains_tool_call_pattern(&self, text: &str) -> bool {
        self.escape_patterns.iter().any(|p| p.is_match(text))
    }

    /// Replace every escape pattern with the blocked marker
    ///
    /// Idempotent: the marker itself matches no pattern.
    pub fn strip_tool_call_patterns(&self, text: &str) -> String {
        let mut result = text.to_string();
        for pattern in &self.escape_patterns {
            result = pattern.replace_all(&result, BLOCKED_MARKER).into_owned();
        }
        result
    }
}
