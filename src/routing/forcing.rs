//! Rule-based parameter extraction for hard forcing
//!
//! For a fixed set of tools, parameters can be derived from the user
//! query with regular expressions and small heuristics. When extraction
//! succeeds the tool runs directly and no LLM call is billed for that
//! step. Extraction is conservative: any doubt returns None and the
//! normal LLM path runs instead.

use regex::Regex;
use serde_json::json;

use crate::llm::ToolInvocation;

/// Upper bound accepted for "top N" extraction
const MAX_TOP_N: usize = 100;

/// Tools whose parameters are rule-extractable
const FORCEABLE_TOOLS: &[&str] = &[
    "find_path",
    "find_callers",
    "find_callees",
    "find_references",
    "find_symbol",
    "list_packages",
];

/// Deterministic parameter extractor
///
/// All patterns are compiled once at construction.
pub struct ParameterExtractor {
    top_n: Regex,
    path_endpoints: Regex,
    quoted_name: Regex,
    call_like: Regex,
    identifier: Regex,
    package_name: Regex,
}

impl ParameterExtractor {
    pub fn new() -> Self {
        Self {
            top_n: Regex::new(r"(?i)\btop\s+(\d{1,4})\b").unwrap(),
            path_endpoints: Regex::new(
                r"(?i)\bfrom\s+([A-Za-z_][A-Za-z0-9_:.]*)\s+to\s+([A-Za-z_][A-Za-z0-9_:.]*)",
            )
            .unwrap(),
            quoted_name: Regex::new(r#"["'`]([A-Za-z_][A-Za-z0-9_:.]*)["'`]"#).unwrap(),
            call_like: Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*\(\s*\)?").unwrap(),
            identifier: Regex::new(r"\b([a-z][a-z0-9]*[_A-Z][A-Za-z0-9_]*|[A-Z][A-Za-z0-9_]+)\b")
                .unwrap(),
            package_name: Regex::new(r"(?i)\b(?:package|crate|module)\s+([A-Za-z_][A-Za-z0-9_-]*)")
                .unwrap(),
        }
    }

    /// Whether a tool is in the forceable set
    pub fn is_forceable(&self, tool: &str) -> bool {
        FORCEABLE_TOOLS.contains(&tool)
    }

    /// Extract "top N" from a query; rejects N outside [1, 100]
    pub fn extract_top_n_from_query(&self, query: &str) -> Option<usize> {
        let captures = self.top_n.captures(query)?;
        let n: usize = captures.get(1)?.as_str().parse().ok()?;
        if (1..=MAX_TOP_N).contains(&n) {
            Some(n)
        } else {
            None
        }
    }

    /// Extract "from X to Y" endpoints
    pub fn extract_path_endpoints(&self, query: &str) -> Option<(String, String)> {
        let captures = self.path_endpoints.captures(query)?;
        Some((
            captures.get(1)?.as_str().to_string(),
            captures.get(2)?.as_str().to_string(),
        ))
    }

    /// Extract the most plausible symbol name
    ///
    /// Preference order: quoted name, call-like `name()`, then the last
    /// camelCase / snake_case / Capitalized identifier.
    pub fn extract_symbol_name(&self, query: &str) -> Option<String> {
        if let Some(captures) = self.quoted_name.captures(query) {
            return Some(captures.get(1)?.as_str().to_string());
        }
        if let Some(captures) = self.call_like.captures(query) {
            return Some(captures.get(1)?.as_str().to_string());
        }
        self.identifier
            .captures_iter(query)
            .last()
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// Classify the symbol kind the query asks about
    pub fn classify_symbol_kind(&self, query: &str) -> Option<&'static str> {
        let lowered = query.to_lowercase();
        if ["function", "fn ", "method"].iter().any(|k| lowered.contains(k)) {
            Some("function")
        } else if ["struct", "type", "class", "trait", "interface"]
            .iter()
            .any(|k| lowered.contains(k))
        {
            Some("type")
        } else if ["package", "crate", "module"].iter().any(|k| lowered.contains(k)) {
            Some("package")
        } else {
            None
        }
    }

    /// Extract an explicit package name
    pub fn extract_package_name(&self, query: &str) -> Option<String> {
        self.package_name
            .captures(query)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// Build the forced invocation for a tool, when extraction succeeds
    pub fn prepare(&self, tool: &str, query: &str) -> Option<ToolInvocation> {
        if !self.is_forceable(tool) {
            return None;
        }
        let arguments = match tool {
            "find_path" => {
                let (from, to) = self.extract_path_endpoints(query)?;
                json!({"from": from, "to": to})
            }
            "find_callers" | "find_callees" | "find_references" => {
                let symbol = self.extract_symbol_name(query)?;
                json!({"symbol": symbol})
            }
            "find_symbol" => {
                let name = self.extract_symbol_name(query)?;
                match self.classify_symbol_kind(query) {
                    Some(kind) => json!({"name": name, "kind": kind}),
                    None => json!({"name": name}),
                }
            }
            "list_packages" => match self.extract_top_n_from_query(query) {
                Some(n) => json!({"limit": n}),
                None => json!({}),
            },
            _ => return None,
        };
        Some(ToolInvocation::new(tool, arguments))
    }
}

impl Default for ParameterExtractor {
    fn default() -> Self {
        Self::new()
    }
}
