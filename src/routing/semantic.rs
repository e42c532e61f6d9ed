//! Semantic validation of router output
//!
//! Catches one well-known router mistake: confusing "callers of X"
//! (edges into X) with "things X calls" (edges out of X). The rules are
//! phrase patterns; the direction the query names wins over the router.

use dashmap::DashMap;
use regex::Regex;

/// Outcome of semantic validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticValidation {
    /// Tool to use (the original or the corrected one)
    pub tool: String,
    pub was_changed: bool,
    /// Why the correction applied
    pub reason: Option<String>,
}

/// Call-graph direction a query asks about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallDirection {
    /// Edges into the symbol (who calls it)
    Inbound,
    /// Edges out of the symbol (what it calls)
    Outbound,
}

/// Rule-based validator for call-direction queries
pub struct SemanticValidator {
    inbound_phrases: Vec<&'static str>,
    outbound_phrases: Vec<&'static str>,
    outbound_pattern: Regex,
}

impl SemanticValidator {
    pub fn new() -> Self {
        Self {
            inbound_phrases: vec!["who calls", "callers of", "called by", "is called from"],
            outbound_phrases: vec!["callees of", "calls made by", "what is called by"],
            // "what does X call", "what do the handlers call"
            outbound_pattern: Regex::new(r"(?i)what\s+do(?:es)?\s+\S+.*\bcall").unwrap(),
        }
    }

    fn direction(&self, query: &str) -> Option<CallDirection> {
        let lowered = query.to_lowercase();
        // Outbound patterns first: "what does X call" also contains "call"
        if self.outbound_pattern.is_match(query)
            || self.outbound_phrases.iter().any(|p| lowered.contains(p))
        {
            return Some(CallDirection::Outbound);
        }
        if self.inbound_phrases.iter().any(|p| lowered.contains(p)) {
            return Some(CallDirection::Inbound);
        }
        None
    }

    /// Validate a routed tool against the direction the query names
    ///
    /// Only `find_callers`/`find_callees` are ever corrected; other
    /// tools pass through unchanged.
    pub fn validate_tool_query_semantics(
        &self,
        query: &str,
        selected_tool: &str,
    ) -> SemanticValidation {
        let expected = match self.direction(query) {
            Some(CallDirection::Inbound) => "find_callers",
            Some(CallDirection::Outbound) => "find_callees",
            None => {
                return SemanticValidation {
                    tool: selected_tool.to_string(),
                    was_changed: false,
                    reason: None,
                }
            }
        };

        let corrigible = selected_tool == "find_callers" || selected_tool == "find_callees";
        if !corrigible || selected_tool == expected {
            return SemanticValidation {
                tool: selected_tool.to_string(),
                was_changed: false,
                reason: None,
            };
        }

        SemanticValidation {
            tool: expected.to_string(),
            was_changed: true,
            reason: Some(format!(
                "query names the {} direction; {} answers the opposite one",
                match expected {
                    "find_callers" => "inbound",
                    _ => "outbound",
                },
                selected_tool
            )),
        }
    }
}

impl Default for SemanticValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide dedup cache for semantic corrections
///
/// A correction is recorded (traced and warned about) once per session
/// per (query-prefix, corrected-tool) key, so EXECUTE re-entries do not
/// duplicate trace steps. Purely an optimization: losing the contents
/// only repeats a warning.
pub struct CorrectionCache {
    seen: DashMap<(String, String, String), ()>,
}

const QUERY_PREFIX_LEN: usize = 32;

impl CorrectionCache {
    pub fn new() -> Self {
        Self {
            seen: DashMap::new(),
        }
    }

    /// True exactly once per (session, query-prefix, corrected-tool)
    pub fn first_time(&self, session_id: &str, query: &str, corrected_tool: &str) -> bool {
        let prefix: String = query.chars().take(QUERY_PREFIX_LEN).collect();
        let key = (
            session_id.to_string(),
            prefix,
            corrected_tool.to_string(),
        );
        self.seen.insert(key, ()).is_none()
    }
}

impl Default for CorrectionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_query_corrects_callers_to_callees() {
        let validator = SemanticValidator::new();
        let result = validator.validate_tool_query_semantics("what does main call?", "find_callers");
        assert_eq!(result.tool, "find_callees");
        assert!(result.was_changed);
        assert!(result.reason.is_some());
    }

    #[test]
    fn test_inbound_query_corrects_callees_to_callers() {
        let validator = SemanticValidator::new();
        let result =
            validator.validate_tool_query_semantics("callers of parseConfig", "find_callees");
        assert_eq!(result.tool, "find_callers");
        assert!(result.was_changed);
    }

    #[test]
    fn test_matching_direction_passes_through() {
        let validator = SemanticValidator::new();
        let result = validator.validate_tool_query_semantics("who calls Handler", "find_callers");
        assert_eq!(result.tool, "find_callers");
        assert!(!result.was_changed);
    }

    #[test]
    fn test_unrelated_tool_never_corrected() {
        let validator = SemanticValidator::new();
        let result = validator.validate_tool_query_semantics("who calls Handler", "find_symbol");
        assert_eq!(result.tool, "find_symbol");
        assert!(!result.was_changed);
    }

    #[test]
    fn test_directionless_query_passes_through() {
        let validator = SemanticValidator::new();
        let result =
            validator.validate_tool_query_semantics("list the packages", "find_callers");
        assert!(!result.was_changed);
    }

    #[test]
    fn test_what_do_plural_pattern() {
        let validator = SemanticValidator::new();
        let result = validator
            .validate_tool_query_semantics("what do the request handlers call?", "find_callers");
        assert_eq!(result.tool, "find_callees");
        assert!(result.was_changed);
    }

    #[test]
    fn test_correction_cache_dedupes() {
        let cache = CorrectionCache::new();
        assert!(cache.first_time("s1", "what does main call?", "find_callees"));
        assert!(!cache.first_time("s1", "what does main call?", "find_callees"));
        // Different session, same query: recorded again
        assert!(cache.first_time("s2", "what does main call?", "find_callees"));
        // Same session, different corrected tool
        assert!(cache.first_time("s1", "what does main call?", "find_callers"));
    }

    #[test]
    fn test_correction_cache_uses_prefix() {
        let cache = CorrectionCache::new();
        let long_a = format!("{}{}", "x".repeat(32), "tail one");
        let long_b = format!("{}{}", "x".repeat(32), "different tail");
        assert!(cache.first_time("s1", &long_a, "find_callees"));
        // Same 32-char prefix collapses to the same key
        assert!(!cache.first_time("s1", &long_b, "find_callees"));
    }
}
