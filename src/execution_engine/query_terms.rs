//! Query canonicalization — term sets, similarity, group hashing
//!
//! "find_callers(parseConfig)", "find_callers(parse_config)" and
//! "find_callers(ParseConfig)" must land on the same term set, so
//! canonicalization splits camelCase and snake_case alike before
//! lowercasing.

use std::collections::BTreeSet;

use crate::llm::ToolInvocation;

use super::cycle_detector::fnv1a_64;

/// Parameter names tried, in order, when extracting a query string from
/// an invocation
pub const QUERY_PARAM_CANDIDATES: &[&str] = &[
    "pattern",
    "query",
    "function_name",
    "symbol_name",
    "interface_name",
    "package",
    "name",
    "symbol",
    "path",
];

/// The invocation's query parameter, by candidate order
pub fn extract_query_param(invocation: &ToolInvocation) -> Option<String> {
    QUERY_PARAM_CANDIDATES
        .iter()
        .find_map(|key| invocation.arg_str(key))
        .map(String::from)
}

/// Canonical term set: split on non-alphanumerics and camelCase humps,
/// lowercase everything, drop empties
pub fn extract_terms(text: &str) -> BTreeSet<String> {
    let mut terms = BTreeSet::new();
    let mut current = String::new();

    let mut previous_lower = false;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if ch.is_uppercase() && previous_lower && !current.is_empty() {
                terms.insert(std::mem::take(&mut current));
            }
            current.extend(ch.to_lowercase());
            previous_lower = ch.is_lowercase() || ch.is_numeric();
        } else {
            if !current.is_empty() {
                terms.insert(std::mem::take(&mut current));
            }
            previous_lower = false;
        }
    }
    if !current.is_empty() {
        terms.insert(current);
    }
    terms
}

/// Jaccard similarity |A∩B| / |A∪B| over canonical term sets
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        1.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Stable group id: FNV-1a over the sorted canonical terms
pub fn group_hash(terms: &BTreeSet<String>) -> u64 {
    let mut bytes = Vec::new();
    for term in terms {
        bytes.extend_from_slice(term.as_bytes());
        bytes.push(0x1f);
    }
    fnv1a_64(&bytes)
}
