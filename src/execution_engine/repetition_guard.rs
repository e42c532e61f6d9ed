//! Repetition guard — count and semantic circuit breakers
//!
//! Checked before dispatch of every invocation. The count breaker
//! refuses a tool once its dispatched-call count reaches the threshold.
//! The semantic breaker canonicalizes extracted queries into term sets,
//! maps similar queries onto the same group (FNV-1a of the sorted term
//! set; exact repeats hit an O(1) fast path) and refuses when either the
//! raw per-tool ceiling or the per-group ceiling is exceeded.

use std::collections::{BTreeSet, HashMap};

use crate::config::EngineConfig;
use crate::llm::ToolInvocation;
use crate::reasoning_state::{FailureEvent, FailureType, ReasoningLedger};

use super::query_terms::{extract_query_param, extract_terms, group_hash, jaccard};

/// Guard verdict for one invocation
#[derive(Debug)]
pub enum GuardDecision {
    Allow,
    Refuse {
        failure: FailureEvent,
        /// Actionable message placed in the synthetic error result
        message: String,
        /// Metadata for the breaker trace step
        metadata: Vec<(String, String)>,
    },
}

impl GuardDecision {
    pub fn is_refusal(&self) -> bool {
        matches!(self, GuardDecision::Refuse { .. })
    }
}

#[derive(Debug)]
struct SemanticGroup {
    hash: u64,
    /// Term set of the group's first member
    representative: BTreeSet<String>,
    count: usize,
}

#[derive(Debug, Default)]
struct SemanticTracker {
    raw_count: usize,
    /// Exact term-set hash → group index (O(1) fast path)
    exact: HashMap<u64, usize>,
    groups: Vec<SemanticGroup>,
}

/// Per-session repetition guard
pub struct RepetitionGuard {
    count_threshold: usize,
    max_per_tool: usize,
    max_semantic_group: usize,
    similarity_threshold: f64,
    semantic: HashMap<String, SemanticTracker>,
}

impl RepetitionGuard {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            count_threshold: config.count_circuit_breaker_threshold,
            max_per_tool: config.max_per_tool,
            max_semantic_group: config.max_semantic_group,
            similarity_threshold: config.semantic_repetition_threshold,
            semantic: HashMap::new(),
        }
    }

    /// Check an invocation immediately before dispatch
    pub fn check(
        &mut self,
        session_id: &str,
        ledger: &ReasoningLedger,
        invocation: &ToolInvocation,
    ) -> GuardDecision {
        let tool = invocation.tool.as_str();

        // Count breaker: dispatched-call counts derived from the trace
        let count = ledger.count_tool_executions(session_id, tool);
        if count >= self.count_threshold {
            return GuardDecision::Refuse {
                failure: FailureEvent::new(FailureType::CircuitBreaker, session_id, tool),
                message: format!(
                    "Tool '{}' call count threshold exceeded ({} calls already made); \
                     synthesize an answer from the results gathered so far.",
                    tool, count
                ),
                metadata: vec![
                    ("count".to_string(), count.to_string()),
                    ("threshold".to_string(), self.count_threshold.to_string()),
                ],
            };
        }

        // Semantic breaker over the extracted query
        let tracker = self.semantic.entry(tool.to_string()).or_default();
        tracker.raw_count += 1;
        if tracker.raw_count > self.max_per_tool {
            return GuardDecision::Refuse {
                failure: FailureEvent::new(FailureType::CircuitBreaker, session_id, tool),
                message: format!(
                    "Tool '{}' exceeded its per-tool ceiling of {} calls; \
                     synthesize an answer from the results gathered so far.",
                    tool, self.max_per_tool
                ),
                metadata: vec![
                    ("raw_count".to_string(), tracker.raw_count.to_string()),
                    ("max_per_tool".to_string(), self.max_per_tool.to_string()),
                ],
            };
        }

        let Some(query) = extract_query_param(invocation) else {
            return GuardDecision::Allow;
        };
        let terms = extract_terms(&query);
        let hash = group_hash(&terms);

        // Exact repeats take the O(1) path
        let group_index = match tracker.exact.get(&hash) {
            Some(&index) => index,
            None => {
                let similar = tracker.groups.iter().position(|g| {
                    jaccard(&g.representative, &terms) >= self.similarity_threshold
                });
                let index = match similar {
                    Some(index) => index,
                    None => {
                        tracker.groups.push(SemanticGroup {
                            hash,
                            representative: terms,
                            count: 0,
                        });
                        tracker.groups.len() - 1
                    }
                };
                tracker.exact.insert(hash, index);
                index
            }
        };

        let group = &mut tracker.groups[group_index];
        group.count += 1;
        if group.count > self.max_semantic_group {
            return GuardDecision::Refuse {
                failure: FailureEvent::new(FailureType::SemanticRepetition, session_id, tool),
                message: format!(
                    "Tool '{}' was already asked semantically equivalent queries {} times \
                     (query: '{}'); rephrasing the same lookup will not produce new evidence.",
                    tool, group.count, query
                ),
                metadata: vec![
                    ("group".to_string(), format!("{:016x}", group.hash)),
                    ("group_count".to_string(), group.count.to_string()),
                    (
                        "max_semantic_group".to_string(),
                        self.max_semantic_group.to_string(),
                    ),
                ],
            };
        }

        GuardDecision::Allow
    }
}
