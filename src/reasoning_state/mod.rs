//! Reasoning ledger — per-session record of decisions, proofs, clauses
//!
//! The ledger is the engine's memory of what it already tried: trace
//! steps (append-only), proof numbers per decision point, learned
//! clauses, and per-tool statistics. Operations are atomic at session
//! granularity behind one internal lock; trace vectors are copy-on-write
//! (`Arc::make_mut`) so prompt-construction reads never clone the log.

mod clauses;
mod failure;
mod proof;
mod trace;

pub use clauses::{clause_from_failure, Clause, ClauseStore, DecisionFacts, Literal};
pub use failure::{FailureEvent, FailureType, SignalSource};
pub use proof::{node_id, ProofIndex, ProofNode, ProofUpdate, ProofUpdateType};
pub use trace::{Actor, StepAction, TraceStep};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Aggregate execution statistics for one (session, tool)
#[derive(Debug, Clone, Default)]
pub struct ToolStats {
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
    pub total_duration: Duration,
}

impl ToolStats {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.successes as f64 / self.total as f64
    }
}

#[derive(Default)]
struct LedgerInner {
    /// Trace per session; copy-on-write for cheap reads
    traces: HashMap<String, Arc<Vec<TraceStep>>>,
    /// Next step number per session (strictly monotonic, starts at 1)
    counters: HashMap<String, u64>,
    proofs: ProofIndex,
    clauses: ClauseStore,
    stats: HashMap<(String, String), ToolStats>,
    /// Graph-derived dependency lookups, dropped on refresh
    graph_cache: HashMap<String, Vec<String>>,
}

/// Per-session ledger of steps, proof numbers, clauses, and statistics
pub struct ReasoningLedger {
    proof_number_threshold: u64,
    inner: Mutex<LedgerInner>,
}

impl ReasoningLedger {
    pub fn new() -> Self {
        Self::with_proof_threshold(100)
    }

    /// Ledger whose proof-number breaker fires above `threshold`
    pub fn with_proof_threshold(threshold: u64) -> Self {
        Self {
            proof_number_threshold: threshold,
            inner: Mutex::new(LedgerInner::default()),
        }
    }

    /// Append a trace step; returns the issued step number
    pub fn record_trace_step(&self, session_id: &str, mut step: TraceStep) -> u64 {
        let mut inner = self.inner.lock().unwrap();

        let counter = inner.counters.entry(session_id.to_string()).or_insert(0);
        *counter += 1;
        step.step_number = *counter;

        if step.is_dispatch() {
            let stats = inner
                .stats
                .entry((session_id.to_string(), step.tool.clone()))
                .or_default();
            stats.total += 1;
            if step.error.is_none() {
                stats.successes += 1;
            } else {
                stats.failures += 1;
            }
            stats.total_duration += step.duration;
        }

        let number = step.step_number;
        let trace = inner
            .traces
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Vec::new()));
        Arc::make_mut(trace).push(step);
        number
    }

    /// Full step history (cheap; shares the underlying vector)
    pub fn step_history(&self, session_id: &str) -> Arc<Vec<TraceStep>> {
        let inner = self.inner.lock().unwrap();
        inner
            .traces
            .get(session_id)
            .cloned()
            .unwrap_or_else(|| Arc::new(Vec::new()))
    }

    /// Most recent step of any action
    pub fn last_step(&self, session_id: &str) -> Option<TraceStep> {
        let inner = self.inner.lock().unwrap();
        inner.traces.get(session_id)?.last().cloned()
    }

    /// Most recent dispatched step (tool_call or tool_call_forced)
    pub fn last_dispatch(&self, session_id: &str) -> Option<TraceStep> {
        let inner = self.inner.lock().unwrap();
        inner
            .traces
            .get(session_id)?
            .iter()
            .rev()
            .find(|s| s.is_dispatch())
            .cloned()
    }

    /// Dispatched tool calls so far for a tool
    pub fn count_tool_executions(&self, session_id: &str, tool: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .traces
            .get(session_id)
            .map(|t| {
                t.iter()
                    .filter(|s| s.is_dispatch() && s.tool == tool)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Aggregate statistics for a tool in a session
    pub fn tool_stats(&self, session_id: &str, tool: &str) -> Option<ToolStats> {
        let inner = self.inner.lock().unwrap();
        inner
            .stats
            .get(&(session_id.to_string(), tool.to_string()))
            .cloned()
    }

    /// Apply one proof-number update
    pub fn update_proof_number(&self, update: ProofUpdate) {
        let mut inner = self.inner.lock().unwrap();
        inner.proofs.apply(&update);
    }

    /// Disprove the decision node for a tool, creating it on demand,
    /// and propagate to ancestors
    pub fn mark_tool_disproven(&self, session_id: &str, tool: &str) {
        let id = node_id(session_id, tool);
        let mut inner = self.inner.lock().unwrap();
        inner.proofs.mark_disproven(&id);
    }

    /// Register a parent relation between decision nodes
    pub fn add_proof_parent(&self, child: &str, parent: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.proofs.add_parent(child, parent);
    }

    /// Re-run disproof propagation from a node
    pub fn propagate_disproof(&self, node_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.proofs.propagate_disproof(node_id);
    }

    /// Whether the proof-level breaker fires for a tool
    ///
    /// Fires when the node is disproven or its proof number exceeds the
    /// configured threshold. Returns the reason on fire.
    pub fn check_circuit_breaker(&self, session_id: &str, tool: &str) -> Option<String> {
        let id = node_id(session_id, tool);
        let inner = self.inner.lock().unwrap();
        if inner.proofs.is_disproven(&id) {
            return Some(format!("decision node {} is disproven", id));
        }
        match inner.proofs.proof_number(&id) {
            Some(pn) if pn > self.proof_number_threshold => Some(format!(
                "proof number {} exceeds threshold {}",
                pn, self.proof_number_threshold
            )),
            _ => None,
        }
    }

    /// Facts about a candidate decision, derived from the last dispatch
    pub fn decision_facts(&self, session_id: &str, candidate_tool: &str) -> DecisionFacts {
        let last = self.last_dispatch(session_id);
        DecisionFacts {
            tool: candidate_tool.to_string(),
            prev_tool: last.as_ref().map(|s| s.tool.clone()),
            prev_outcome: last.as_ref().map(|s| {
                if s.error.is_none() {
                    "success".to_string()
                } else {
                    "failure".to_string()
                }
            }),
            prev_error_category: last
                .as_ref()
                .and_then(|s| s.metadata.get("error_category").cloned()),
        }
    }

    /// Consult the clause store before a tool selection
    ///
    /// Err carries the id of the first violated clause.
    pub fn check_decision_allowed(&self, session_id: &str, tool: &str) -> Result<(), String> {
        let facts = self.decision_facts(session_id, tool);
        let inner = self.inner.lock().unwrap();
        match inner.clauses.check(session_id, &facts) {
            Some(clause) => Err(clause.id.clone()),
            None => Ok(()),
        }
    }

    /// Add a pre-built clause; false when an equivalent exists
    pub fn add_clause(&self, clause: Clause) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.clauses.add(clause)
    }

    /// Learn a clause from a failure event, if its source allows
    ///
    /// For cycle failures the previous tool is the dispatch before the
    /// cycle-closing one. Returns the new clause id.
    pub fn learn_from_failure(&self, event: &FailureEvent) -> Option<String> {
        let prev_tool = match event.failure_type {
            FailureType::Cycle => {
                let history = self.step_history(&event.session_id);
                let mut dispatches = history.iter().rev().filter(|s| s.is_dispatch());
                dispatches.next();
                dispatches.next().map(|s| s.tool.clone())
            }
            _ => None,
        };
        let clause = clause_from_failure(event, prev_tool.as_deref())?;
        let id = clause.id.clone();
        let mut inner = self.inner.lock().unwrap();
        if inner.clauses.add(clause) {
            Some(id)
        } else {
            None
        }
    }

    /// All clauses learned for a session
    pub fn clauses_for(&self, session_id: &str) -> Vec<Clause> {
        let inner = self.inner.lock().unwrap();
        inner.clauses.for_session(session_id).to_vec()
    }

    /// Cache a graph-derived dependency lookup
    pub fn cache_dependencies(&self, key: &str, values: Vec<String>) {
        let mut inner = self.inner.lock().unwrap();
        inner.graph_cache.insert(key.to_string(), values);
    }

    /// Cached dependency lookup, if still valid
    pub fn cached_dependencies(&self, key: &str) -> Option<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        inner.graph_cache.get(key).cloned()
    }

    /// Drop all graph-derived caches (called on graph refresh)
    pub fn invalidate_graph_cache(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.graph_cache.clear();
    }
}

impl Default for ReasoningLedger {
    fn default() -> Self {
        Self::new()
    }
}
