//! Learned clauses — prohibitions derived from hard failure signals
//!
//! A clause is a disjunction of negated literals. It is violated when
//! every literal's underlying fact holds for a candidate decision, in
//! which case the decision is refused with the clause id as reason.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::failure::{FailureEvent, FailureType, SignalSource};

/// One negated literal in a clause
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Literal {
    /// ¬tool:X — the candidate tool is X
    Tool(String),
    /// ¬prev_tool:Y — the previous dispatched tool was Y
    PrevTool(String),
    /// ¬error:category — the previous step failed with this category
    ErrorCategory(String),
    /// ¬outcome:value — the previous step had this outcome
    Outcome(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Tool(t) => write!(f, "¬tool:{}", t),
            Literal::PrevTool(t) => write!(f, "¬prev_tool:{}", t),
            Literal::ErrorCategory(c) => write!(f, "¬error:{}", c),
            Literal::Outcome(o) => write!(f, "¬outcome:{}", o),
        }
    }
}

/// Facts about a candidate decision, derived from the last trace step
#[derive(Debug, Clone, Default)]
pub struct DecisionFacts {
    /// Candidate tool about to be dispatched
    pub tool: String,
    /// Tool of the last dispatched step
    pub prev_tool: Option<String>,
    /// Outcome of the last dispatched step ("success" / "failure")
    pub prev_outcome: Option<String>,
    /// Error category of the last dispatched step
    pub prev_error_category: Option<String>,
}

impl Literal {
    /// Whether the underlying (non-negated) fact holds
    fn holds(&self, facts: &DecisionFacts) -> bool {
        match self {
            Literal::Tool(t) => facts.tool == *t,
            Literal::PrevTool(t) => facts.prev_tool.as_deref() == Some(t.as_str()),
            Literal::ErrorCategory(c) => {
                facts.prev_error_category.as_deref() == Some(c.as_str())
            }
            Literal::Outcome(o) => facts.prev_outcome.as_deref() == Some(o.as_str()),
        }
    }
}

/// A learned prohibition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clause {
    /// `clause_<failure-type>_<tool>_<shortuuid>`
    pub id: String,
    /// Ordered negated literals
    pub literals: Vec<Literal>,
    /// Always Hard or Safety
    pub source: SignalSource,
    pub failure_type: FailureType,
    pub session_id: String,
}

impl Clause {
    fn new(
        failure_type: FailureType,
        source: SignalSource,
        session_id: impl Into<String>,
        tool: &str,
        literals: Vec<Literal>,
    ) -> Self {
        let short = uuid::Uuid::new_v4().simple().to_string();
        Self {
            id: format!(
                "clause_{}_{}_{}",
                failure_type.as_str(),
                tool,
                &short[..8]
            ),
            literals,
            source,
            failure_type,
            session_id: session_id.into(),
        }
    }

    /// Violated iff every negated fact holds for the candidate
    pub fn is_violated(&self, facts: &DecisionFacts) -> bool {
        !self.literals.is_empty() && self.literals.iter().all(|l| l.holds(facts))
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, literal) in self.literals.iter().enumerate() {
            if i > 0 {
                write!(f, " ∨ ")?;
            }
            write!(f, "{}", literal)?;
        }
        write!(f, ")")
    }
}

/// Build a clause from a failure event, or None when the signal must
/// not be learned from
///
/// Templates per failure type:
/// - cycle: `¬tool:X ∨ ¬prev_tool:Y`
/// - circuit breaker / semantic repetition: `¬tool:X ∨ ¬outcome:success`
/// - tool error with a known category: `¬tool:X ∨ ¬error:category`
/// - safety violation: `¬tool:X`
pub fn clause_from_failure(event: &FailureEvent, prev_tool: Option<&str>) -> Option<Clause> {
    if !event.source.learnable() {
        return None;
    }

    let literals = match event.failure_type {
        FailureType::Cycle => {
            let prev = prev_tool?;
            vec![
                Literal::Tool(event.tool.clone()),
                Literal::PrevTool(prev.to_string()),
            ]
        }
        FailureType::CircuitBreaker | FailureType::SemanticRepetition => vec![
            Literal::Tool(event.tool.clone()),
            Literal::Outcome("success".to_string()),
        ],
        FailureType::ToolError => {
            let category = event.error_category.as_ref()?;
            vec![
                Literal::Tool(event.tool.clone()),
                Literal::ErrorCategory(category.clone()),
            ]
        }
        FailureType::Safety => vec![Literal::Tool(event.tool.clone())],
        FailureType::BatchFiltered => return None,
    };

    Some(Clause::new(
        event.failure_type,
        event.source,
        event.session_id.clone(),
        &event.tool,
        literals,
    ))
}

/// Per-session clause store
#[derive(Debug, Default)]
pub struct ClauseStore {
    clauses: std::collections::HashMap<String, Vec<Clause>>,
}

impl ClauseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a clause, deduplicating identical literal sets per session
    ///
    /// Returns false when an equivalent clause already exists.
    pub fn add(&mut self, clause: Clause) -> bool {
        debug_assert!(clause.source.learnable());
        let session = self.clauses.entry(clause.session_id.clone()).or_default();
        if session.iter().any(|c| c.literals == clause.literals) {
            return false;
        }
        session.push(clause);
        true
    }

    /// First clause the candidate would violate, in insertion order
    pub fn check(&self, session_id: &str, facts: &DecisionFacts) -> Option<&Clause> {
        self.clauses
            .get(session_id)?
            .iter()
            .find(|c| c.is_violated(facts))
    }

    /// All clauses for a session
    pub fn for_session(&self, session_id: &str) -> &[Clause] {
        self.clauses
            .get(session_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cycle_event() -> FailureEvent {
        FailureEvent::new(FailureType::Cycle, "s1", "find_callers")
    }

    #[test]
    fn test_cycle_clause_template() {
        let clause = clause_from_failure(&cycle_event(), Some("find_callees")).unwrap();
        assert_eq!(
            clause.literals,
            vec![
                Literal::Tool("find_callers".to_string()),
                Literal::PrevTool("find_callees".to_string()),
            ]
        );
        assert!(clause.id.starts_with("clause_cycle_find_callers_"));
        assert_eq!(
            format!("{}", clause),
            "(¬tool:find_callers ∨ ¬prev_tool:find_callees)"
        );
    }

    #[test]
    fn test_cycle_clause_requires_prev_tool() {
        assert!(clause_from_failure(&cycle_event(), None).is_none());
    }

    #[test]
    fn test_soft_signals_never_learn() {
        let event = FailureEvent::new(FailureType::BatchFiltered, "s1", "find_callers");
        assert!(clause_from_failure(&event, Some("x")).is_none());
    }

    #[test]
    fn test_tool_error_requires_category() {
        let event = FailureEvent::new(FailureType::ToolError, "s1", "find_references");
        assert!(clause_from_failure(&event, None).is_none());

        let event = event.with_error_category("timeout");
        let clause = clause_from_failure(&event, None).unwrap();
        assert_eq!(
            clause.literals,
            vec![
                Literal::Tool("find_references".to_string()),
                Literal::ErrorCategory("timeout".to_string()),
            ]
        );
    }

    #[test]
    fn test_safety_clause_is_unconditional_on_tool() {
        let event = FailureEvent::new(FailureType::Safety, "s1", "file_write");
        let clause = clause_from_failure(&event, None).unwrap();
        assert_eq!(clause.literals, vec![Literal::Tool("file_write".to_string())]);

        let facts = DecisionFacts {
            tool: "file_write".to_string(),
            ..Default::default()
        };
        assert!(clause.is_violated(&facts));
    }

    #[test]
    fn test_violation_requires_all_literals() {
        let clause = clause_from_failure(&cycle_event(), Some("find_callees")).unwrap();

        let mut facts = DecisionFacts {
            tool: "find_callers".to_string(),
            prev_tool: Some("find_symbol".to_string()),
            ..Default::default()
        };
        assert!(!clause.is_violated(&facts));

        facts.prev_tool = Some("find_callees".to_string());
        assert!(clause.is_violated(&facts));
    }

    #[test]
    fn test_store_dedupes_identical_literals() {
        let mut store = ClauseStore::new();
        let a = clause_from_failure(&cycle_event(), Some("find_callees")).unwrap();
        let b = clause_from_failure(&cycle_event(), Some("find_callees")).unwrap();
        assert!(store.add(a));
        assert!(!store.add(b));
        assert_eq!(store.for_session("s1").len(), 1);
    }

    #[test]
    fn test_first_violated_clause_wins() {
        let mut store = ClauseStore::new();
        let first = clause_from_failure(&cycle_event(), Some("find_callees")).unwrap();
        let first_id = first.id.clone();
        store.add(first);

        let event = FailureEvent::new(FailureType::Safety, "s1", "find_callers");
        store.add(clause_from_failure(&event, None).unwrap());

        let facts = DecisionFacts {
            tool: "find_callers".to_string(),
            prev_tool: Some("find_callees".to_string()),
            ..Default::default()
        };
        let hit = store.check("s1", &facts).unwrap();
        assert_eq!(hit.id, first_id);
    }

    #[test]
    fn test_sessions_are_isolated() {
        let mut store = ClauseStore::new();
        store.add(clause_from_failure(&cycle_event(), Some("find_callees")).unwrap());

        let facts = DecisionFacts {
            tool: "find_callers".to_string(),
            prev_tool: Some("find_callees".to_string()),
            ..Default::default()
        };
        assert!(store.check("s2", &facts).is_none());
    }
}
