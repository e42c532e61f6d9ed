//! Failure signals — what went wrong and whether it is safe to learn from
//!
//! Hard signals come from mechanical truth (cycles, breakers, safety,
//! deterministic tool errors) and may produce clauses. Soft signals are
//! LLM opinion; they are recorded but never learned from, which keeps
//! model feedback out of the learned constraint set.

use serde::{Deserialize, Serialize};

/// Kind of failure observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    Cycle,
    CircuitBreaker,
    ToolError,
    Safety,
    SemanticRepetition,
    BatchFiltered,
}

impl FailureType {
    /// Stable tag used in clause ids and trace metadata
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureType::Cycle => "cycle",
            FailureType::CircuitBreaker => "circuit_breaker",
            FailureType::ToolError => "tool_error",
            FailureType::Safety => "safety",
            FailureType::SemanticRepetition => "semantic_repetition",
            FailureType::BatchFiltered => "batch_filtered",
        }
    }

    /// Signal source this failure kind carries by construction
    pub fn default_source(&self) -> SignalSource {
        match self {
            FailureType::Cycle
            | FailureType::CircuitBreaker
            | FailureType::ToolError
            | FailureType::SemanticRepetition => SignalSource::Hard,
            FailureType::Safety => SignalSource::Safety,
            FailureType::BatchFiltered => SignalSource::Soft,
        }
    }
}

/// Where a failure signal originates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    /// Mechanical truth — safe to learn from
    Hard,
    /// Policy engine — safe to learn from
    Safety,
    /// LLM opinion — recorded, never learned from
    Soft,
}

impl SignalSource {
    /// Whether clauses may be generated from this source
    pub fn learnable(&self) -> bool {
        matches!(self, SignalSource::Hard | SignalSource::Safety)
    }
}

/// A signal worth recording, consumed by the clause generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEvent {
    pub failure_type: FailureType,
    pub source: SignalSource,
    pub session_id: String,
    pub tool: String,
    /// Stable error category, when the tool failed deterministically
    pub error_category: Option<String>,
    /// Decision path leading to the failure (tool names, oldest first)
    pub decision_path: Vec<String>,
}

impl FailureEvent {
    /// Event with the source implied by the failure type
    pub fn new(
        failure_type: FailureType,
        session_id: impl Into<String>,
        tool: impl Into<String>,
    ) -> Self {
        Self {
            failure_type,
            source: failure_type.default_source(),
            session_id: session_id.into(),
            tool: tool.into(),
            error_category: None,
            decision_path: Vec::new(),
        }
    }

    pub fn with_error_category(mut self, category: impl Into<String>) -> Self {
        self.error_category = Some(category.into());
        self
    }

    pub fn with_decision_path(mut self, path: Vec<String>) -> Self {
        self.decision_path = path;
        self
    }
}
