//! Trace steps — the append-only decision ledger entries
//!
//! Every decision the engine takes becomes one step. Steps are never
//! rewritten; step numbers are issued by the ledger and are strictly
//! monotonic within a session.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a trace step records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    ToolCall,
    ToolCallForced,
    ToolRouting,
    BatchFilter,
    Synthesis,
    CircuitBreaker,
    SemanticCorrection,
    CycleDetected,
    ClauseLearned,
}

impl StepAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepAction::ToolCall => "tool_call",
            StepAction::ToolCallForced => "tool_call_forced",
            StepAction::ToolRouting => "tool_routing",
            StepAction::BatchFilter => "batch_filter",
            StepAction::Synthesis => "synthesis",
            StepAction::CircuitBreaker => "circuit_breaker",
            StepAction::SemanticCorrection => "semantic_correction",
            StepAction::CycleDetected => "cycle_detected",
            StepAction::ClauseLearned => "clause_learned",
        }
    }
}

/// Who took the decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Router,
    MainAgent,
}

/// One entry in the decision ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    /// Issued by the ledger on record; strictly monotonic per session
    pub step_number: u64,
    pub action: StepAction,
    pub tool: String,
    /// What the step operated on (query text, symbol name, file)
    pub target: String,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    pub error: Option<String>,
    /// Ordered key/value annotations
    pub metadata: BTreeMap<String, String>,
    pub symbols_found: Vec<String>,
    pub actor: Actor,
    pub timestamp: DateTime<Utc>,
}

impl TraceStep {
    pub fn new(action: StepAction, tool: impl Into<String>) -> Self {
        Self {
            step_number: 0,
            action,
            tool: tool.into(),
            target: String::new(),
            duration: Duration::ZERO,
            error: None,
            metadata: BTreeMap::new(),
            symbols_found: Vec::new(),
            actor: Actor::MainAgent,
            timestamp: Utc::now(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_symbols(mut self, symbols: Vec<String>) -> Self {
        self.symbols_found = symbols;
        self
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = actor;
        self
    }

    /// Whether this step dispatched a tool (forced or not)
    pub fn is_dispatch(&self) -> bool {
        matches!(self.action, StepAction::ToolCall | StepAction::ToolCallForced)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
