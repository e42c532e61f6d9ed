//! Phase state machine — closed variants, stateless handlers, one runner
//!
//! The machine is fixed and small, so the states are a closed enum and
//! every transition is exhaustively checkable:
//!
//! ```text
//! INIT → PLAN → EXECUTE ⇄ REFLECT
//!          ↑        ↓
//!        CLARIFY ← ─┘      terminals: COMPLETE, ERROR, DEGRADED,
//!                          AWAITING_CLARIFICATION (pseudo)
//! ```

pub(crate) mod clarify;
pub(crate) mod init;
pub(crate) mod plan;
pub(crate) mod reflect;
mod runner;

pub use runner::PhaseRunner;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::events::{EventEmitter, NullEmitter};
use crate::execution_engine::Grounder;
use crate::graph::{DirtyTracker, GraphProvider, Refresher};
use crate::llm::{BatchFilterer, LlmClient};
use crate::reasoning_state::ReasoningLedger;
use crate::routing::symbols::SymbolResolver;
use crate::routing::{CorrectionCache, QueryRouter};
use crate::safety::SafetyGate;
use crate::tools::{ToolExecutor, ToolRegistry};

/// Phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseState {
    Init,
    Plan,
    Execute,
    Reflect,
    Clarify,
    /// Pseudo-terminal; resumes once clarification input arrives
    AwaitingClarification,
    Complete,
    Degraded,
    Error,
}

impl PhaseState {
    /// True terminals (AwaitingClarification resumes, so it is not one)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PhaseState::Complete | PhaseState::Degraded | PhaseState::Error
        )
    }
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PhaseState::Init => "INIT",
            PhaseState::Plan => "PLAN",
            PhaseState::Execute => "EXECUTE",
            PhaseState::Reflect => "REFLECT",
            PhaseState::Clarify => "CLARIFY",
            PhaseState::AwaitingClarification => "AWAITING_CLARIFICATION",
            PhaseState::Complete => "COMPLETE",
            PhaseState::Degraded => "DEGRADED",
            PhaseState::Error => "ERROR",
        };
        write!(f, "{}", name)
    }
}

/// External collaborators and shared state the phases run against
///
/// Only the executor and registry are mandatory; everything else
/// degrades gracefully when absent.
pub struct Dependencies {
    pub llm: Option<Arc<dyn LlmClient>>,
    pub batch_filterer: Option<Arc<dyn BatchFilterer>>,
    pub executor: Arc<dyn ToolExecutor>,
    pub registry: Arc<dyn ToolRegistry>,
    pub router: Option<Arc<dyn QueryRouter>>,
    pub symbols: Option<Arc<SymbolResolver>>,
    pub safety: Option<Arc<dyn SafetyGate>>,
    pub graph: Option<Arc<dyn GraphProvider>>,
    pub refresher: Option<Arc<dyn Refresher>>,
    pub grounder: Option<Arc<dyn Grounder>>,
    pub events: Arc<dyn EventEmitter>,
    pub ledger: Arc<ReasoningLedger>,
    pub dirty: Arc<DirtyTracker>,
    pub corrections: Arc<CorrectionCache>,
    pub config: EngineConfig,
    pub cancel: CancellationToken,
}

impl Dependencies {
    /// Minimal wiring: everything optional absent, defaults elsewhere
    pub fn new(executor: Arc<dyn ToolExecutor>, registry: Arc<dyn ToolRegistry>) -> Self {
        let config = EngineConfig::default();
        Self {
            llm: None,
            batch_filterer: None,
            executor,
            registry,
            router: None,
            symbols: None,
            safety: None,
            graph: None,
            refresher: None,
            grounder: None,
            events: Arc::new(NullEmitter),
            ledger: Arc::new(ReasoningLedger::with_proof_threshold(
                config.proof_number_threshold,
            )),
            dirty: Arc::new(DirtyTracker::new()),
            corrections: Arc::new(CorrectionCache::new()),
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_batch_filterer(mut self, filterer: Arc<dyn BatchFilterer>) -> Self {
        self.batch_filterer = Some(filterer);
        self
    }

    pub fn with_router(mut self, router: Arc<dyn QueryRouter>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn with_symbols(mut self, symbols: Arc<SymbolResolver>) -> Self {
        self.symbols = Some(symbols);
        self
    }

    pub fn with_safety(mut self, safety: Arc<dyn SafetyGate>) -> Self {
        self.safety = Some(safety);
        self
    }

    pub fn with_graph(mut self, graph: Arc<dyn GraphProvider>) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn with_refresher(mut self, refresher: Arc<dyn Refresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn with_grounder(mut self, grounder: Arc<dyn Grounder>) -> Self {
        self.grounder = Some(grounder);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventEmitter>) -> Self {
        self.events = events;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.ledger = Arc::new(ReasoningLedger::with_proof_threshold(
            config.proof_number_threshold,
        ));
        self.config = config;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}
