//! Huginn — phase-structured reasoning loop for a code-exploration agent
//!
//! Drives an LLM through iterative tool use while keeping the session
//! honest and bounded:
//! - Phase state machine: INIT → PLAN → EXECUTE ⇄ REFLECT, with CLARIFY
//!   suspension and COMPLETE / DEGRADED / ERROR terminals
//! - Reasoning ledger: append-only trace, proof numbers, learned clauses
//! - Repetition control: count and semantic circuit breakers, batch
//!   deduplication, Brent's cycle detector
//! - Tool routing with semantic correction and hard forcing
//! - Synthesis that always produces a non-empty grounded answer
//!
//! External collaborators (LLM transport, tools, code graph, safety
//! policy, telemetry) are consumed through narrow traits; see
//! [`phases::Dependencies`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use huginn::phases::{Dependencies, PhaseRunner};
//! use huginn::session::Session;
//! use huginn::tools::{ScriptedExecutor, StaticRegistry};
//!
//! # async fn run() -> Result<(), huginn::error::EngineError> {
//! let deps = Dependencies::new(
//!     Arc::new(ScriptedExecutor::new()),
//!     Arc::new(StaticRegistry::with_names(&["find_symbol", "find_callers"])),
//! );
//! let runner = PhaseRunner::new(deps);
//! let mut session = Session::new("who calls parseConfig?", "/path/to/project");
//! let terminal = runner.run(&mut session).await?;
//! println!("finished in {}", terminal);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod execution_engine;
pub mod graph;
pub mod llm;
pub mod metrics;
pub mod phases;
pub mod reasoning_state;
pub mod routing;
pub mod safety;
pub mod session;
pub mod tools;

pub use config::EngineConfig;
pub use error::EngineError;
pub use phases::{Dependencies, PhaseRunner, PhaseState};
pub use session::Session;
