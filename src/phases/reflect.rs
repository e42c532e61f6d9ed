//! REFLECT phase — continue, conclude, or ask
//!
//! Runs on the reflection cadence. A definitive "not found" streak is a
//! complete answer, not a stuck session; budget pressure concludes
//! through synthesis; a session that never managed to dispatch anything
//! asks the user instead of spinning.

use crate::error::EngineError;
use crate::events::AgentEvent;
use crate::execution_engine::ExecutionEngine;
use crate::phases::{Dependencies, PhaseState};
use crate::session::Session;

pub(crate) async fn execute(
    session: &mut Session,
    engine: &ExecutionEngine,
    deps: &Dependencies,
) -> Result<PhaseState, EngineError> {
    let decision;
    let next;

    let budget_spent = session.metrics.steps >= deps.config.max_steps
        || session.metrics.total_tokens >= deps.config.max_tokens;
    let not_found_settled =
        session.metrics.not_found_streak >= deps.config.max_not_found_before_synthesize;
    let dispatched = deps
        .ledger
        .step_history(&session.id)
        .iter()
        .any(|s| s.is_dispatch());

    if not_found_settled {
        // "Not found" is an answer; synthesize it
        decision = "synthesize_not_found";
        next = engine.synthesize_and_complete(session, deps).await?;
    } else if budget_spent || session.circuit_breaker_active {
        decision = "synthesize_budget";
        next = engine.synthesize_and_complete(session, deps).await?;
    } else if !dispatched && session.metrics.forcing_retries >= deps.config.max_forcing_retries {
        decision = "clarify";
        session.clarification_question = Some(format!(
            "Exploration could not make progress on \"{}\". Can you narrow it down to a \
             specific symbol, file, or behavior?",
            session.query
        ));
        next = PhaseState::Clarify;
    } else {
        decision = "continue";
        next = PhaseState::Execute;
    }

    deps.events.emit(
        &session.id,
        AgentEvent::Reflection {
            decision: decision.to_string(),
        },
    );
    tracing::debug!(session_id = %session.id, decision, "reflection");
    Ok(next)
}
