//! INIT phase — session validation and graph bootstrap
//!
//! Graph failures are not fatal: the session continues degraded with a
//! note about the missing capability.

use crate::error::EngineError;
use crate::events::AgentEvent;
use crate::phases::{Dependencies, PhaseState};
use crate::session::Session;

pub(crate) async fn execute(
    session: &mut Session,
    deps: &Dependencies,
) -> Result<PhaseState, EngineError> {
    if session.id.is_empty() {
        return Err(EngineError::InvalidSession("empty session id".to_string()));
    }
    if deps.cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }

    deps.events.emit(
        &session.id,
        AgentEvent::SessionStart {
            query: session.query.clone(),
            project_root: session.project_root.display().to_string(),
        },
    );

    if let Some(graph) = &deps.graph {
        if graph.is_available() {
            match graph.initialize(&deps.cancel, &session.project_root).await {
                Ok(graph_id) => {
                    tracing::debug!(session_id = %session.id, %graph_id, "graph initialized");
                }
                Err(error) => {
                    tracing::warn!(session_id = %session.id, %error, "graph init failed");
                    session.note_degraded(format!("code graph initialization failed: {}", error));
                }
            }
        } else {
            session.note_degraded("code graph service unreachable".to_string());
        }
    }

    Ok(PhaseState::Plan)
}
