//! CLARIFY phase — ask the user, suspend, resume on input
//!
//! Without input the phase formulates a question and suspends the
//! session in AWAITING_CLARIFICATION; the runner returns control to the
//! embedder. With input, the answer folds into the query and context
//! and planning restarts.

use crate::error::EngineError;
use crate::llm::Message;
use crate::phases::{Dependencies, PhaseState};
use crate::session::Session;

pub(crate) async fn execute(
    session: &mut Session,
    _deps: &Dependencies,
) -> Result<PhaseState, EngineError> {
    if let Some(input) = session.clarification_input.take() {
        session.query = format!("{} ({})", session.query.trim(), input.trim());
        if let Some(context) = session.context.as_mut() {
            context.push_message(Message::user(input));
        }
        session.clarification_question = None;
        // New information invalidates the earlier routing choice
        session.routed_tool = None;
        session.hard_forced = false;
        return Ok(PhaseState::Plan);
    }

    let question = session
        .clarification_question
        .get_or_insert_with(|| {
            format!(
                "Could you add detail to \"{}\"? Naming a concrete symbol, file, or \
                 behavior helps exploration.",
                session.query
            )
        })
        .clone();
    if let Some(context) = session.context.as_mut() {
        context.push_message(Message::assistant(question));
    }
    Ok(PhaseState::AwaitingClarification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ScriptedExecutor, StaticRegistry};
    use std::sync::Arc;

    fn deps() -> Dependencies {
        Dependencies::new(
            Arc::new(ScriptedExecutor::new()),
            Arc::new(StaticRegistry::with_names(&["find_symbol"])),
        )
    }

    #[tokio::test]
    async fn test_clarify_without_input_suspends() {
        let mut session = Session::new("x", "/tmp");
        let next = execute(&mut session, &deps()).await.unwrap();
        assert_eq!(next, PhaseState::AwaitingClarification);
        assert!(session.clarification_question.is_some());
    }

    #[tokio::test]
    async fn test_clarify_with_input_resumes_planning() {
        let mut session = Session::new("find it", "/tmp");
        session.routed_tool = Some("find_symbol".to_string());
        session.hard_forced = true;
        session.set_clarification_input("the Handler struct in the http module");

        let next = execute(&mut session, &deps()).await.unwrap();
        assert_eq!(next, PhaseState::Plan);
        assert!(session.query.contains("Handler struct"));
        assert!(session.clarification_input.is_none());
        // Routing restarts with the richer query
        assert!(session.routed_tool.is_none());
        assert!(!session.hard_forced);
    }
}
