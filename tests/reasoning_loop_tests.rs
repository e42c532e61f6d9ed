//! Reasoning loop integration tests
//!
//! Full sessions through the phase runner with scripted collaborators:
//! - Direct repetition blocked by the count breaker
//! - Semantic duplicates dropped by the batch filter
//! - Callers/callees semantic correction applied once
//! - A two-tool cycle caught by the cycle detector
//! - Tool-call escapes stripped after the breaker forces none
//! - Hard-forced execution without billing an LLM call
//! - Trace replay determinism

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use huginn::config::EngineConfig;
use huginn::error::LlmError;
use huginn::execution_engine::BLOCKED_MARKER;
use huginn::llm::stub::{StubFilterer, StubLlm};
use huginn::llm::{Role, ToolInvocation};
use huginn::phases::{Dependencies, PhaseRunner, PhaseState};
use huginn::reasoning_state::{Literal, StepAction};
use huginn::routing::{QueryRouter, RouterDecision};
use huginn::session::Session;
use huginn::tools::{ScriptedExecutor, StaticRegistry};

const TOOLS: &[&str] = &[
    "find_references",
    "find_callers",
    "find_callees",
    "find_symbol",
    "find_path",
    "list_packages",
];

fn registry() -> Arc<StaticRegistry> {
    Arc::new(StaticRegistry::with_names(TOOLS))
}

fn invocation(tool: &str, symbol: &str) -> ToolInvocation {
    ToolInvocation::new(tool, json!({ "symbol_name": symbol }))
}

/// Router that always picks find_callers (to exercise the corrector)
struct CallersRouter;

#[async_trait]
impl QueryRouter for CallersRouter {
    async fn route(
        &self,
        _cancel: &CancellationToken,
        _query: &str,
        _tools: &[String],
    ) -> Result<RouterDecision, LlmError> {
        Ok(RouterDecision {
            tool: Some("find_callers".to_string()),
            confidence: 0.9,
        })
    }
}

// ============================================================================
// Scenario: direct repetition blocked by the count breaker
// ============================================================================

#[tokio::test]
async fn test_direct_repetition_blocked() {
    let llm = StubLlm::new(vec![
        StubLlm::tool_response(vec![invocation("find_references", "Handler")]),
        StubLlm::tool_response(vec![invocation("find_references", "HandlerA")]),
        StubLlm::tool_response(vec![invocation("find_references", "HandlerB")]),
        StubLlm::text_response("Handler is referenced three times [src/a.rs:1]."),
    ]);
    let deps = Dependencies::new(Arc::new(ScriptedExecutor::new()), registry())
        .with_llm(Arc::new(llm));
    let runner = PhaseRunner::new(deps);

    let mut session = Session::new("find uses of Handler", "/tmp/project");
    let terminal = runner.run(&mut session).await.unwrap();
    assert_eq!(terminal, PhaseState::Complete);

    // Third call was refused before dispatch; a synthetic error result
    // carries the threshold message
    let results = &session.context().unwrap().tool_results;
    assert_eq!(results.len(), 3);
    assert!(results[0].success && results[1].success);
    assert!(!results[2].success);
    assert!(results[2]
        .error
        .as_ref()
        .unwrap()
        .contains("threshold exceeded"));

    // Exactly one circuit_breaker trace step with count metadata
    let history = runner.dependencies().ledger.step_history(&session.id);
    let breakers: Vec<_> = history
        .iter()
        .filter(|s| s.action == StepAction::CircuitBreaker)
        .collect();
    assert_eq!(breakers.len(), 1);
    assert_eq!(breakers[0].tool, "find_references");
    assert_eq!(
        breakers[0].metadata.get("count").map(String::as_str),
        Some("2")
    );
    assert_eq!(
        breakers[0].metadata.get("threshold").map(String::as_str),
        Some("2")
    );

    // COMPLETE ends on a non-empty assistant message
    let last = session.context().unwrap().history.last().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert!(!last.content.is_empty());
}

// ============================================================================
// Scenario: semantic duplicates skipped by the batch filter
// ============================================================================

#[tokio::test]
async fn test_semantic_duplicates_skipped() {
    let llm = StubLlm::new(vec![
        StubLlm::tool_response(vec![
            invocation("find_callers", "parseConfig"),
            invocation("find_callers", "parse_config"),
            invocation("find_callers", "ParseConfig"),
        ]),
        StubLlm::text_response("parseConfig is called from main [src/main.rs:12]."),
    ]);
    let filterer = Arc::new(StubFilterer::new(vec![Ok(
        "1:KEEP\n2:SKIP\n3:SKIP".to_string()
    )]));
    let executor = Arc::new(ScriptedExecutor::new());
    let deps = Dependencies::new(executor.clone(), registry())
        .with_llm(Arc::new(llm))
        .with_batch_filterer(filterer);
    let runner = PhaseRunner::new(deps);

    let mut session = Session::new("callers of parseConfig", "/tmp/project");
    let terminal = runner.run(&mut session).await.unwrap();
    assert_eq!(terminal, PhaseState::Complete);

    // Only the first invocation executed
    let executed = executor.executed();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].arg_str("symbol_name"), Some("parseConfig"));

    // One batch_filter step recording the two skips; no clauses learned
    let ledger = &runner.dependencies().ledger;
    let history = ledger.step_history(&session.id);
    let filter_steps: Vec<_> = history
        .iter()
        .filter(|s| s.action == StepAction::BatchFilter)
        .collect();
    assert_eq!(filter_steps.len(), 1);
    assert_eq!(
        filter_steps[0].metadata.get("skipped").map(String::as_str),
        Some("2")
    );
    assert!(ledger.clauses_for(&session.id).is_empty());
}

// ============================================================================
// Scenario: callers/callees semantic correction, applied once
// ============================================================================

#[tokio::test]
async fn test_callers_callees_correction() {
    let llm = StubLlm::new(vec![
        StubLlm::tool_response(vec![ToolInvocation::new(
            "find_callees",
            json!({"symbol_name": "main"}),
        )]),
        StubLlm::text_response("main calls parse and serve [src/main.rs:3]."),
    ]);
    let deps = Dependencies::new(Arc::new(ScriptedExecutor::new()), registry())
        .with_llm(Arc::new(llm))
        .with_router(Arc::new(CallersRouter));
    let runner = PhaseRunner::new(deps);

    let mut session = Session::new("what does main call?", "/tmp/project");
    let terminal = runner.run(&mut session).await.unwrap();
    assert_eq!(terminal, PhaseState::Complete);

    // The router's find_callers was corrected to find_callees
    assert_eq!(session.routed_tool.as_deref(), Some("find_callees"));

    // Exactly one semantic_correction step despite repeated EXECUTE entries
    let history = runner.dependencies().ledger.step_history(&session.id);
    let corrections: Vec<_> = history
        .iter()
        .filter(|s| s.action == StepAction::SemanticCorrection)
        .collect();
    assert_eq!(corrections.len(), 1);
    assert_eq!(corrections[0].tool, "find_callees");
    assert_eq!(
        corrections[0]
            .metadata
            .get("corrected_from")
            .map(String::as_str),
        Some("find_callers")
    );
}

// ============================================================================
// Scenario: cycle of length two
// ============================================================================

#[tokio::test]
async fn test_two_tool_cycle_detected() {
    let llm = StubLlm::new(vec![
        StubLlm::tool_response(vec![invocation("find_callers", "a1")]),
        StubLlm::tool_response(vec![invocation("find_callees", "b1")]),
        StubLlm::tool_response(vec![invocation("find_callers", "a2")]),
        StubLlm::tool_response(vec![invocation("find_callees", "b2")]),
        StubLlm::tool_response(vec![invocation("find_callers", "a3")]),
    ]);
    // Keep the count breaker out of the way so Brent is what fires
    let config = EngineConfig {
        count_circuit_breaker_threshold: 10,
        max_per_tool: 10,
        max_semantic_group: 10,
        ..Default::default()
    };
    let deps = Dependencies::new(Arc::new(ScriptedExecutor::new()), registry())
        .with_llm(Arc::new(llm))
        .with_config(config);
    let runner = PhaseRunner::new(deps);

    let mut session = Session::new("map the call graph around main", "/tmp/project");
    let terminal = runner.run(&mut session).await.unwrap();
    assert_eq!(terminal, PhaseState::Complete);

    let ledger = &runner.dependencies().ledger;
    let history = ledger.step_history(&session.id);

    // Detector fired on the fifth dispatched step
    let dispatches: Vec<_> = history.iter().filter(|s| s.is_dispatch()).collect();
    assert_eq!(dispatches.len(), 5);
    assert!(history.iter().any(|s| s.action == StepAction::CycleDetected));

    // The learned clause forbids repeating the closing edge
    let clauses = ledger.clauses_for(&session.id);
    assert_eq!(clauses.len(), 1);
    assert_eq!(
        clauses[0].literals,
        vec![
            Literal::Tool("find_callers".to_string()),
            Literal::PrevTool("find_callees".to_string()),
        ]
    );

    // Both proof nodes on the cycle are disproven
    assert!(ledger
        .check_circuit_breaker(&session.id, "find_callers")
        .is_some());
    assert!(ledger
        .check_circuit_breaker(&session.id, "find_callees")
        .is_some());

    // EXECUTE finished through a synthetic error result
    let results = &session.context().unwrap().tool_results;
    let last_result = results.last().unwrap();
    assert!(!last_result.success);
    assert!(last_result.error.as_ref().unwrap().contains("cycling"));
}

// ============================================================================
// Scenario: tool-call escape after forced none
// ============================================================================

#[tokio::test]
async fn test_escape_stripped_after_breaker() {
    let escape = "I will call [Tool call: find_symbol(Foo)]";
    let llm = StubLlm::new(vec![
        StubLlm::tool_response(vec![invocation("find_references", "Handler")]),
        StubLlm::tool_response(vec![invocation("find_references", "Handler2")]),
        StubLlm::tool_response(vec![invocation("find_references", "Handler3")]),
        StubLlm::text_response(escape),
        StubLlm::text_response(escape),
    ]);
    let deps = Dependencies::new(Arc::new(ScriptedExecutor::new()), registry())
        .with_llm(Arc::new(llm));
    let runner = PhaseRunner::new(deps);

    let mut session = Session::new("find uses of Handler", "/tmp/project");
    let terminal = runner.run(&mut session).await.unwrap();
    assert_eq!(terminal, PhaseState::Complete);

    // The breaker fired, then the desperation retry still escaped, so
    // the patterns were literally replaced
    assert!(session.circuit_breaker_active);
    let last = session.context().unwrap().history.last().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert_eq!(last.content, format!("I will call {}", BLOCKED_MARKER));
}

// ============================================================================
// Scenario: hard-forced direct execution
// ============================================================================

#[tokio::test]
async fn test_hard_forced_direct_execution() {
    let llm = Arc::new(StubLlm::new(vec![StubLlm::text_response(
        "The path is main → run → parseConfig [src/main.rs:3].",
    )]));
    let deps = Dependencies::new(Arc::new(ScriptedExecutor::new()), registry())
        .with_llm(llm.clone())
        .with_router(Arc::new(huginn::routing::KeywordRouter));
    let runner = PhaseRunner::new(deps);

    let mut session = Session::new("find path from main to parseConfig", "/tmp/project");
    let terminal = runner.run(&mut session).await.unwrap();
    assert_eq!(terminal, PhaseState::Complete);

    // The forced step never billed the LLM: only the final answer did
    assert_eq!(llm.call_count(), 1);

    let history = runner.dependencies().ledger.step_history(&session.id);
    let forced: Vec<_> = history
        .iter()
        .filter(|s| s.action == StepAction::ToolCallForced)
        .collect();
    assert_eq!(forced.len(), 1);
    assert_eq!(forced[0].tool, "find_path");
    assert_eq!(
        forced[0].metadata.get("forced_by").map(String::as_str),
        Some("router")
    );
    assert!(forced[0].metadata.contains_key("result_preview"));

    // Token accounting stayed non-zero for the forced step
    assert!(session.metrics.total_tokens > 0);
}

// ============================================================================
// Replay determinism
// ============================================================================

async fn run_scripted_session() -> Vec<&'static str> {
    let llm = StubLlm::new(vec![
        StubLlm::tool_response(vec![invocation("find_symbol", "Handler")]),
        StubLlm::tool_response(vec![invocation("find_references", "Handler")]),
        StubLlm::text_response("Handler is defined and used [src/h.rs:10]."),
    ]);
    let deps = Dependencies::new(Arc::new(ScriptedExecutor::new()), registry())
        .with_llm(Arc::new(llm));
    let runner = PhaseRunner::new(deps);

    let mut session = Session::new("find uses of Handler", "/tmp/project");
    runner.run(&mut session).await.unwrap();

    runner
        .dependencies()
        .ledger
        .step_history(&session.id)
        .iter()
        .map(|s| s.action.as_str())
        .collect()
}

#[tokio::test]
async fn test_replay_yields_identical_action_sequences() {
    let first = run_scripted_session().await;
    let second = run_scripted_session().await;
    assert_eq!(first, second);
    assert!(first.contains(&"tool_call"));
}

// ============================================================================
// Clarification suspend/resume across runner calls
// ============================================================================

#[tokio::test]
async fn test_clarification_round_trip() {
    let llm = StubLlm::new(vec![
        StubLlm::tool_response(vec![invocation("find_symbol", "Handler")]),
        StubLlm::text_response("Handler is at [src/h.rs:10]."),
    ]);
    let deps = Dependencies::new(Arc::new(ScriptedExecutor::new()), registry())
        .with_llm(Arc::new(llm));
    let runner = PhaseRunner::new(deps);

    // Too-short query suspends for clarification
    let mut session = Session::new("hm", "/tmp/project");
    let state = runner.run(&mut session).await.unwrap();
    assert_eq!(state, PhaseState::AwaitingClarification);
    assert!(session.clarification_question.is_some());

    // The embedder supplies input and resumes
    session.set_clarification_input("find the Handler struct");
    let terminal = runner.run(&mut session).await.unwrap();
    assert_eq!(terminal, PhaseState::Complete);
    assert!(session.query.contains("Handler"));
}
