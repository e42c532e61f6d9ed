//! PLAN phase — context assembly, language detection, routing
//!
//! Builds the assembled context once (CLARIFY re-entries keep gathered
//! results), detects the project language from file extensions, and asks
//! the router for a candidate tool before the main model ever runs.

use std::collections::HashMap;
use std::path::Path;

use crate::error::EngineError;
use crate::events::AgentEvent;
use crate::llm::Message;
use crate::phases::{Dependencies, PhaseState};
use crate::reasoning_state::{Actor, StepAction, TraceStep};
use crate::routing::symbols::ResolutionOutcome;
use crate::routing::ParameterExtractor;
use crate::session::{AssembledContext, CodeSnippet, Session};

/// Queries shorter than this go to CLARIFY instead of exploring
const MIN_QUERY_LEN: usize = 3;

/// Directory-walk budget for language detection
const LANGUAGE_SCAN_LIMIT: usize = 500;

const SYSTEM_PROMPT: &str = "You are a code exploration agent. Answer questions about the \
     project by calling the available tools and reading their results. Never answer from \
     memory when a tool can check. Cite every code fact as [file:line]. When the evidence \
     shows something does not exist, say so plainly and stop.";

pub(crate) async fn execute(
    session: &mut Session,
    deps: &Dependencies,
) -> Result<PhaseState, EngineError> {
    let query = session.query.trim().to_string();
    if query.len() < MIN_QUERY_LEN {
        session.clarification_question =
            Some("What would you like to explore? Naming a symbol, file, or behavior helps."
                .to_string());
        return Ok(PhaseState::Clarify);
    }

    // CLARIFY re-enters PLAN; the context survives with its evidence
    if session.context.is_none() {
        let mut context = AssembledContext::new(SYSTEM_PROMPT);
        context.push_message(Message::user(query.clone()));
        session.context = Some(context);
    }

    if session.language.is_none() {
        session.language = detect_language(&session.project_root);
    }

    // Pin the queried symbol early so the context carries its location
    if let Some(resolver) = &deps.symbols {
        let extractor = ParameterExtractor::new();
        if let Some(name) = extractor.extract_symbol_name(&query) {
            match resolver.resolve(&deps.cancel, &session.id, &name).await {
                Ok(ResolutionOutcome::Resolved(resolution)) => {
                    tracing::debug!(
                        session_id = %session.id,
                        symbol = %resolution.symbol.id,
                        strategy = resolution.strategy,
                        "symbol pinned"
                    );
                    if let Some(context) = session.context.as_mut() {
                        context.code_snippets.push(CodeSnippet {
                            file: resolution.symbol.file.clone(),
                            line: resolution.symbol.line,
                            content: format!(
                                "{} resolves to {} (confidence {:.2})",
                                name, resolution.symbol.id, resolution.confidence
                            ),
                        });
                    }
                }
                Ok(ResolutionOutcome::Suggestions(suggestions)) if !suggestions.is_empty() => {
                    let names: Vec<&str> =
                        suggestions.iter().map(|s| s.name.as_str()).collect();
                    if let Some(context) = session.context.as_mut() {
                        context.push_message(Message::system(format!(
                            "Symbol '{}' is unknown; nearest names: {}.",
                            name,
                            names.join(", ")
                        )));
                    }
                }
                Ok(ResolutionOutcome::Suggestions(_)) => {}
                Err(error) => {
                    tracing::warn!(session_id = %session.id, %error, "symbol resolution failed");
                }
            }
        }
    }

    if session.router_enabled && session.routed_tool.is_none() {
        if let Some(router) = &deps.router {
            match router
                .route(&deps.cancel, &query, &deps.registry.names())
                .await
            {
                Ok(decision) => {
                    if let Some(tool) = decision.tool {
                        deps.ledger.record_trace_step(
                            &session.id,
                            TraceStep::new(StepAction::ToolRouting, tool.clone())
                                .with_target(&query)
                                .with_actor(Actor::Router)
                                .with_metadata("confidence", format!("{:.2}", decision.confidence)),
                        );
                        deps.events.emit(
                            &session.id,
                            AgentEvent::ToolRouting {
                                tool: tool.clone(),
                                corrected_from: None,
                            },
                        );
                        session.routed_tool = Some(tool);
                    }
                }
                Err(error) => {
                    tracing::warn!(session_id = %session.id, %error, "router failed; continuing");
                }
            }
        }
    }

    Ok(PhaseState::Execute)
}

/// Detect the dominant project language by extension counts
fn detect_language(root: &Path) -> Option<String> {
    let mut counts: HashMap<&'static str, usize> = HashMap::new();
    let mut budget = LANGUAGE_SCAN_LIMIT;
    scan_dir(root, 0, &mut budget, &mut counts);
    counts
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(language, _)| language.to_string())
}

fn scan_dir(dir: &Path, depth: usize, budget: &mut usize, counts: &mut HashMap<&'static str, usize>) {
    if depth > 2 || *budget == 0 {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        if *budget == 0 {
            return;
        }
        *budget -= 1;
        let path = entry.path();
        if path.is_dir() {
            let hidden = path
                .file_name()
                .map(|n| n.to_string_lossy().starts_with('.'))
                .unwrap_or(true);
            if !hidden {
                scan_dir(&path, depth + 1, budget, counts);
            }
            continue;
        }
        let language = match path.extension().and_then(|e| e.to_str()) {
            Some("rs") => "rust",
            Some("go") => "go",
            Some("py") => "python",
            Some("ts") | Some("tsx") => "typescript",
            Some("js") | Some("jsx") => "javascript",
            Some("java") => "java",
            Some("rb") => "ruby",
            Some("c") | Some("h") => "c",
            Some("cc") | Some("cpp") | Some("hpp") => "cpp",
            _ => continue,
        };
        *counts.entry(language).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::KeywordRouter;
    use crate::tools::{ScriptedExecutor, StaticRegistry};
    use std::sync::Arc;

    fn deps() -> Dependencies {
        Dependencies::new(
            Arc::new(ScriptedExecutor::new()),
            Arc::new(StaticRegistry::with_names(&[
                "find_callers",
                "find_callees",
                "find_symbol",
            ])),
        )
    }

    #[tokio::test]
    async fn test_plan_builds_context_once() {
        let mut session = Session::new("find Handler", "/tmp/does-not-exist");
        let deps = deps();
        let next = execute(&mut session, &deps).await.unwrap();
        assert_eq!(next, PhaseState::Execute);

        let history_len = session.context().unwrap().history.len();
        assert_eq!(history_len, 1);

        // Re-entry keeps the existing context
        execute(&mut session, &deps).await.unwrap();
        assert_eq!(session.context().unwrap().history.len(), history_len);
    }

    #[tokio::test]
    async fn test_short_query_diverts_to_clarify() {
        let mut session = Session::new("x", "/tmp");
        let next = execute(&mut session, &deps()).await.unwrap();
        assert_eq!(next, PhaseState::Clarify);
        assert!(session.clarification_question.is_some());
    }

    #[tokio::test]
    async fn test_router_preselects_tool() {
        let mut session = Session::new("who calls parseConfig?", "/tmp");
        let deps = deps().with_router(Arc::new(KeywordRouter));
        execute(&mut session, &deps).await.unwrap();
        assert_eq!(session.routed_tool.as_deref(), Some("find_callers"));

        let history = deps.ledger.step_history(&session.id);
        assert!(history
            .iter()
            .any(|s| s.action == StepAction::ToolRouting && s.tool == "find_callers"));
    }

    #[tokio::test]
    async fn test_plan_pins_resolved_symbol() {
        use crate::routing::symbols::{
            StaticSymbolIndex, Symbol, SymbolKind, SymbolResolver,
        };
        let index = StaticSymbolIndex::new(vec![Symbol {
            id: "http::Handler".to_string(),
            name: "Handler".to_string(),
            kind: SymbolKind::Struct,
            file: "src/http.rs".to_string(),
            line: 42,
        }]);
        let resolver = Arc::new(SymbolResolver::new(Arc::new(index)));

        let mut session = Session::new("find the struct Handler", "/tmp");
        let deps = deps().with_symbols(resolver);
        execute(&mut session, &deps).await.unwrap();

        let snippets = &session.context().unwrap().code_snippets;
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].file, "src/http.rs");
        assert_eq!(snippets[0].line, 42);
        assert!(snippets[0].content.contains("http::Handler"));
    }

    #[test]
    fn test_detect_language_from_extensions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();
        std::fs::write(dir.path().join("lib.rs"), "pub fn lib() {}").unwrap();
        std::fs::write(dir.path().join("script.py"), "pass").unwrap();
        assert_eq!(detect_language(dir.path()), Some("rust".to_string()));
    }

    #[test]
    fn test_detect_language_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(detect_language(dir.path()), None);
    }
}
