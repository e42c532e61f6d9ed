//! Response synthesis — producing the final answer
//!
//! Primary path re-invokes the LLM on a truncated context with an
//! anchored prompt demanding `[file:line]` citations. When no LLM is
//! available, or it returns nothing usable, the fallback chain formats
//! structured tool outputs, then summarizes the trace, then reports
//! that no exploration completed. COMPLETE never yields an empty string.

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;

use crate::llm::{LlmClient, LlmRequest, Message, ToolChoice, ToolResult};
use crate::reasoning_state::{ReasoningLedger, StepAction, TraceStep};
use crate::session::AssembledContext;

use super::cycle_detector::fnv1a_64;

/// Recent conversation messages kept verbatim during truncation
const MAX_RECENT_MESSAGES: usize = 4;
/// Most recent tool results included as evidence
const MAX_RECENT_RESULTS: usize = 5;
/// Per-result output truncation for the synthesis prompt
const RESULT_CHAR_LIMIT: usize = 2_000;
/// Grounding-verification retries
const MAX_GROUNDING_RETRIES: usize = 3;

/// Phrases that mark a tool output as a definitive "not found"
///
/// A "not found" determination is itself a complete answer; reflection
/// must not treat the session as stuck because of one.
pub const NOT_FOUND_PHRASES: &[&str] = &[
    "not found",
    "no matches found",
    "no results",
    "no references found",
    "does not exist",
    "could not find",
    "no such symbol",
];

/// Whether text is a definitive "not found" determination
pub fn is_not_found(text: &str) -> bool {
    let lowered = text.to_lowercase();
    NOT_FOUND_PHRASES.iter().any(|p| lowered.contains(p))
}

/// One unverified claim reported by the grounder
#[derive(Debug, Clone)]
pub struct GroundingViolation {
    pub claim: String,
    pub reason: String,
}

/// Post-synthesis verification seam
pub trait Grounder: Send + Sync {
    fn verify(&self, answer: &str, context: &AssembledContext) -> Vec<GroundingViolation>;
}

/// Synthesizer configuration and entry points
pub struct Synthesizer {
    max_output_tokens: u32,
}

impl Synthesizer {
    pub fn new(max_output_tokens: u32) -> Self {
        Self { max_output_tokens }
    }

    /// Produce the final answer; never returns an empty string
    pub async fn synthesize(
        &self,
        cancel: &CancellationToken,
        llm: Option<&dyn LlmClient>,
        grounder: Option<&dyn Grounder>,
        session_id: &str,
        query: &str,
        language: Option<&str>,
        context: &AssembledContext,
        ledger: &ReasoningLedger,
    ) -> String {
        let mut path = "llm";
        let mut answer = match llm {
            Some(llm) => {
                self.synthesize_with_llm(cancel, llm, grounder, query, language, context)
                    .await
            }
            None => None,
        };

        if answer.is_none() {
            path = "results";
            answer = fallback_from_results(&context.tool_results);
        }
        if answer.is_none() {
            path = "trace";
            answer = fallback_from_trace(session_id, ledger);
        }
        let answer = answer.unwrap_or_else(|| {
            path = "none";
            no_exploration_message(query)
        });

        ledger.record_trace_step(
            session_id,
            TraceStep::new(StepAction::Synthesis, "")
                .with_target(query)
                .with_metadata("path", path),
        );
        answer
    }

    async fn synthesize_with_llm(
        &self,
        cancel: &CancellationToken,
        llm: &dyn LlmClient,
        grounder: Option<&dyn Grounder>,
        query: &str,
        language: Option<&str>,
        context: &AssembledContext,
    ) -> Option<String> {
        let mut request = self.build_request(query, language, context);

        let mut answer = match llm.complete(cancel, request.clone()).await {
            Ok(response) if !response.content.trim().is_empty() => response.content,
            Ok(_) => return None,
            Err(error) => {
                tracing::warn!(%error, "synthesis LLM call failed; using fallback");
                return None;
            }
        };

        let Some(grounder) = grounder else {
            return Some(answer);
        };

        for _ in 0..MAX_GROUNDING_RETRIES {
            let violations = grounder.verify(&answer, context);
            if violations.is_empty() {
                return Some(answer);
            }
            let complaints = violations
                .iter()
                .map(|v| format!("- {} ({})", v.claim, v.reason))
                .collect::<Vec<_>>()
                .join("\n");
            request.messages.push(Message::assistant(answer.clone()));
            request.messages.push(Message::user(format!(
                "These claims are not supported by the gathered evidence:\n{}\n\
                 Rewrite the answer using only supported claims, cited as [file:line].",
                complaints
            )));
            match llm.complete(cancel, request.clone()).await {
                Ok(response) if !response.content.trim().is_empty() => {
                    answer = response.content;
                }
                _ => break,
            }
        }

        let remaining = grounder.verify(&answer, context);
        if !remaining.is_empty() {
            answer.push_str(&format!(
                "\n\n[grounding-warning: {} unverified claim(s) remain]",
                remaining.len()
            ));
        }
        Some(answer)
    }

    /// Build the anchored synthesis request over a truncated context
    fn build_request(
        &self,
        query: &str,
        language: Option<&str>,
        context: &AssembledContext,
    ) -> LlmRequest {
        let language = language.unwrap_or("unknown-language");
        let mut messages = vec![Message::system(format!(
            "Conclude a code exploration of a {} project. Answer the user's question \
             from the evidence below. Cite every code fact as [file:line]. If the \
             evidence shows the thing does not exist, say so plainly.",
            language
        ))];
        messages.push(Message::user(query.to_string()));
        messages.extend(truncate_history(&context.history));

        let evidence = recent_evidence(&context.tool_results);
        if !evidence.is_empty() {
            messages.push(Message::user(format!("Gathered evidence:\n{}", evidence)));
        }

        LlmRequest {
            messages,
            tools: Vec::new(),
            tool_choice: ToolChoice::None,
            max_output_tokens: self.max_output_tokens,
        }
    }
}

/// Keep the last few messages, replacing the skipped span with a
/// placeholder
fn truncate_history(history: &[Message]) -> Vec<Message> {
    if history.len() <= MAX_RECENT_MESSAGES {
        return history.to_vec();
    }
    let skipped = history.len() - MAX_RECENT_MESSAGES;
    let mut kept = vec![Message::system(format!(
        "[{} earlier message(s) summarized away]",
        skipped
    ))];
    kept.extend(history[skipped..].iter().cloned());
    kept
}

/// Render the most recent tool results, outputs truncated
fn recent_evidence(results: &[ToolResult]) -> String {
    let start = results.len().saturating_sub(MAX_RECENT_RESULTS);
    results[start..]
        .iter()
        .map(|result| {
            let body = if result.success {
                truncate_chars(&result.output, RESULT_CHAR_LIMIT)
            } else {
                format!(
                    "error: {}",
                    result.error.as_deref().unwrap_or("unknown failure")
                )
            };
            format!("[{}] {}", result.tool, body)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let truncated: String = text.chars().take(limit).collect();
    format!("{}... (truncated, {} total chars)", truncated, text.chars().count())
}

/// Format structured tool outputs through the known-shape parsers,
/// deduplicated by content hash
fn fallback_from_results(results: &[ToolResult]) -> Option<String> {
    if results.is_empty() {
        return None;
    }

    let mut seen = HashSet::new();
    let mut sections = Vec::new();
    for result in results {
        let block = match (&result.structured, result.success) {
            (Some(value), true) => format!("{}:\n{}", result.tool, format_structured(value)),
            (None, true) if !result.output.trim().is_empty() => {
                format!("{}: {}", result.tool, result.output.trim())
            }
            (_, false) => format!(
                "{} failed: {}",
                result.tool,
                result.error.as_deref().unwrap_or("unknown failure")
            ),
            _ => continue,
        };
        if seen.insert(fnv1a_64(block.as_bytes())) {
            sections.push(block);
        }
    }

    if sections.is_empty() {
        None
    } else {
        Some(format!(
            "Synthesis was unavailable; raw findings follow.\n\n{}",
            sections.join("\n\n")
        ))
    }
}

/// Known-shape structured output formatting
fn format_structured(value: &serde_json::Value) -> String {
    // Packages list: {"packages": [{"name", "version"?}, ...]}
    if let Some(packages) = value.get("packages").and_then(|p| p.as_array()) {
        return packages
            .iter()
            .map(|p| {
                let name = p.get("name").and_then(|n| n.as_str()).unwrap_or("?");
                match p.get("version").and_then(|v| v.as_str()) {
                    Some(version) => format!("- {} {}", name, version),
                    None => format!("- {}", name),
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
    }

    // Config usage: {"config_key", "usages": [{"file", "line"}, ...]}
    if let (Some(key), Some(usages)) = (
        value.get("config_key").and_then(|k| k.as_str()),
        value.get("usages").and_then(|u| u.as_array()),
    ) {
        let lines = usages
            .iter()
            .map(|u| {
                let file = u.get("file").and_then(|f| f.as_str()).unwrap_or("?");
                let line = u.get("line").and_then(|l| l.as_u64()).unwrap_or(0);
                format!("- {}:{}", file, line)
            })
            .collect::<Vec<_>>()
            .join("\n");
        return format!("{} used at:\n{}", key, lines);
    }

    // Generic array / object
    match value {
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| match item.as_str() {
                Some(s) => format!("- {}", s),
                None => format!("- {}", item),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

/// Summarize the trace when there are no usable tool results
fn fallback_from_trace(session_id: &str, ledger: &ReasoningLedger) -> Option<String> {
    let history = ledger.step_history(session_id);
    let dispatches: Vec<&TraceStep> = history.iter().filter(|s| s.is_dispatch()).collect();
    if dispatches.is_empty() {
        return None;
    }

    let successes = dispatches.iter().filter(|s| s.error.is_none()).count();
    let failures = dispatches.len() - successes;
    let mut tools: Vec<&str> = dispatches.iter().map(|s| s.tool.as_str()).collect();
    tools.dedup();
    let symbols: Vec<&str> = dispatches
        .iter()
        .flat_map(|s| s.symbols_found.iter().map(String::as_str))
        .collect();

    let mut summary = format!(
        "Exploration ran {} tool call(s) ({} succeeded, {} failed) using: {}.",
        dispatches.len(),
        successes,
        failures,
        tools.join(", ")
    );
    if !symbols.is_empty() {
        summary.push_str(&format!(" Symbols found: {}.", symbols.join(", ")));
    }
    summary.push_str(" No synthesizable output was produced.");
    Some(summary)
}

/// Terminal message when nothing was explored at all
fn no_exploration_message(query: &str) -> String {
    format!(
        "No exploration completed for: \"{}\". No tools ran and no evidence was gathered. \
         Try rephrasing the question, naming a concrete symbol or file, or checking that \
         the project root is indexed.",
        query
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::stub::StubLlm;
    use crate::llm::{Role, ToolInvocation};
    use serde_json::json;

    fn context_with_results(results: Vec<ToolResult>) -> AssembledContext {
        let mut context = AssembledContext::new("system");
        context.push_message(Message::user("find Handler"));
        for result in results {
            context.push_message(Message::assistant("[requested tool calls]"));
            context.push_tool_result(result);
        }
        context
    }

    fn ok_result(tool: &str, output: &str) -> ToolResult {
        let inv = ToolInvocation::new(tool, json!({}));
        ToolResult::ok(&inv, output)
    }

    #[test]
    fn test_not_found_phrases() {
        assert!(is_not_found("Symbol 'Handler' not found in index"));
        assert!(is_not_found("No matches found."));
        assert!(!is_not_found("Found 3 matches"));
    }

    #[test]
    fn test_truncate_history_inserts_placeholder() {
        let history: Vec<Message> = (0..10).map(|i| Message::user(format!("m{}", i))).collect();
        let truncated = truncate_history(&history);
        assert_eq!(truncated.len(), MAX_RECENT_MESSAGES + 1);
        assert_eq!(truncated[0].role, Role::System);
        assert!(truncated[0].content.contains("6 earlier"));
        assert_eq!(truncated.last().unwrap().content, "m9");
    }

    #[test]
    fn test_truncate_history_short_passthrough() {
        let history = vec![Message::user("only one")];
        assert_eq!(truncate_history(&history).len(), 1);
    }

    #[test]
    fn test_recent_evidence_limits_and_truncates() {
        let results: Vec<ToolResult> = (0..8)
            .map(|i| ok_result("find_symbol", &format!("result {}", i)))
            .collect();
        let evidence = recent_evidence(&results);
        assert!(!evidence.contains("result 2"));
        assert!(evidence.contains("result 3"));
        assert!(evidence.contains("result 7"));

        let long = ok_result("find_symbol", &"x".repeat(3000));
        let evidence = recent_evidence(&[long]);
        assert!(evidence.contains("truncated"));
    }

    #[test]
    fn test_format_packages_shape() {
        let value = json!({"packages": [
            {"name": "serde", "version": "1.0"},
            {"name": "tokio"},
        ]});
        let formatted = format_structured(&value);
        assert!(formatted.contains("- serde 1.0"));
        assert!(formatted.contains("- tokio"));
    }

    #[test]
    fn test_format_config_usage_shape() {
        let value = json!({"config_key": "max_steps", "usages": [
            {"file": "src/config.rs", "line": 10},
        ]});
        let formatted = format_structured(&value);
        assert!(formatted.contains("max_steps used at:"));
        assert!(formatted.contains("- src/config.rs:10"));
    }

    #[test]
    fn test_fallback_dedupes_identical_blocks() {
        let results = vec![
            ok_result("find_symbol", "Handler at src/h.rs:10"),
            ok_result("find_symbol", "Handler at src/h.rs:10"),
        ];
        let answer = fallback_from_results(&results).unwrap();
        assert_eq!(answer.matches("Handler at src/h.rs:10").count(), 1);
    }

    #[test]
    fn test_fallback_includes_errors() {
        let results = vec![ToolResult::synthetic_error(
            "inv",
            "find_references",
            "call count threshold exceeded",
        )];
        let answer = fallback_from_results(&results).unwrap();
        assert!(answer.contains("find_references failed"));
        assert!(answer.contains("threshold exceeded"));
    }

    #[tokio::test]
    async fn test_synthesize_primary_path() {
        let synthesizer = Synthesizer::new(4096);
        let llm = StubLlm::new(vec![StubLlm::text_response(
            "Handler is defined in src/h.rs [src/h.rs:10].",
        )]);
        let ledger = ReasoningLedger::new();
        let context = context_with_results(vec![ok_result("find_symbol", "h")]);

        let answer = synthesizer
            .synthesize(
                &CancellationToken::new(),
                Some(&llm),
                None,
                "s1",
                "find Handler",
                Some("rust"),
                &context,
                &ledger,
            )
            .await;
        assert!(answer.contains("[src/h.rs:10]"));

        // The synthesis request anchored the project language
        let requests = llm.recorded_requests();
        assert!(requests[0].messages[0].content.contains("rust"));
        assert_eq!(requests[0].tool_choice, ToolChoice::None);

        // One synthesis trace step recorded
        let history = ledger.step_history("s1");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, StepAction::Synthesis);
    }

    #[tokio::test]
    async fn test_synthesize_empty_llm_falls_back_to_results() {
        let synthesizer = Synthesizer::new(4096);
        let llm = StubLlm::new(vec![StubLlm::text_response("")]);
        let ledger = ReasoningLedger::new();
        let context = context_with_results(vec![ok_result("find_symbol", "Handler at h.rs:1")]);

        let answer = synthesizer
            .synthesize(
                &CancellationToken::new(),
                Some(&llm),
                None,
                "s1",
                "find Handler",
                None,
                &context,
                &ledger,
            )
            .await;
        assert!(answer.contains("Handler at h.rs:1"));
    }

    #[tokio::test]
    async fn test_synthesize_trace_fallback() {
        let synthesizer = Synthesizer::new(4096);
        let ledger = ReasoningLedger::new();
        ledger.record_trace_step(
            "s1",
            TraceStep::new(StepAction::ToolCall, "find_symbol")
                .with_symbols(vec!["Handler".to_string()]),
        );
        let context = AssembledContext::new("system");

        let answer = synthesizer
            .synthesize(
                &CancellationToken::new(),
                None,
                None,
                "s1",
                "find Handler",
                None,
                &context,
                &ledger,
            )
            .await;
        assert!(answer.contains("1 tool call"));
        assert!(answer.contains("Handler"));
    }

    #[tokio::test]
    async fn test_synthesize_never_empty() {
        let synthesizer = Synthesizer::new(4096);
        let ledger = ReasoningLedger::new();
        let context = AssembledContext::new("system");

        let answer = synthesizer
            .synthesize(
                &CancellationToken::new(),
                None,
                None,
                "s1",
                "find Handler",
                None,
                &context,
                &ledger,
            )
            .await;
        assert!(!answer.is_empty());
        assert!(answer.contains("No exploration completed"));
    }

    struct StrictGrounder;
    impl Grounder for StrictGrounder {
        fn verify(&self, answer: &str, _context: &AssembledContext) -> Vec<GroundingViolation> {
            if answer.contains("[src/") {
                vec![]
            } else {
                vec![GroundingViolation {
                    claim: answer.chars().take(40).collect(),
                    reason: "no citation".to_string(),
                }]
            }
        }
    }

    #[tokio::test]
    async fn test_grounding_retry_then_warning() {
        let synthesizer = Synthesizer::new(4096);
        // Every reply uncited: retries exhaust, warning appended
        let llm = StubLlm::new(vec![
            StubLlm::text_response("Handler is in h.rs"),
            StubLlm::text_response("Handler is in h.rs, really"),
            StubLlm::text_response("Handler is in h.rs, trust me"),
            StubLlm::text_response("Handler is in h.rs, final"),
        ]);
        let ledger = ReasoningLedger::new();
        let context = context_with_results(vec![ok_result("find_symbol", "h")]);

        let answer = synthesizer
            .synthesize(
                &CancellationToken::new(),
                Some(&llm),
                Some(&StrictGrounder),
                "s1",
                "find Handler",
                None,
                &context,
                &ledger,
            )
            .await;
        assert!(answer.contains("[grounding-warning:"));
    }

    #[tokio::test]
    async fn test_grounding_pass_keeps_answer_clean() {
        let synthesizer = Synthesizer::new(4096);
        let llm = StubLlm::new(vec![StubLlm::text_response("Handler is at [src/h.rs:10].")]);
        let ledger = ReasoningLedger::new();
        let context = context_with_results(vec![ok_result("find_symbol", "h")]);

        let answer = synthesizer
            .synthesize(
                &CancellationToken::new(),
                Some(&llm),
                Some(&StrictGrounder),
                "s1",
                "find Handler",
                None,
                &context,
                &ledger,
            )
            .await;
        assert!(!answer.contains("grounding-warning"));
    }
}
