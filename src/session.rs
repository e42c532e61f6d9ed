//! Session state — one user query end-to-end
//!
//! The session owns its assembled context, metrics, and phase position.
//! Ledger data (trace, proofs, clauses) lives in the reasoning ledger and
//! is shared by reference.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::llm::{Message, Role, ToolResult};
use crate::phases::PhaseState;

/// Rough token estimate used for budget accounting
///
/// Four characters per token, never zero for non-empty text, so forced
/// executions that bypass the LLM still register token usage.
pub fn estimate_tokens(text: &str) -> u64 {
    if text.is_empty() {
        0
    } else {
        ((text.len() + 3) / 4) as u64
    }
}

/// Per-session counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetrics {
    /// Reasoning steps taken
    pub steps: usize,
    /// Tokens consumed (LLM output + estimated forced output)
    pub total_tokens: u64,
    /// Response-validation retries spent
    pub forcing_retries: usize,
    /// Tool calls dispatched
    pub tool_calls: usize,
    /// Consecutive "not found" tool results
    pub not_found_streak: usize,
}

/// Code snippet attached to the context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSnippet {
    pub file: String,
    pub line: u32,
    pub content: String,
}

/// Prompt material assembled for LLM calls
///
/// Created in PLAN, mutated in EXECUTE, truncated for synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembledContext {
    pub system_prompt: String,
    /// Ordered conversation history
    pub history: Vec<Message>,
    /// Tool-result log, in dispatch order
    pub tool_results: Vec<ToolResult>,
    pub code_snippets: Vec<CodeSnippet>,
    /// Running token estimate over prompt material
    pub total_tokens: u64,
}

impl AssembledContext {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        let system_prompt = system_prompt.into();
        let total_tokens = estimate_tokens(&system_prompt);
        Self {
            system_prompt,
            history: Vec::new(),
            tool_results: Vec::new(),
            code_snippets: Vec::new(),
            total_tokens,
        }
    }

    /// Append a message and account its tokens
    pub fn push_message(&mut self, message: Message) {
        self.total_tokens += estimate_tokens(&message.content);
        self.history.push(message);
    }

    /// Append a tool result and its context message
    ///
    /// Callers must have pushed the assistant tool-call marker first so
    /// the result is never orphaned.
    pub fn push_tool_result(&mut self, result: ToolResult) {
        let body = if result.success {
            result.output.clone()
        } else {
            format!(
                "error: {}",
                result.error.as_deref().unwrap_or("unknown failure")
            )
        };
        self.push_message(Message::tool(format!("[{}] {}", result.tool, body)));
        self.tool_results.push(result);
    }

    /// Last assistant message, if any
    pub fn last_assistant_message(&self) -> Option<&Message> {
        self.history
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
    }

    /// First user message (the original query position)
    pub fn first_user_message(&self) -> Option<&Message> {
        self.history.iter().find(|m| m.role == Role::User)
    }
}

/// One user query end-to-end
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique session id
    pub id: String,
    /// Project being explored
    pub project_root: PathBuf,
    /// Original user query
    pub query: String,
    /// Current phase
    pub phase: PhaseState,
    pub metrics: SessionMetrics,
    /// Prompt material; absent until PLAN runs
    pub context: Option<AssembledContext>,
    /// A repetition guard fired; suppresses tool-missing corrections
    pub circuit_breaker_active: bool,
    /// Router pre-selection is enabled for this session
    pub router_enabled: bool,
    /// Tool the router selected for the query, if any
    pub routed_tool: Option<String>,
    /// Hard-forced execution already happened for this query
    pub hard_forced: bool,
    /// Detected project language
    pub language: Option<String>,
    /// Question asked by CLARIFY, pending user input
    pub clarification_question: Option<String>,
    /// User's answer, set by the embedder to resume
    pub clarification_input: Option<String>,
    /// Reduced-capability notes accumulated on the degraded path
    pub degraded_reasons: Vec<String>,
}

impl Session {
    /// Create a session in INIT
    pub fn new(query: impl Into<String>, project_root: impl Into<PathBuf>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            project_root: project_root.into(),
            query: query.into(),
            phase: PhaseState::Init,
            metrics: SessionMetrics::default(),
            context: None,
            circuit_breaker_active: false,
            router_enabled: true,
            routed_tool: None,
            hard_forced: false,
            language: None,
            clarification_question: None,
            clarification_input: None,
            degraded_reasons: Vec::new(),
        }
    }

    /// Provide the clarification answer and allow the runner to resume
    pub fn set_clarification_input(&mut self, input: impl Into<String>) {
        self.clarification_input = Some(input.into());
    }

    /// Context accessor that fails loudly when PLAN has not run
    pub fn context(&self) -> Result<&AssembledContext, crate::error::EngineError> {
        self.context
            .as_ref()
            .ok_or_else(|| crate::error::EngineError::MissingContext(self.id.clone()))
    }

    /// Mutable context accessor
    pub fn context_mut(&mut self) -> Result<&mut AssembledContext, crate::error::EngineError> {
        self.context
            .as_mut()
            .ok_or_else(|| crate::error::EngineError::MissingContext(self.id.clone()))
    }

    /// Note a capability lost on the degraded path
    pub fn note_degraded(&mut self, reason: impl Into<String>) {
        self.degraded_reasons.push(reason.into());
    }
}
