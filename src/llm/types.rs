//! LLM wire types — messages, tool invocations, results, directives
//!
//! These are the data structures exchanged with the model transport.
//! No inference, no policy — just data.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Message role in the conversation history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Single message in the assembled context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
        }
    }
}

/// Tool-choice directive sent with every LLM request
///
/// Escalates on repeated validation failure:
/// Auto → Any → Specific(name) → None (with a stronger prompt).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "mode", content = "tool")]
pub enum ToolChoice {
    /// Model decides whether to call tools
    Auto,
    /// Model must call at least one tool
    Any,
    /// Model must call this specific tool
    Specific(String),
    /// Model must not call tools
    None,
}

impl ToolChoice {
    /// Next directive in the escalation order
    ///
    /// `preferred` is the router-selected tool used at the Specific rung.
    pub fn escalate(&self, preferred: Option<&str>) -> ToolChoice {
        match self {
            ToolChoice::Auto => ToolChoice::Any,
            ToolChoice::Any => match preferred {
                Some(tool) => ToolChoice::Specific(tool.to_string()),
                None => ToolChoice::None,
            },
            ToolChoice::Specific(_) => ToolChoice::None,
            ToolChoice::None => ToolChoice::None,
        }
    }
}

/// One requested tool call, extracted from an LLM response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Unique invocation id
    pub id: String,
    /// Tool name
    pub tool: String,
    /// Raw JSON arguments
    pub arguments: serde_json::Value,
}

impl ToolInvocation {
    /// Create an invocation with a fresh id
    pub fn new(tool: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tool: tool.into(),
            arguments,
        }
    }

    /// String argument by key
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }

    /// Integer argument by key
    pub fn arg_i64(&self, key: &str) -> Option<i64> {
        self.arguments.get(key).and_then(|v| v.as_i64())
    }

    /// Boolean argument by key
    pub fn arg_bool(&self, key: &str) -> Option<bool> {
        self.arguments.get(key).and_then(|v| v.as_bool())
    }
}

/// Outcome of one tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Invocation this result answers
    pub invocation_id: String,
    /// Tool name
    pub tool: String,
    /// Whether execution succeeded
    pub success: bool,
    /// Human-readable output
    pub output: String,
    /// Structured output, when the tool produced JSON
    pub structured: Option<serde_json::Value>,
    /// Error message on failure
    pub error: Option<String>,
    /// Wall-clock duration
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    /// Tokens attributed to this result
    pub tokens_used: u64,
    /// Result was served from a cache
    pub cached: bool,
    /// Output was truncated
    pub truncated: bool,
    /// Files the tool modified
    pub modified_files: Vec<PathBuf>,
}

impl ToolResult {
    /// Successful result with plain text output
    pub fn ok(invocation: &ToolInvocation, output: impl Into<String>) -> Self {
        Self {
            invocation_id: invocation.id.clone(),
            tool: invocation.tool.clone(),
            success: true,
            output: output.into(),
            structured: None,
            error: None,
            duration: Duration::ZERO,
            tokens_used: 0,
            cached: false,
            truncated: false,
            modified_files: Vec::new(),
        }
    }

    /// Synthetic error result injected by a guard
    ///
    /// Carries an actionable message so the model synthesizes from
    /// existing results instead of retrying the refused call.
    pub fn synthetic_error(
        invocation_id: impl Into<String>,
        tool: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        Self {
            invocation_id: invocation_id.into(),
            tool: tool.into(),
            success: false,
            output: message.clone(),
            structured: None,
            error: Some(message),
            duration: Duration::ZERO,
            tokens_used: 0,
            cached: false,
            truncated: false,
            modified_files: Vec::new(),
        }
    }
}

/// Tool schema advertised to the LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema for the tool's arguments
    pub schema: serde_json::Value,
}

/// Why the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    Other,
}

/// One request to the LLM transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: ToolChoice,
    pub max_output_tokens: u32,
}

/// One response from the LLM transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Text content (may be empty when only tools were requested)
    pub content: String,
    /// Requested tool calls, in order
    pub tool_calls: Vec<ToolInvocation>,
    pub output_tokens: u64,
    pub stop_reason: StopReason,
    pub model: String,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

impl LlmResponse {
    /// True when the response carries neither text nor tool calls
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.tool_calls.is_empty()
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
