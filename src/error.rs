//! Engine errors
//!
//! The taxonomy distinguishes fatal errors (terminate the session in
//! ERROR) from recoverable ones (continue degraded or retry locally).

use std::time::Duration;

/// LLM client errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("LLM request timed out after {0:?}")]
    DeadlineExceeded(Duration),

    #[error("LLM transport error: {0}")]
    Transport(String),

    #[error("LLM returned a malformed response: {0}")]
    Malformed(String),

    #[error("LLM request cancelled")]
    Cancelled,
}

/// Tool execution errors
///
/// `category` is a stable machine-readable tag ("timeout", "not_found",
/// "invalid_args", "io") used for clause learning; errors without a
/// known category never produce clauses.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ToolError {
    #[error("Tool not registered: '{0}'")]
    NotRegistered(String),

    #[error("Tool '{tool}' failed: {message}")]
    ExecutionFailed {
        tool: String,
        category: Option<String>,
        message: String,
    },

    #[error("Missing required argument '{argument}' for tool '{tool}'")]
    MissingArgument { tool: String, argument: String },

    #[error("Tool execution cancelled")]
    Cancelled,
}

impl ToolError {
    /// Stable error category for clause learning, if known
    pub fn category(&self) -> Option<&str> {
        match self {
            ToolError::NotRegistered(_) => Some("not_registered"),
            ToolError::ExecutionFailed { category, .. } => category.as_deref(),
            ToolError::MissingArgument { .. } => Some("invalid_args"),
            ToolError::Cancelled => None,
        }
    }
}

/// Graph provider errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum GraphError {
    #[error("Graph service unavailable: {0}")]
    Unavailable(String),

    #[error("Graph initialization failed: {0}")]
    InitFailed(String),

    #[error("Graph refresh failed: {0}")]
    RefreshFailed(String),
}

/// Top-level engine errors
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Session handle is missing or in an impossible state
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    /// Context was never assembled (PLAN did not run or was skipped)
    #[error("No assembled context for session '{0}'")]
    MissingContext(String),

    /// An LLM call was required but no client is configured
    #[error("LLM client required but not configured")]
    LlmUnavailable,

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Session cancelled")]
    Cancelled,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Fatal errors terminate the session in ERROR; everything else
    /// degrades or retries locally.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidSession(_)
                | EngineError::MissingContext(_)
                | EngineError::LlmUnavailable
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(EngineError::InvalidSession("nil".into()).is_fatal());
        assert!(EngineError::MissingContext("s1".into()).is_fatal());
        assert!(EngineError::LlmUnavailable.is_fatal());
        assert!(!EngineError::Cancelled.is_fatal());
        assert!(!EngineError::Llm(LlmError::Transport("boom".into())).is_fatal());
    }

    #[test]
    fn test_tool_error_category() {
        let err = ToolError::ExecutionFailed {
            tool: "find_references".to_string(),
            category: Some("timeout".to_string()),
            message: "deadline".to_string(),
        };
        assert_eq!(err.category(), Some("timeout"));

        let err = ToolError::MissingArgument {
            tool: "find_path".to_string(),
            argument: "from".to_string(),
        };
        assert_eq!(err.category(), Some("invalid_args"));

        assert_eq!(ToolError::Cancelled.category(), None);
    }

    #[test]
    fn test_error_display() {
        let err = ToolError::NotRegistered("magic_tool".to_string());
        assert_eq!(format!("{}", err), "Tool not registered: 'magic_tool'");
    }
}
