//! Tool routing — pre-LLM tool selection and its guardrails
//!
//! The router is a fast classifier that ranks candidate tools for a
//! query before the main model runs. A rule-based semantic validator
//! catches a known class of router mistakes, and the hard forcer skips
//! the LLM entirely when parameters are rule-extractable.

mod forcing;
mod semantic;
pub mod symbols;

pub use forcing::ParameterExtractor;
pub use semantic::{CorrectionCache, SemanticValidation, SemanticValidator};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::LlmError;

/// Router verdict for one query
#[derive(Debug, Clone)]
pub struct RouterDecision {
    /// Best tool for the query, if the router is confident enough
    pub tool: Option<String>,
    pub confidence: f64,
}

/// Fast-model router seam
#[async_trait]
pub trait QueryRouter: Send + Sync {
    /// Rank candidate tools for a query
    async fn route(
        &self,
        cancel: &CancellationToken,
        query: &str,
        tools: &[String],
    ) -> Result<RouterDecision, LlmError>;
}

/// Deterministic keyword router
///
/// First match wins; phrase order resolves the "callers of" vs
/// "what does X call" ambiguity before the generic keywords.
pub struct KeywordRouter;

impl KeywordRouter {
    const RULES: &'static [(&'static str, &'static str)] = &[
        ("who calls", "find_callers"),
        ("callers of", "find_callers"),
        ("called by", "find_callers"),
        ("callees of", "find_callees"),
        ("calls made by", "find_callees"),
        ("path from", "find_path"),
        ("find path", "find_path"),
        ("uses of", "find_references"),
        ("references to", "find_references"),
        ("references of", "find_references"),
        ("packages", "list_packages"),
        ("where is", "find_symbol"),
        ("find symbol", "find_symbol"),
        ("locate", "find_symbol"),
    ];

    fn classify(query: &str) -> Option<&'static str> {
        let query = query.to_lowercase();
        // "what does X call" needs a pattern, not a fixed phrase
        if query.contains("what does") && query.contains("call") {
            return Some("find_callees");
        }
        Self::RULES
            .iter()
            .find(|(phrase, _)| query.contains(phrase))
            .map(|(_, tool)| *tool)
    }
}

#[async_trait]
impl QueryRouter for KeywordRouter {
    async fn route(
        &self,
        cancel: &CancellationToken,
        query: &str,
        tools: &[String],
    ) -> Result<RouterDecision, LlmError> {
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }
        let tool = Self::classify(query)
            .filter(|t| tools.iter().any(|name| name == t))
            .map(String::from);
        let confidence = if tool.is_some() { 0.9 } else { 0.0 };
        Ok(RouterDecision { tool, confidence })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_names() -> Vec<String> {
        [
            "find_callers",
            "find_callees",
            "find_references",
            "find_path",
            "find_symbol",
            "list_packages",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    #[tokio::test]
    async fn test_keyword_router_callers() {
        let router = KeywordRouter;
        let cancel = CancellationToken::new();
        let decision = router
            .route(&cancel, "who calls parseConfig?", &tool_names())
            .await
            .unwrap();
        assert_eq!(decision.tool.as_deref(), Some("find_callers"));
    }

    #[tokio::test]
    async fn test_keyword_router_callees_pattern() {
        let router = KeywordRouter;
        let cancel = CancellationToken::new();
        let decision = router
            .route(&cancel, "what does main call?", &tool_names())
            .await
            .unwrap();
        assert_eq!(decision.tool.as_deref(), Some("find_callees"));
    }

    #[tokio::test]
    async fn test_keyword_router_unknown_query() {
        let router = KeywordRouter;
        let cancel = CancellationToken::new();
        let decision = router
            .route(&cancel, "summarize the architecture", &tool_names())
            .await
            .unwrap();
        assert!(decision.tool.is_none());
        assert_eq!(decision.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_keyword_router_respects_available_tools() {
        let router = KeywordRouter;
        let cancel = CancellationToken::new();
        let decision = router
            .route(&cancel, "who calls main", &["find_symbol".to_string()])
            .await
            .unwrap();
        assert!(decision.tool.is_none());
    }
}
