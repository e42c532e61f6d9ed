//! Safety-gate seam
//!
//! Policy evaluation is an external collaborator. The dispatcher asks the
//! gate about proposed changes before a mutating tool runs; a block is a
//! hard signal and feeds clause learning.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// A change a tool intends to make
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedChange {
    pub path: String,
    pub description: String,
}

/// Gate verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyVerdict {
    Allow,
    Warn,
    Block,
}

/// Result of one safety check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyResult {
    pub verdict: SafetyVerdict,
    pub reasons: Vec<String>,
}

/// Constraint extracted from a safety result, pinned to a decision node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constraint {
    pub node_id: String,
    pub rule: String,
}

/// Policy engine seam
#[async_trait]
pub trait SafetyGate: Send + Sync {
    /// Evaluate proposed changes
    async fn check(
        &self,
        cancel: &CancellationToken,
        changes: &[ProposedChange],
    ) -> SafetyResult;

    /// Whether a result must stop the dispatch
    fn should_block(&self, result: &SafetyResult) -> bool {
        result.verdict == SafetyVerdict::Block
    }

    /// Constraints to attach to the decision node
    fn extract_constraints(&self, result: &SafetyResult, node_id: &str) -> Vec<Constraint> {
        result
            .reasons
            .iter()
            .map(|reason| Constraint {
                node_id: node_id.to_string(),
                rule: reason.clone(),
            })
            .collect()
    }
}

/// Gate that allows everything (for testing)
pub struct PermissiveGate;

#[async_trait]
impl SafetyGate for PermissiveGate {
    async fn check(
        &self,
        _cancel: &CancellationToken,
        _changes: &[ProposedChange],
    ) -> SafetyResult {
        SafetyResult {
            verdict: SafetyVerdict::Allow,
            reasons: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_permissive_gate_allows() {
        let gate = PermissiveGate;
        let cancel = CancellationToken::new();
        let result = gate
            .check(
                &cancel,
                &[ProposedChange {
                    path: "src/lib.rs".to_string(),
                    description: "rewrite".to_string(),
                }],
            )
            .await;
        assert_eq!(result.verdict, SafetyVerdict::Allow);
        assert!(!gate.should_block(&result));
    }

    #[test]
    fn test_extract_constraints_pins_node() {
        let gate = PermissiveGate;
        let result = SafetyResult {
            verdict: SafetyVerdict::Block,
            reasons: vec!["write outside workspace".to_string()],
        };
        let constraints = gate.extract_constraints(&result, "s1::file_write");
        assert_eq!(constraints.len(), 1);
        assert_eq!(constraints[0].node_id, "s1::file_write");
        assert!(gate.should_block(&result));
    }
}
