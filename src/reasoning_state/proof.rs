//! Proof index — cost-to-prove estimates for explored decision points
//!
//! Nodes are kept in an arena keyed by stable ids; parent references are
//! ids, not direct holders, so there are no circular ownership chains.
//! A disproven node never reverts, and disproof propagates to any parent
//! whose decision-alternatives are all disproven.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::failure::SignalSource;

/// Stable node id for a (session, tool) decision point
pub fn node_id(session_id: &str, tool: &str) -> String {
    format!("{}::{}", session_id, tool)
}

/// One explored decision point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofNode {
    pub id: String,
    /// Cost-to-prove estimate; lower is easier
    pub proof_number: u64,
    /// Disproven ≡ infinite proof number; irreversible
    pub disproven: bool,
    /// Parent decision points, by id
    pub parents: Vec<String>,
}

impl ProofNode {
    fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            proof_number: 1,
            disproven: false,
            parents: Vec::new(),
        }
    }
}

/// How to adjust a proof number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofUpdateType {
    /// Failure: harder to prove
    Increment,
    /// Success: easier to prove
    Decrement,
    /// Safety or cycle: impossible
    Disproven,
}

/// One proof-number adjustment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofUpdate {
    pub node_id: String,
    pub update_type: ProofUpdateType,
    pub delta: u64,
    pub reason: String,
    pub source: SignalSource,
}

/// Arena of proof nodes with back-edges
#[derive(Debug, Default)]
pub struct ProofIndex {
    nodes: HashMap<String, ProofNode>,
    /// Decision-alternatives per parent, derived from parent refs
    children: HashMap<String, Vec<String>>,
}

impl ProofIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node by id, created lazily on first reference
    pub fn ensure(&mut self, id: &str) -> &mut ProofNode {
        self.nodes
            .entry(id.to_string())
            .or_insert_with(|| ProofNode::new(id))
    }

    pub fn get(&self, id: &str) -> Option<&ProofNode> {
        self.nodes.get(id)
    }

    pub fn is_disproven(&self, id: &str) -> bool {
        self.nodes.get(id).map(|n| n.disproven).unwrap_or(false)
    }

    pub fn proof_number(&self, id: &str) -> Option<u64> {
        self.nodes.get(id).map(|n| n.proof_number)
    }

    /// Register `parent` as a parent of `child`
    pub fn add_parent(&mut self, child: &str, parent: &str) {
        self.ensure(parent);
        let node = self.ensure(child);
        if !node.parents.iter().any(|p| p == parent) {
            node.parents.push(parent.to_string());
            self.children
                .entry(parent.to_string())
                .or_default()
                .push(child.to_string());
        }
    }

    /// Apply one update
    ///
    /// Disproof is irreversible: increments and decrements on a
    /// disproven node are ignored.
    pub fn apply(&mut self, update: &ProofUpdate) {
        let node = self.ensure(&update.node_id);
        if node.disproven {
            return;
        }
        match update.update_type {
            ProofUpdateType::Increment => {
                node.proof_number = node.proof_number.saturating_add(update.delta.max(1));
            }
            ProofUpdateType::Decrement => {
                node.proof_number = node.proof_number.saturating_sub(update.delta.max(1));
            }
            ProofUpdateType::Disproven => {
                node.disproven = true;
            }
        }
        if node.disproven {
            let id = update.node_id.clone();
            self.propagate_disproof(&id);
        }
    }

    /// Mark a node disproven (created on demand) and propagate upward
    pub fn mark_disproven(&mut self, id: &str) {
        let node = self.ensure(id);
        if node.disproven {
            return;
        }
        node.disproven = true;
        self.propagate_disproof(id);
    }

    /// Walk the parent relation; a parent becomes disproven iff all of
    /// its decision-alternatives are disproven.
    pub fn propagate_disproof(&mut self, id: &str) {
        let mut pending = match self.nodes.get(id) {
            Some(node) => node.parents.clone(),
            None => return,
        };

        while let Some(parent_id) = pending.pop() {
            if self.is_disproven(&parent_id) {
                continue;
            }
            let alternatives = match self.children.get(&parent_id) {
                Some(children) if !children.is_empty() => children.clone(),
                _ => continue,
            };
            if alternatives.iter().all(|c| self.is_disproven(c)) {
                let parent = self.ensure(&parent_id);
                parent.disproven = true;
                pending.extend(parent.parents.clone());
            }
        }
    }
}
