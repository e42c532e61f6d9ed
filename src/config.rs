//! Engine configuration — budgets and thresholds for the reasoning loop
//!
//! Defines the limits that keep a session bounded:
//! - Step and token budgets (hard termination)
//! - Repetition thresholds (count, semantic, cycle)
//! - Batch-filter protocol parameters
//! - Forcing-retry and synthesis budgets

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the reasoning loop
///
/// All limits are failsafe — when exceeded, the loop stops exploring and
/// synthesizes from whatever evidence exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum reasoning steps per session
    pub max_steps: usize,

    /// Maximum total tokens per session
    pub max_tokens: u64,

    /// Minimum batch size before the batch filter runs
    pub min_batch_filter_size: usize,

    /// Batch-filter classifier deadline in milliseconds
    pub batch_filter_timeout_ms: u64,

    /// Jaccard similarity at which a batch member is annotated as redundant
    pub batch_filter_similarity_threshold: f64,

    /// Jaccard similarity at which two queries join the same semantic group
    pub semantic_repetition_threshold: f64,

    /// Per-tool call count at which the count breaker refuses dispatch
    pub count_circuit_breaker_threshold: usize,

    /// Raw per-tool call ceiling for the semantic breaker
    pub max_per_tool: usize,

    /// Semantic-group size at which the semantic breaker fires
    pub max_semantic_group: usize,

    /// Maximum response-validation retries (shared forcing budget)
    pub max_forcing_retries: usize,

    /// Consecutive "not found" results before synthesis is forced
    pub max_not_found_before_synthesize: usize,

    /// Steps between reflection passes
    pub reflection_threshold: usize,

    /// Prior same-tool calls included in the batch-filter prompt
    pub max_history_steps: usize,

    /// Output-token budget for synthesis and desperation retries
    pub synthesis_max_output_tokens: u32,

    /// Proof number above which a decision node is treated as disproven
    pub proof_number_threshold: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: 50,
            max_tokens: 100_000,
            min_batch_filter_size: 3,
            batch_filter_timeout_ms: 2_000,
            batch_filter_similarity_threshold: 0.30,
            semantic_repetition_threshold: 0.70,
            count_circuit_breaker_threshold: 2,
            max_per_tool: 5,
            max_semantic_group: 3,
            max_forcing_retries: 3,
            max_not_found_before_synthesize: 3,
            reflection_threshold: 10,
            max_history_steps: 10,
            synthesis_max_output_tokens: 4_096,
            proof_number_threshold: 100,
        }
    }
}

impl EngineConfig {
    /// Batch-filter deadline as a `Duration`
    pub fn batch_filter_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_filter_timeout_ms)
    }

    /// Create permissive configuration for testing
    pub fn permissive() -> Self {
        Self {
            max_steps: 1_000,
            max_tokens: 10_000_000,
            count_circuit_breaker_threshold: 100,
            max_per_tool: 100,
            max_semantic_group: 100,
            max_forcing_retries: 100,
            ..Default::default()
        }
    }

    /// Validate that configuration values are sensible
    ///
    /// Returns Err if any value would disable a safety mechanism.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_steps == 0 {
            return Err("max_steps must be > 0".to_string());
        }
        if self.max_tokens == 0 {
            return Err("max_tokens must be > 0".to_string());
        }
        if self.min_batch_filter_size < 2 {
            return Err(format!(
                "min_batch_filter_size ({}) is too small (minimum 2)",
                self.min_batch_filter_size
            ));
        }
        if !(0.0..=1.0).contains(&self.batch_filter_similarity_threshold) {
            return Err(format!(
                "batch_filter_similarity_threshold ({}) must be within [0.0, 1.0]",
                self.batch_filter_similarity_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.semantic_repetition_threshold) {
            return Err(format!(
                "semantic_repetition_threshold ({}) must be within [0.0, 1.0]",
                self.semantic_repetition_threshold
            ));
        }
        if self.count_circuit_breaker_threshold == 0 {
            return Err("count_circuit_breaker_threshold must be > 0".to_string());
        }
        Ok(())
    }
}
