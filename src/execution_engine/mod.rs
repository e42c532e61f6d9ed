//! Execution engine — the EXECUTE phase and its seven sub-components
//!
//! One turn of the reasoning loop: build the LLM request, apply the
//! hard-forcing pre-check, validate the response, filter the requested
//! batch, guard every dispatch against repetition, update the ledger,
//! and synthesize when the model is done (or misbehaving).

mod batch_filter;
mod cycle_detector;
mod query_terms;
mod repetition_guard;
mod response_validator;
mod synthesis;
mod turn;

pub use batch_filter::{format_keep_skip, parse_filter_response, BatchFilter, BatchFilterOutcome};
pub use cycle_detector::{CycleDetector, CycleInfo};
pub use query_terms::{extract_query_param, extract_terms, group_hash, jaccard};
pub use repetition_guard::{GuardDecision, RepetitionGuard};
pub use response_validator::{
    ResponseValidator, Validation, ValidationPolicy, ANTI_TOOL_CALL_PROMPT, BLOCKED_MARKER,
};
pub use synthesis::{is_not_found, Grounder, GroundingViolation, Synthesizer, NOT_FOUND_PHRASES};
pub use turn::ExecutionEngine;
