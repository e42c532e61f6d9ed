//! Batch filter — semantic deduplication of multi-call turns
//!
//! When the model requests three or more tool calls at once, a fast
//! classifier is asked which are redundant before any of them is paid
//! for. The filter degrades gracefully: on timeout, error, or an
//! unparseable verdict the original batch runs unchanged.

use std::collections::BTreeSet;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::llm::{BatchFilterer, ToolInvocation};
use crate::metrics;
use crate::reasoning_state::{FailureEvent, FailureType, ReasoningLedger};

use super::query_terms::{extract_query_param, extract_terms, jaccard};

/// Filter outcome: the kept batch plus soft failure events for skips
#[derive(Debug)]
pub struct BatchFilterOutcome {
    pub kept: Vec<ToolInvocation>,
    pub skipped: Vec<(ToolInvocation, FailureEvent)>,
}

impl BatchFilterOutcome {
    fn passthrough(batch: Vec<ToolInvocation>) -> Self {
        Self {
            kept: batch,
            skipped: Vec::new(),
        }
    }
}

/// Render a keep-set as the strict verdict format (`N:KEEP|SKIP`)
pub fn format_keep_skip(verdicts: &[bool]) -> String {
    verdicts
        .iter()
        .enumerate()
        .map(|(i, keep)| format!("{}:{}", i + 1, if *keep { "KEEP" } else { "SKIP" }))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse a classifier reply into per-position verdicts
///
/// Strict parser first (`N:KEEP` / `N:SKIP` lines, 1-based), then a
/// lenient fallback that takes KEEP/SKIP tokens in order. Positions the
/// reply does not cover default to KEEP. Returns None when no verdict
/// tokens are present at all.
pub fn parse_filter_response(text: &str, batch_len: usize) -> Option<Vec<bool>> {
    let mut verdicts = vec![true; batch_len];

    let mut strict_hits = 0;
    for line in text.lines() {
        let line = line.trim();
        let Some((position, verdict)) = line.split_once(':') else {
            continue;
        };
        let Ok(position) = position.trim().parse::<usize>() else {
            continue;
        };
        if position == 0 || position > batch_len {
            continue;
        }
        match verdict.trim().to_uppercase().as_str() {
            "KEEP" => {
                verdicts[position - 1] = true;
                strict_hits += 1;
            }
            "SKIP" => {
                verdicts[position - 1] = false;
                strict_hits += 1;
            }
            _ => {}
        }
    }
    if strict_hits > 0 {
        return Some(verdicts);
    }

    // Lenient: a bare sequence of KEEP/SKIP tokens
    let mut position = 0;
    for token in text.split(|c: char| !c.is_ascii_alphabetic()) {
        if position >= batch_len {
            break;
        }
        match token.to_uppercase().as_str() {
            "KEEP" => {
                verdicts[position] = true;
                position += 1;
            }
            "SKIP" => {
                verdicts[position] = false;
                position += 1;
            }
            _ => {}
        }
    }
    if position > 0 {
        Some(verdicts)
    } else {
        None
    }
}

/// Batch filter over one turn's requested invocations
pub struct BatchFilter {
    min_size: usize,
    similarity_threshold: f64,
    timeout: std::time::Duration,
    max_history: usize,
}

impl BatchFilter {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            min_size: config.min_batch_filter_size,
            similarity_threshold: config.batch_filter_similarity_threshold,
            timeout: config.batch_filter_timeout(),
            max_history: config.max_history_steps,
        }
    }

    /// Filter a batch, consulting the classifier when it is large enough
    pub async fn filter(
        &self,
        cancel: &CancellationToken,
        filterer: Option<&dyn BatchFilterer>,
        session_id: &str,
        user_query: &str,
        ledger: &ReasoningLedger,
        batch: Vec<ToolInvocation>,
    ) -> BatchFilterOutcome {
        if batch.is_empty() {
            return BatchFilterOutcome::passthrough(batch);
        }
        if batch.len() < self.min_size {
            metrics::record_batch_filter("passthrough");
            return BatchFilterOutcome::passthrough(batch);
        }
        let Some(filterer) = filterer else {
            metrics::record_batch_filter("passthrough");
            return BatchFilterOutcome::passthrough(batch);
        };

        let prompt = self.build_prompt(session_id, user_query, ledger, &batch);

        let start = Instant::now();
        let reply = tokio::time::timeout(self.timeout, filterer.filter_batch(cancel, prompt)).await;
        metrics::observe_batch_filter_duration(start.elapsed());

        let reply = match reply {
            Err(_elapsed) => {
                tracing::warn!(session_id, "batch filter timed out; keeping original batch");
                metrics::record_batch_filter("timeout");
                return BatchFilterOutcome::passthrough(batch);
            }
            Ok(Err(error)) => {
                tracing::warn!(session_id, %error, "batch filter failed; keeping original batch");
                metrics::record_batch_filter("error");
                return BatchFilterOutcome::passthrough(batch);
            }
            Ok(Ok(reply)) => reply,
        };

        let Some(mut verdicts) = parse_filter_response(&reply, batch.len()) else {
            tracing::debug!(session_id, "unparseable batch filter reply; keeping original batch");
            metrics::record_batch_filter("parse_fallback");
            return BatchFilterOutcome::passthrough(batch);
        };

        // The classifier may not skip everything
        if verdicts.iter().all(|keep| !keep) {
            verdicts[0] = true;
        }

        let mut kept = Vec::new();
        let mut skipped = Vec::new();
        for (invocation, keep) in batch.into_iter().zip(verdicts) {
            if keep {
                kept.push(invocation);
            } else {
                let event =
                    FailureEvent::new(FailureType::BatchFiltered, session_id, &invocation.tool);
                skipped.push((invocation, event));
            }
        }

        metrics::record_batch_filter("filtered");
        metrics::observe_batch_filter_skipped(skipped.len());
        BatchFilterOutcome { kept, skipped }
    }

    /// Build the single classifier prompt for the whole batch
    fn build_prompt(
        &self,
        session_id: &str,
        user_query: &str,
        ledger: &ReasoningLedger,
        batch: &[ToolInvocation],
    ) -> String {
        let history = ledger.step_history(session_id);

        let mut prompt = String::new();
        prompt.push_str("Decide which pending tool calls are redundant.\n");
        prompt.push_str(&format!("User query: {}\n\n", user_query));

        let term_sets: Vec<BTreeSet<String>> = batch
            .iter()
            .map(|inv| {
                extract_query_param(inv)
                    .map(|q| extract_terms(&q))
                    .unwrap_or_default()
            })
            .collect();

        for (i, invocation) in batch.iter().enumerate() {
            let query = extract_query_param(invocation).unwrap_or_default();
            prompt.push_str(&format!("{}. {}({})", i + 1, invocation.tool, query));

            let mut notes = Vec::new();

            // Prior same-tool calls from the trace
            let prior: Vec<&crate::reasoning_state::TraceStep> = history
                .iter()
                .filter(|s| s.is_dispatch() && s.tool == invocation.tool)
                .rev()
                .take(self.max_history)
                .collect();
            for step in &prior {
                let similarity = jaccard(&term_sets[i], &extract_terms(&step.target));
                if similarity >= self.similarity_threshold {
                    notes.push(format!(
                        "similar to earlier {} call '{}' ({:.2})",
                        step.tool, step.target, similarity
                    ));
                }
            }

            // Earlier members of the same batch
            for j in 0..i {
                let similarity = jaccard(&term_sets[i], &term_sets[j]);
                if similarity >= self.similarity_threshold {
                    notes.push(format!("similar to pending call #{} ({:.2})", j + 1, similarity));
                }
            }

            if !notes.is_empty() {
                prompt.push_str(&format!("  [{}]", notes.join("; ")));
            }
            prompt.push('\n');
        }

        prompt.push_str("\nAnswer one line per call: <number>:KEEP or <number>:SKIP\n");
        prompt
    }
}
