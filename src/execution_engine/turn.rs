//! EXECUTE orchestration — one turn of the reasoning loop
//!
//! Order of operations per turn:
//! 1. budget check, 2. routed-tool semantic validation, 3. hard-forcing
//! pre-check (bypasses the LLM), 4. LLM call, 5. response validation
//! with tool-choice escalation, 6. batch filter + per-call guards +
//! sequential dispatch, 7. ledger/proof/dirty updates and Brent check,
//! 8. synthesis on text-only completion.

use std::time::Instant;

use crate::error::{EngineError, LlmError, ToolError};
use crate::events::AgentEvent;
use crate::llm::{LlmRequest, Message, ToolChoice, ToolInvocation, ToolResult};
use crate::phases::{Dependencies, PhaseState};
use crate::reasoning_state::{
    node_id, Actor, FailureEvent, FailureType, ProofUpdate, ProofUpdateType, SignalSource,
    StepAction, TraceStep,
};
use crate::routing::{ParameterExtractor, SemanticValidator};
use crate::session::{estimate_tokens, Session};

use super::batch_filter::BatchFilter;
use super::cycle_detector::CycleDetector;
use super::query_terms::extract_query_param;
use super::repetition_guard::{GuardDecision, RepetitionGuard};
use super::response_validator::{
    ResponseValidator, Validation, ValidationPolicy, ANTI_TOOL_CALL_PROMPT,
};
use super::synthesis::{is_not_found, Synthesizer};

/// Tool-name prefixes that imply project mutation (safety-gated)
const MUTATING_PREFIXES: &[&str] = &["write", "edit", "delete", "create", "apply", "file_write"];

/// Tool-name prefix of graph-backed lookups (deferred refresh)
const GRAPH_TOOL_PREFIX: &str = "find_";

fn is_mutating(tool: &str) -> bool {
    MUTATING_PREFIXES
        .iter()
        .any(|p| tool.starts_with(p) || tool.contains(&format!("_{}", p)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DispatchKind {
    Llm,
    Forced,
}

/// Whether a dispatch closed a cycle (the batch stops there)
struct DispatchOutcome {
    cycle_fired: bool,
}

/// EXECUTE subsystem state carried across turns of one session run
pub struct ExecutionEngine {
    batch_filter: BatchFilter,
    guard: RepetitionGuard,
    cycles: CycleDetector,
    validator: ResponseValidator,
    synthesizer: Synthesizer,
    extractor: ParameterExtractor,
    semantic: SemanticValidator,
    tool_choice: ToolChoice,
    anti_tool_call_active: bool,
}

impl ExecutionEngine {
    pub fn new(deps: &Dependencies) -> Self {
        let tool_names = deps.registry.names();
        Self {
            batch_filter: BatchFilter::new(&deps.config),
            guard: RepetitionGuard::new(&deps.config),
            cycles: CycleDetector::new(),
            validator: ResponseValidator::new(&tool_names),
            synthesizer: Synthesizer::new(deps.config.synthesis_max_output_tokens),
            extractor: ParameterExtractor::new(),
            semantic: SemanticValidator::new(),
            tool_choice: ToolChoice::Auto,
            anti_tool_call_active: false,
        }
    }

    /// Run one EXECUTE turn
    pub async fn execute_turn(
        &mut self,
        session: &mut Session,
        deps: &Dependencies,
    ) -> Result<PhaseState, EngineError> {
        if deps.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        // Step/token budgets terminate through synthesis, never abruptly
        if session.metrics.steps >= deps.config.max_steps
            || session.metrics.total_tokens >= deps.config.max_tokens
        {
            tracing::info!(
                session_id = %session.id,
                steps = session.metrics.steps,
                tokens = session.metrics.total_tokens,
                "budget exhausted; synthesizing"
            );
            return self.synthesize_and_complete(session, deps).await;
        }

        self.validate_routed_tool(session, deps);

        // Hard-forcing pre-check: skip the LLM when the router picked a
        // tool and its parameters fall out of the query
        if !session.hard_forced && session.router_enabled {
            if let Some(routed) = session.routed_tool.clone() {
                session.hard_forced = true;
                if let Some(invocation) = self.extractor.prepare(&routed, &session.query) {
                    deps.events.emit(
                        &session.id,
                        AgentEvent::ToolForcing {
                            tool: routed.clone(),
                            reason: "parameters rule-extractable from query".to_string(),
                        },
                    );
                    session.context_mut()?.push_message(Message::assistant(format!(
                        "[requested 1 tool call(s): {}]",
                        routed
                    )));
                    self.dispatch(session, deps, invocation, DispatchKind::Forced)
                        .await?;
                    return Ok(PhaseState::Execute);
                }
            }
        }

        let Some(llm) = deps.llm.clone() else {
            return self.synthesize_and_complete(session, deps).await;
        };

        let forced_none =
            session.circuit_breaker_active || self.tool_choice == ToolChoice::None;
        let choice = if session.circuit_breaker_active {
            ToolChoice::None
        } else {
            self.tool_choice.clone()
        };

        let request = self.build_request(session, deps, choice)?;
        deps.events.emit(
            &session.id,
            AgentEvent::LlmRequest {
                message_count: request.messages.len(),
                tool_choice: format!("{:?}", request.tool_choice),
            },
        );

        let response = match llm.complete(&deps.cancel, request).await {
            Ok(response) => response,
            Err(LlmError::Cancelled) => return Err(EngineError::Cancelled),
            Err(error) => {
                tracing::warn!(session_id = %session.id, %error, "LLM call failed; degrading");
                session.note_degraded(format!("LLM unavailable during execution: {}", error));
                return self.degraded_answer(session, deps).await;
            }
        };
        session.metrics.total_tokens += response.output_tokens;
        deps.events.emit(
            &session.id,
            AgentEvent::LlmResponse {
                output_tokens: response.output_tokens,
                tool_call_count: response.tool_calls.len(),
                stop_reason: format!("{:?}", response.stop_reason),
            },
        );

        let policy = ValidationPolicy {
            require_tools: session.context()?.tool_results.is_empty(),
            expected_tool: session.routed_tool.clone(),
            forced_none,
            circuit_breaker_active: session.circuit_breaker_active,
            require_citations: true,
        };
        match self.validator.classify(&response, &policy) {
            Validation::Valid => {}
            Validation::ToolMissing { correction } => {
                if session.metrics.forcing_retries < deps.config.max_forcing_retries {
                    session.metrics.forcing_retries += 1;
                    self.tool_choice =
                        self.tool_choice.escalate(session.routed_tool.as_deref());
                    session.context_mut()?.push_message(Message::user(correction));
                    return Ok(PhaseState::Execute);
                }
                tracing::warn!(
                    session_id = %session.id,
                    "forcing retries exhausted; synthesizing from gathered evidence"
                );
                return self.synthesize_and_complete(session, deps).await;
            }
            Validation::Quality { correction } => {
                // Quality retries keep the current tool choice; the
                // model only needs to restate, not re-explore
                if session.metrics.forcing_retries < deps.config.max_forcing_retries {
                    session.metrics.forcing_retries += 1;
                    session.context_mut()?.push_message(Message::user(correction));
                    return Ok(PhaseState::Execute);
                }
                return self.synthesize_and_complete(session, deps).await;
            }
            Validation::ToolCallEscape => {
                if !self.anti_tool_call_active
                    && session.metrics.forcing_retries < deps.config.max_forcing_retries
                {
                    // Desperation retry with the anti-tool-call prompt
                    self.anti_tool_call_active = true;
                    session.metrics.forcing_retries += 1;
                    return Ok(PhaseState::Execute);
                }
                let stripped = self.validator.strip_tool_call_patterns(&response.content);
                session.context_mut()?.push_message(Message::assistant(stripped));
                return Ok(PhaseState::Complete);
            }
        }

        if !response.tool_calls.is_empty() {
            let halted = self
                .dispatch_batch(session, deps, response.tool_calls)
                .await?;
            if !halted
                && session.metrics.steps > 0
                && session.metrics.steps % deps.config.reflection_threshold == 0
            {
                return Ok(PhaseState::Reflect);
            }
            return Ok(PhaseState::Execute);
        }

        // Text-only completion
        if response.content.trim().is_empty() {
            return self.synthesize_and_complete(session, deps).await;
        }

        let mut answer = response.content;
        if let Some(grounder) = &deps.grounder {
            let violations = grounder.verify(&answer, session.context()?);
            if !violations.is_empty() {
                if session.metrics.forcing_retries < deps.config.max_forcing_retries {
                    session.metrics.forcing_retries += 1;
                    let complaints = violations
                        .iter()
                        .map(|v| format!("- {} ({})", v.claim, v.reason))
                        .collect::<Vec<_>>()
                        .join("\n");
                    session.context_mut()?.push_message(Message::user(format!(
                        "These claims are not supported by the gathered evidence:\n{}\n\
                         Answer again using only supported, cited claims.",
                        complaints
                    )));
                    return Ok(PhaseState::Execute);
                }
                answer.push_str(&format!(
                    "\n\n[grounding-warning: {} unverified claim(s) remain]",
                    violations.len()
                ));
            }
        }
        session.context_mut()?.push_message(Message::assistant(answer));
        Ok(PhaseState::Complete)
    }

    /// Re-validate the routed tool; the correction cache keeps EXECUTE
    /// re-entries from duplicating the trace step
    fn validate_routed_tool(&self, session: &mut Session, deps: &Dependencies) {
        let Some(routed) = session.routed_tool.clone() else {
            return;
        };
        let validation = self
            .semantic
            .validate_tool_query_semantics(&session.query, &routed);
        if !validation.was_changed {
            return;
        }
        session.routed_tool = Some(validation.tool.clone());
        deps.events.emit(
            &session.id,
            AgentEvent::ToolRouting {
                tool: validation.tool.clone(),
                corrected_from: Some(routed.clone()),
            },
        );
        if deps
            .corrections
            .first_time(&session.id, &session.query, &validation.tool)
        {
            deps.ledger.record_trace_step(
                &session.id,
                TraceStep::new(StepAction::SemanticCorrection, validation.tool.clone())
                    .with_target(&session.query)
                    .with_actor(Actor::Router)
                    .with_metadata("corrected_from", routed)
                    .with_metadata(
                        "reason",
                        validation.reason.unwrap_or_default(),
                    ),
            );
        }
    }

    fn build_request(
        &self,
        session: &Session,
        deps: &Dependencies,
        tool_choice: ToolChoice,
    ) -> Result<LlmRequest, EngineError> {
        let context = session.context()?;
        let mut system = context.system_prompt.clone();
        if self.anti_tool_call_active {
            system.push_str("\n\n");
            system.push_str(ANTI_TOOL_CALL_PROMPT);
        }
        let mut messages = vec![Message::system(system)];
        messages.extend(context.history.iter().cloned());
        Ok(LlmRequest {
            messages,
            tools: deps.registry.definitions(),
            tool_choice,
            max_output_tokens: deps.config.synthesis_max_output_tokens,
        })
    }

    /// Filter then sequentially dispatch one requested batch
    ///
    /// Returns true when a cycle halted the batch.
    async fn dispatch_batch(
        &mut self,
        session: &mut Session,
        deps: &Dependencies,
        batch: Vec<ToolInvocation>,
    ) -> Result<bool, EngineError> {
        let names: Vec<&str> = batch.iter().map(|c| c.tool.as_str()).collect();
        session.context_mut()?.push_message(Message::assistant(format!(
            "[requested {} tool call(s): {}]",
            batch.len(),
            names.join(", ")
        )));

        let batch_size = batch.len();
        let outcome = self
            .batch_filter
            .filter(
                &deps.cancel,
                deps.batch_filterer.as_deref(),
                &session.id,
                &session.query,
                &deps.ledger,
                batch,
            )
            .await;

        if !outcome.skipped.is_empty() {
            deps.ledger.record_trace_step(
                &session.id,
                TraceStep::new(StepAction::BatchFilter, "")
                    .with_target(&session.query)
                    .with_metadata("batch_size", batch_size.to_string())
                    .with_metadata("kept", outcome.kept.len().to_string())
                    .with_metadata("skipped", outcome.skipped.len().to_string()),
            );
            for (invocation, failure) in &outcome.skipped {
                tracing::debug!(
                    session_id = %session.id,
                    tool = %invocation.tool,
                    "batch filter skipped invocation"
                );
                // Soft source: recorded, never produces a clause
                let learned = deps.ledger.learn_from_failure(failure);
                debug_assert!(learned.is_none());
            }
        }

        for invocation in outcome.kept {
            if deps.cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let result = self
                .dispatch(session, deps, invocation, DispatchKind::Llm)
                .await?;
            if result.cycle_fired {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Guard, execute, and record one invocation
    async fn dispatch(
        &mut self,
        session: &mut Session,
        deps: &Dependencies,
        invocation: ToolInvocation,
        kind: DispatchKind,
    ) -> Result<DispatchOutcome, EngineError> {
        let tool = invocation.tool.clone();
        let target = extract_query_param(&invocation).unwrap_or_default();
        let no_cycle = DispatchOutcome { cycle_fired: false };

        // Learned clauses veto the decision before anything runs
        if let Err(clause_id) = deps.ledger.check_decision_allowed(&session.id, &tool) {
            self.refuse(
                session,
                deps,
                &invocation,
                &target,
                format!("Tool '{}' blocked by learned constraint {}", tool, clause_id),
                vec![("clause_id".to_string(), clause_id)],
                None,
            )?;
            return Ok(no_cycle);
        }

        // Proof-level breaker (disproven node or runaway proof number)
        if let Some(reason) = deps.ledger.check_circuit_breaker(&session.id, &tool) {
            self.refuse(
                session,
                deps,
                &invocation,
                &target,
                format!("Tool '{}' refused: {}", tool, reason),
                vec![("reason".to_string(), reason)],
                None,
            )?;
            return Ok(no_cycle);
        }

        // Count and semantic breakers
        if let GuardDecision::Refuse {
            failure,
            message,
            metadata,
        } = self.guard.check(&session.id, &deps.ledger, &invocation)
        {
            self.refuse(
                session,
                deps,
                &invocation,
                &target,
                message,
                metadata,
                Some(failure),
            )?;
            return Ok(no_cycle);
        }

        // Deferred refresh: graph-backed tools see a fresh graph
        if tool.starts_with(GRAPH_TOOL_PREFIX) && deps.dirty.has_dirty() {
            if let Some(refresher) = &deps.refresher {
                let paths = deps.dirty.take_dirty();
                match refresher.refresh_files(&deps.cancel, &paths).await {
                    Ok(refresh) => {
                        deps.ledger.invalidate_graph_cache();
                        deps.events.emit(
                            &session.id,
                            AgentEvent::GraphRefreshed {
                                files_refreshed: refresh.files_refreshed,
                                nodes_added: refresh.nodes_added,
                                nodes_removed: refresh.nodes_removed,
                            },
                        );
                    }
                    Err(error) => {
                        tracing::warn!(session_id = %session.id, %error, "graph refresh failed");
                    }
                }
            }
        }

        // Safety gate for mutating tools
        if is_mutating(&tool) {
            if let Some(safety) = &deps.safety {
                let changes = vec![crate::safety::ProposedChange {
                    path: invocation.arg_str("path").unwrap_or_default().to_string(),
                    description: format!("{} via {}", target, tool),
                }];
                let check = safety.check(&deps.cancel, &changes).await;
                let blocked = safety.should_block(&check);
                deps.events.emit(
                    &session.id,
                    AgentEvent::SafetyCheck {
                        tool: tool.clone(),
                        blocked,
                    },
                );
                if blocked {
                    deps.ledger.mark_tool_disproven(&session.id, &tool);
                    self.refuse(
                        session,
                        deps,
                        &invocation,
                        &target,
                        format!(
                            "Tool '{}' blocked by safety policy: {}",
                            tool,
                            check.reasons.join("; ")
                        ),
                        vec![("reason".to_string(), "safety_block".to_string())],
                        Some(FailureEvent::new(FailureType::Safety, &session.id, &tool)),
                    )?;
                    return Ok(no_cycle);
                }
            }
        }

        // Execute
        deps.events.emit(
            &session.id,
            AgentEvent::ToolInvocation {
                tool: tool.clone(),
                invocation_id: invocation.id.clone(),
            },
        );
        let started = Instant::now();
        let executed = deps.executor.execute(&deps.cancel, &invocation).await;
        let duration = started.elapsed();

        let (mut result, error_category) = match executed {
            Ok(mut result) => {
                if result.duration.is_zero() {
                    result.duration = duration;
                }
                (result, None)
            }
            Err(ToolError::Cancelled) => return Err(EngineError::Cancelled),
            Err(error) => {
                let category = error.category().map(String::from);
                (
                    ToolResult::synthetic_error(
                        invocation.id.clone(),
                        tool.clone(),
                        error.to_string(),
                    ),
                    category,
                )
            }
        };

        // Deterministic tool errors are hard signals
        if let Some(category) = &error_category {
            let failure = FailureEvent::new(FailureType::ToolError, &session.id, &tool)
                .with_error_category(category.clone());
            if let Some(clause_id) = deps.ledger.learn_from_failure(&failure) {
                self.record_clause_learned(session, deps, &tool, &clause_id);
            }
        }

        deps.ledger.update_proof_number(ProofUpdate {
            node_id: node_id(&session.id, &tool),
            update_type: if result.success {
                ProofUpdateType::Decrement
            } else {
                ProofUpdateType::Increment
            },
            delta: 1,
            reason: if result.success {
                "tool call succeeded".to_string()
            } else {
                "tool call failed".to_string()
            },
            source: SignalSource::Hard,
        });

        let actor = match kind {
            DispatchKind::Llm => Actor::MainAgent,
            DispatchKind::Forced => Actor::Router,
        };
        let mut step = TraceStep::new(
            match kind {
                DispatchKind::Llm => StepAction::ToolCall,
                DispatchKind::Forced => StepAction::ToolCallForced,
            },
            tool.clone(),
        )
        .with_target(&target)
        .with_duration(duration)
        .with_actor(actor);
        if kind == DispatchKind::Forced {
            step = step
                .with_metadata("forced_by", "router")
                .with_metadata("result_preview", preview(&result.output));
        }
        if let Some(error) = &result.error {
            step = step.with_error(error.clone());
        }
        if let Some(category) = &error_category {
            step = step.with_metadata("error_category", category.clone());
        }
        let step_number = deps.ledger.record_trace_step(&session.id, step);

        session.metrics.steps += 1;
        session.metrics.tool_calls += 1;
        if result.tokens_used == 0 {
            // Estimated so token accounting stays non-zero on forced
            // executions that never touched the LLM
            result.tokens_used = estimate_tokens(&result.output);
        }
        session.metrics.total_tokens += result.tokens_used;
        if result.success && is_not_found(&result.output) {
            session.metrics.not_found_streak += 1;
        } else {
            session.metrics.not_found_streak = 0;
        }

        deps.dirty.mark_dirty(&result.modified_files);
        deps.events.emit(
            &session.id,
            AgentEvent::ToolResult {
                tool: tool.clone(),
                success: result.success,
                duration_ms: result.duration.as_millis() as u64,
            },
        );
        let success = result.success;
        session.context_mut()?.push_tool_result(result);
        {
            let context = session.context()?;
            deps.events.emit(
                &session.id,
                AgentEvent::ContextUpdate {
                    total_tokens: context.total_tokens,
                    message_count: context.history.len(),
                },
            );
        }
        deps.events
            .emit(&session.id, AgentEvent::StepComplete { step_number });

        // Brent check after every step
        if let Some(cycle) = self.cycles.record(actor, &tool, success) {
            self.handle_cycle(session, deps, &tool, cycle)?;
            return Ok(DispatchOutcome { cycle_fired: true });
        }
        Ok(no_cycle)
    }

    /// Common refusal path: trace step, learning, synthetic result
    #[allow(clippy::too_many_arguments)]
    fn refuse(
        &self,
        session: &mut Session,
        deps: &Dependencies,
        invocation: &ToolInvocation,
        target: &str,
        message: String,
        metadata: Vec<(String, String)>,
        failure: Option<FailureEvent>,
    ) -> Result<(), EngineError> {
        let tool = invocation.tool.clone();
        tracing::info!(session_id = %session.id, tool = %tool, %message, "dispatch refused");

        let mut step = TraceStep::new(StepAction::CircuitBreaker, tool.clone())
            .with_target(target)
            .with_error(message.clone());
        for (key, value) in metadata {
            step = step.with_metadata(key, value);
        }
        deps.ledger.record_trace_step(&session.id, step);

        if let Some(failure) = failure {
            if let Some(clause_id) = deps.ledger.learn_from_failure(&failure) {
                self.record_clause_learned(session, deps, &tool, &clause_id);
            }
            deps.ledger.update_proof_number(ProofUpdate {
                node_id: node_id(&session.id, &tool),
                update_type: ProofUpdateType::Increment,
                delta: 1,
                reason: format!("{} refusal", failure.failure_type.as_str()),
                source: failure.source,
            });
        }

        session.circuit_breaker_active = true;
        // Refusals consume a step so a model that keeps requesting a
        // refused tool still runs into the step budget
        session.metrics.steps += 1;
        deps.events.emit(
            &session.id,
            AgentEvent::ToolResult {
                tool: tool.clone(),
                success: false,
                duration_ms: 0,
            },
        );
        session.context_mut()?.push_tool_result(ToolResult::synthetic_error(
            invocation.id.clone(),
            tool,
            message,
        ));
        Ok(())
    }

    fn record_clause_learned(
        &self,
        session: &Session,
        deps: &Dependencies,
        tool: &str,
        clause_id: &str,
    ) {
        deps.ledger.record_trace_step(
            &session.id,
            TraceStep::new(StepAction::ClauseLearned, tool)
                .with_metadata("clause_id", clause_id),
        );
    }

    /// A cycle closed: disprove its nodes, learn, halt the batch
    fn handle_cycle(
        &mut self,
        session: &mut Session,
        deps: &Dependencies,
        closing_tool: &str,
        cycle: super::cycle_detector::CycleInfo,
    ) -> Result<(), EngineError> {
        tracing::warn!(
            session_id = %session.id,
            length = cycle.length,
            tools = ?cycle.tools,
            "cycle detected"
        );
        deps.ledger.record_trace_step(
            &session.id,
            TraceStep::new(StepAction::CycleDetected, closing_tool)
                .with_metadata("length", cycle.length.to_string())
                .with_metadata("tools", cycle.tools.join(",")),
        );
        deps.events.emit(
            &session.id,
            AgentEvent::CycleDetected {
                length: cycle.length,
                tools: cycle.tools.clone(),
            },
        );

        // Every proof node on the cycle is disproven
        let mut unique = cycle.tools.clone();
        unique.sort();
        unique.dedup();
        for tool in &unique {
            deps.ledger.mark_tool_disproven(&session.id, tool);
        }

        let failure = FailureEvent::new(FailureType::Cycle, &session.id, closing_tool)
            .with_decision_path(cycle.tools.clone());
        if let Some(clause_id) = deps.ledger.learn_from_failure(&failure) {
            self.record_clause_learned(session, deps, closing_tool, &clause_id);
        }

        session.circuit_breaker_active = true;
        session.context_mut()?.push_tool_result(ToolResult::synthetic_error(
            format!("cycle:{}", uuid::Uuid::new_v4()),
            closing_tool.to_string(),
            format!(
                "Exploration is cycling over [{}] without progress; \
                 synthesize an answer from the results gathered so far.",
                cycle.tools.join(" → ")
            ),
        ));
        Ok(())
    }

    /// Best-effort degraded answer when the LLM dropped mid-session
    async fn degraded_answer(
        &self,
        session: &mut Session,
        deps: &Dependencies,
    ) -> Result<PhaseState, EngineError> {
        let answer = {
            let context = session.context()?;
            self.synthesizer
                .synthesize(
                    &deps.cancel,
                    None,
                    None,
                    &session.id,
                    &session.query,
                    session.language.as_deref(),
                    context,
                    &deps.ledger,
                )
                .await
        };
        let note = session.degraded_reasons.join("; ");
        session.context_mut()?.push_message(Message::assistant(format!(
            "{}\n\n[degraded: {}]",
            answer, note
        )));
        Ok(PhaseState::Degraded)
    }

    /// Synthesize the final answer and finish in COMPLETE
    pub(crate) async fn synthesize_and_complete(
        &self,
        session: &mut Session,
        deps: &Dependencies,
    ) -> Result<PhaseState, EngineError> {
        let answer = {
            let context = session.context()?;
            self.synthesizer
                .synthesize(
                    &deps.cancel,
                    deps.llm.as_deref(),
                    deps.grounder.as_deref(),
                    &session.id,
                    &session.query,
                    session.language.as_deref(),
                    context,
                    &deps.ledger,
                )
                .await
        };
        session.context_mut()?.push_message(Message::assistant(answer));
        Ok(PhaseState::Complete)
    }
}

fn preview(output: &str) -> String {
    const PREVIEW_LEN: usize = 120;
    if output.chars().count() <= PREVIEW_LEN {
        output.to_string()
    } else {
        let short: String = output.chars().take(PREVIEW_LEN).collect();
        format!("{}…", short)
    }
}
