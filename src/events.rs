//! Typed engine events
//!
//! One-way sink consumed by telemetry, coordinators, and UIs. Events for
//! a session are emitted in order; no ordering holds across sessions.

use serde::{Deserialize, Serialize};

use crate::phases::PhaseState;

/// Event emitted by the engine during a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    SessionStart {
        query: String,
        project_root: String,
    },
    StateTransition {
        from: PhaseState,
        to: PhaseState,
    },
    ToolForcing {
        tool: String,
        reason: String,
    },
    ToolRouting {
        tool: String,
        corrected_from: Option<String>,
    },
    LlmRequest {
        message_count: usize,
        tool_choice: String,
    },
    LlmResponse {
        output_tokens: u64,
        tool_call_count: usize,
        stop_reason: String,
    },
    ToolInvocation {
        tool: String,
        invocation_id: String,
    },
    ToolResult {
        tool: String,
        success: bool,
        duration_ms: u64,
    },
    SafetyCheck {
        tool: String,
        blocked: bool,
    },
    ContextUpdate {
        total_tokens: u64,
        message_count: usize,
    },
    StepComplete {
        step_number: u64,
    },
    Reflection {
        decision: String,
    },
    CycleDetected {
        length: usize,
        tools: Vec<String>,
    },
    GraphRefreshed {
        files_refreshed: usize,
        nodes_added: usize,
        nodes_removed: usize,
    },
    Error {
        message: String,
        fatal: bool,
    },
}

/// One-way event sink
pub trait EventEmitter: Send + Sync {
    fn emit(&self, session_id: &str, event: AgentEvent);
}

/// Sink that drops everything
pub struct NullEmitter;

impl EventEmitter for NullEmitter {
    fn emit(&self, _session_id: &str, _event: AgentEvent) {}
}

/// Sink that records events in memory (for testing)
pub struct RecordingEmitter {
    events: std::sync::Mutex<Vec<(String, AgentEvent)>>,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self {
            events: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// All events recorded so far, in emission order
    pub fn events(&self) -> Vec<(String, AgentEvent)> {
        self.events.lock().unwrap().clone()
    }
}

impl Default for RecordingEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventEmitter for RecordingEmitter {
    fn emit(&self, session_id: &str, event: AgentEvent) {
        self.events
            .lock()
            .unwrap()
            .push((session_id.to_string(), event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_emitter_preserves_order() {
        let emitter = RecordingEmitter::new();
        emitter.emit(
            "s1",
            AgentEvent::SessionStart {
                query: "find Handler".to_string(),
                project_root: "/tmp/project".to_string(),
            },
        );
        emitter.emit("s1", AgentEvent::StepComplete { step_number: 1 });

        let events = emitter.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0].1, AgentEvent::SessionStart { .. }));
        assert!(matches!(
            events[1].1,
            AgentEvent::StepComplete { step_number: 1 }
        ));
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = AgentEvent::CycleDetected {
            length: 2,
            tools: vec!["find_callers".to_string(), "find_callees".to_string()],
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"cycle_detected\""));
    }
}
