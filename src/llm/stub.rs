//! Scripted LLM client for tests
//!
//! Plays back a fixed sequence of responses and records every request it
//! receives. No IO, no timing, fully deterministic.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::LlmError;
use crate::llm::client::{BatchFilterer, LlmClient};
use crate::llm::types::{LlmRequest, LlmResponse, StopReason, ToolInvocation};

/// Scripted client: pops one canned response per request
///
/// When the script is exhausted, returns an empty end-turn response so
/// loops terminate through the synthesis fallback instead of hanging.
pub struct StubLlm {
    responses: Mutex<Vec<LlmResponse>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl StubLlm {
    /// Build a stub from responses in playback order
    pub fn new(responses: Vec<LlmResponse>) -> Self {
        let mut reversed = responses;
        reversed.reverse();
        Self {
            responses: Mutex::new(reversed),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Canned text-only response
    pub fn text_response(content: impl Into<String>) -> LlmResponse {
        LlmResponse {
            content: content.into(),
            tool_calls: vec![],
            output_tokens: 16,
            stop_reason: StopReason::EndTurn,
            model: "stub".to_string(),
            duration: Duration::from_millis(1),
        }
    }

    /// Canned response requesting the given tool calls
    pub fn tool_response(tool_calls: Vec<ToolInvocation>) -> LlmResponse {
        LlmResponse {
            content: String::new(),
            tool_calls,
            output_tokens: 16,
            stop_reason: StopReason::ToolUse,
            model: "stub".to_string(),
            duration: Duration::from_millis(1),
        }
    }

    /// Requests observed so far, in order
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of completions served
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmClient for StubLlm {
    async fn complete(
        &self,
        cancel: &CancellationToken,
        request: LlmRequest,
    ) -> Result<LlmResponse, LlmError> {
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }
        self.requests.lock().unwrap().push(request);
        let next = self.responses.lock().unwrap().pop();
        Ok(next.unwrap_or_else(|| Self::text_response("")))
    }
}

/// Scripted batch-filter classifier
pub struct StubFilterer {
    verdicts: Mutex<Vec<Result<String, LlmError>>>,
    prompts: Mutex<Vec<String>>,
}

impl StubFilterer {
    pub fn new(verdicts: Vec<Result<String, LlmError>>) -> Self {
        let mut reversed = verdicts;
        reversed.reverse();
        Self {
            verdicts: Mutex::new(reversed),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts observed so far, in order
    pub fn recorded_prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl BatchFilterer for StubFilterer {
    async fn filter_batch(
        &self,
        cancel: &CancellationToken,
        prompt: String,
    ) -> Result<String, LlmError> {
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }
        self.prompts.lock().unwrap().push(prompt);
        self.verdicts
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Ok(String::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ToolChoice;

    fn empty_request() -> LlmRequest {
        LlmRequest {
            messages: vec![],
            tools: vec![],
            tool_choice: ToolChoice::Auto,
            max_output_tokens: 256,
        }
    }

    #[tokio::test]
    async fn test_stub_plays_back_in_order() {
        let stub = StubLlm::new(vec![
            StubLlm::text_response("first"),
            StubLlm::text_response("second"),
        ]);
        let cancel = CancellationToken::new();

        let a = stub.complete(&cancel, empty_request()).await.unwrap();
        let b = stub.complete(&cancel, empty_request()).await.unwrap();
        assert_eq!(a.content, "first");
        assert_eq!(b.content, "second");
        assert_eq!(stub.call_count(), 2);
    }

    #[tokio::test]
    async fn test_stub_exhausted_returns_empty() {
        let stub = StubLlm::new(vec![]);
        let cancel = CancellationToken::new();
        let response = stub.complete(&cancel, empty_request()).await.unwrap();
        assert!(response.is_empty());
    }

    #[tokio::test]
    async fn test_stub_observes_cancellation() {
        let stub = StubLlm::new(vec![StubLlm::text_response("never")]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = stub.complete(&cancel, empty_request()).await;
        assert!(matches!(result, Err(LlmError::Cancelled)));
    }
}
