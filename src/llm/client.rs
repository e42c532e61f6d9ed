//! LLM transport seam
//!
//! The engine consumes the model through this narrow trait; concrete
//! adapters (HTTP, local inference) live outside the crate.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::LlmError;
use crate::llm::types::{LlmRequest, LlmResponse};

/// Completion transport
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one completion request
    ///
    /// Implementations must observe `cancel` at every await point and
    /// return `LlmError::Cancelled` once it fires.
    async fn complete(
        &self,
        cancel: &CancellationToken,
        request: LlmRequest,
    ) -> Result<LlmResponse, LlmError>;
}

/// Fast classifier used by the batch filter
///
/// Receives a KEEP/SKIP prompt and returns the raw verdict text.
/// Optional; when absent the batch filter passes everything through.
#[async_trait]
pub trait BatchFilterer: Send + Sync {
    async fn filter_batch(
        &self,
        cancel: &CancellationToken,
        prompt: String,
    ) -> Result<String, LlmError>;
}
