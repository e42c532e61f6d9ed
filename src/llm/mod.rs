//! LLM interface — wire types, transport seam, test stubs

mod client;
pub mod stub;
mod types;

pub use client::{BatchFilterer, LlmClient};
pub use types::{
    LlmRequest, LlmResponse, Message, Role, StopReason, ToolChoice, ToolDefinition,
    ToolInvocation, ToolResult,
};
