//! Tool seams — executor and registry traits
//!
//! Tool implementations live outside the crate; the engine sees them
//! through these two traits plus the wire types in [`crate::llm`].

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;
use crate::llm::{ToolDefinition, ToolInvocation, ToolResult};

/// Executes one tool invocation
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run the invocation to completion
    ///
    /// Implementations must observe `cancel` and return
    /// `ToolError::Cancelled` once it fires.
    async fn execute(
        &self,
        cancel: &CancellationToken,
        invocation: &ToolInvocation,
    ) -> Result<ToolResult, ToolError>;
}

/// Enumerates the available tools and their schemas
pub trait ToolRegistry: Send + Sync {
    /// All tool definitions, for prompt construction and routing
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Definition by name
    fn get(&self, name: &str) -> Option<ToolDefinition>;

    /// Whether a tool is registered
    fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Registered tool names
    fn names(&self) -> Vec<String> {
        self.definitions().into_iter().map(|d| d.name).collect()
    }
}

/// Fixed registry backed by a definition list
pub struct StaticRegistry {
    definitions: Vec<ToolDefinition>,
    by_name: HashMap<String, usize>,
}

impl StaticRegistry {
    pub fn new(definitions: Vec<ToolDefinition>) -> Self {
        let by_name = definitions
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name.clone(), i))
            .collect();
        Self {
            definitions,
            by_name,
        }
    }

    /// Registry with the given names and empty object schemas (for testing)
    pub fn with_names(names: &[&str]) -> Self {
        let definitions = names
            .iter()
            .map(|name| ToolDefinition {
                name: name.to_string(),
                description: format!("{} tool", name),
                schema: serde_json::json!({"type": "object"}),
            })
            .collect();
        Self::new(definitions)
    }
}

impl ToolRegistry for StaticRegistry {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.definitions.clone()
    }

    fn get(&self, name: &str) -> Option<ToolDefinition> {
        self.by_name.get(name).map(|&i| self.definitions[i].clone())
    }
}

/// Scripted executor for tests
///
/// Answers every invocation of a tool with the next canned result for
/// that tool, falling back to echoing the invocation.
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, Vec<Result<ToolResult, ToolError>>>>,
    executed: Mutex<Vec<ToolInvocation>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Queue a result for the named tool (served FIFO per tool)
    pub fn push_result(&self, tool: &str, result: Result<ToolResult, ToolError>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(tool.to_string())
            .or_default()
            .push(result);
    }

    /// Invocations executed so far, in dispatch order
    pub fn executed(&self) -> Vec<ToolInvocation> {
        self.executed.lock().unwrap().clone()
    }
}

impl Default for ScriptedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        cancel: &CancellationToken,
        invocation: &ToolInvocation,
    ) -> Result<ToolResult, ToolError> {
        if cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }
        self.executed.lock().unwrap().push(invocation.clone());

        let mut scripts = self.scripts.lock().unwrap();
        if let Some(queue) = scripts.get_mut(&invocation.tool) {
            if !queue.is_empty() {
                return queue.remove(0);
            }
        }
        Ok(ToolResult::ok(
            invocation,
            format!("{} executed", invocation.tool),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_static_registry_lookup() {
        let registry = StaticRegistry::with_names(&["find_references", "find_callers"]);
        assert!(registry.contains("find_references"));
        assert!(!registry.contains("unknown_tool"));
        assert_eq!(registry.definitions().len(), 2);
        assert_eq!(
            registry.get("find_callers").unwrap().name,
            "find_callers"
        );
    }

    #[test]
    fn test_registry_names() {
        let registry = StaticRegistry::with_names(&["a", "b"]);
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_scripted_executor_serves_fifo() {
        let executor = ScriptedExecutor::new();
        let inv = ToolInvocation::new("find_symbol", json!({"name": "Foo"}));
        executor.push_result("find_symbol", Ok(ToolResult::ok(&inv, "first")));
        executor.push_result("find_symbol", Ok(ToolResult::ok(&inv, "second")));

        let cancel = CancellationToken::new();
        let a = executor.execute(&cancel, &inv).await.unwrap();
        let b = executor.execute(&cancel, &inv).await.unwrap();
        assert_eq!(a.output, "first");
        assert_eq!(b.output, "second");
        assert_eq!(executor.executed().len(), 2);
    }

    #[tokio::test]
    async fn test_scripted_executor_echo_fallback() {
        let executor = ScriptedExecutor::new();
        let inv = ToolInvocation::new("list_packages", json!({}));
        let cancel = CancellationToken::new();
        let result = executor.execute(&cancel, &inv).await.unwrap();
        assert!(result.success);
        assert!(result.output.contains("list_packages"));
    }
}
