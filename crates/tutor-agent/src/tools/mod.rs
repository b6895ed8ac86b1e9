//! Tool system for AI agent tool calling.
//!
//! Defines the `Tool` trait that all tools implement, plus a registry
//! for managing available tools and converting them to LLM API format.

pub mod memory;
pub mod retrieve;
pub mod tool_loop;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::provider::ToolDefinition;

/// Result of executing a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Text content returned to the LLM.
    pub content: String,
    /// Whether the tool execution failed.
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            is_error: true,
        }
    }
}

/// Trait that all tools must implement.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name for this tool (e.g. "retrieve").
    fn name(&self) -> &str;
    /// Human-readable description of what this tool does.
    fn description(&self) -> &str;
    /// JSON Schema for the tool's input parameters.
    fn input_schema(&self) -> serde_json::Value;
    /// Execute the tool with the given input.
    async fn execute(&self, input: serde_json::Value) -> ToolResult;
}

/// Static catalog of all built-in tools (name, description) — useful for
/// a `/tools` listing without instantiating any of them.
pub fn tool_catalog() -> Vec<(&'static str, &'static str)> {
    vec![
        ("retrieve", "Search the knowledge base for relevant passages and citations"),
        ("save_user_info", "Save a labeled fact about the learner"),
        ("get_user_info", "Read previously saved facts about the learner"),
        ("remember", "Remember a fact the learner asked to be remembered"),
        ("forget", "Forget a previously remembered fact"),
        ("list_memories", "List every fact remembered about the learner"),
        ("clear_all_memories", "Erase every remembered fact about the learner"),
    ]
}

/// Convert a slice of tools to API-level tool definitions.
pub fn to_definitions(tools: &[Box<dyn Tool>]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .map(|t| ToolDefinition {
            name: t.name().to_string(),
            description: t.description().to_string(),
            input_schema: t.input_schema(),
        })
        .collect()
}

/// Records which tools ran during one turn so the orchestrator can report
/// `metadata.tools_used` without threading call history back out through
/// `ToolResult`'s fixed shape.
#[derive(Default)]
pub struct ToolCallLog {
    counts: Mutex<HashMap<String, u32>>,
}

impl ToolCallLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    async fn record(&self, name: &str) {
        *self.counts.lock().await.entry(name.to_string()).or_insert(0) += 1;
    }

    /// Drains the log into a stable (insertion order not preserved —
    /// sorted by name) list of `(name, call_count)` pairs.
    pub async fn summarize(&self) -> Vec<(String, u32)> {
        let counts = self.counts.lock().await;
        let mut entries: Vec<_> = counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

/// Wraps a `Tool` so every invocation is recorded in a shared `ToolCallLog`
/// before delegating to the inner implementation.
pub struct Logged<T: Tool> {
    inner: T,
    log: Arc<ToolCallLog>,
}

impl<T: Tool> Logged<T> {
    pub fn new(inner: T, log: Arc<ToolCallLog>) -> Self {
        Self { inner, log }
    }
}

#[async_trait]
impl<T: Tool> Tool for Logged<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn input_schema(&self) -> serde_json::Value {
        self.inner.input_schema()
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        self.log.record(self.inner.name()).await;
        self.inner.execute(input).await
    }
}
