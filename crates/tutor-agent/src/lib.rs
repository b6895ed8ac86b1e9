//! The reasoning agent: LLM provider abstraction, prompt construction, the
//! tool-using turn loop, and the turn orchestrator that ties moderation,
//! retrieval, and memory together into a single `HandleTurn` call.

pub mod anthropic;
pub mod anthropic_stream;
pub mod health;
pub mod insight;
pub mod intent;
pub mod openai;
pub mod orchestrator;
pub mod postprocess;
pub mod proactive;
pub mod prompt;
pub mod provider;
pub mod router;
pub mod stream;
pub mod thinking;
pub mod tools;

pub use health::HealthTracker;
pub use orchestrator::{Orchestrator, OrchestratorConfig, TurnMetadata, TurnRequest, TurnResult};
pub use provider::{ChatRequest, ChatResponse, LlmProvider, Message, ProviderError, Role as ChatRole, ToolCall, ToolDefinition};
pub use router::{ProviderRouter, ProviderSlot};
pub use stream::StreamEvent;
pub use thinking::ThinkingLevel;
