//! The memory tool family: `save_user_info`, `get_user_info`, `remember`,
//! `forget`, `list_memories`, `clear_all_memories`. Each is a thin adapter
//! over `tutor_memory::MemoryManager`, scoped to one user for the lifetime
//! of a turn.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use tutor_memory::{CandidateFact, FactType, MemoryManager};

use super::{Tool, ToolResult};

fn fact_type_from_str(s: &str) -> FactType {
    s.parse().unwrap_or(FactType::General)
}

#[derive(Deserialize)]
struct SaveUserInfoInput {
    key: String,
    value: String,
}

pub struct SaveUserInfoTool {
    memory: Arc<MemoryManager>,
    user_id: String,
}

impl SaveUserInfoTool {
    pub fn new(memory: Arc<MemoryManager>, user_id: String) -> Self {
        Self { memory, user_id }
    }
}

#[async_trait]
impl Tool for SaveUserInfoTool {
    fn name(&self) -> &str {
        "save_user_info"
    }

    fn description(&self) -> &str {
        "Save a labeled fact about the learner (e.g. key=\"preferred_name\", value=\"Cadet Reyes\")."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "key": {"type": "string"},
                "value": {"type": "string"}
            },
            "required": ["key", "value"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let parsed: SaveUserInfoInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        match self.memory.set_attribute(&self.user_id, &parsed.key, &parsed.value) {
            Ok(()) => ToolResult::success(format!("saved {}={}", parsed.key, parsed.value)),
            Err(e) => ToolResult::error(format!("failed to save: {e}")),
        }
    }
}

#[derive(Deserialize, Default)]
struct GetUserInfoInput {
    key: Option<String>,
}

pub struct GetUserInfoTool {
    memory: Arc<MemoryManager>,
    user_id: String,
}

impl GetUserInfoTool {
    pub fn new(memory: Arc<MemoryManager>, user_id: String) -> Self {
        Self { memory, user_id }
    }
}

#[async_trait]
impl Tool for GetUserInfoTool {
    fn name(&self) -> &str {
        "get_user_info"
    }

    fn description(&self) -> &str {
        "Read a previously saved fact about the learner. Omit `key` to list all saved facts."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "key": {"type": "string", "description": "Fact key to look up; omit to list all"}
            }
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let parsed: GetUserInfoInput = if input.is_null() {
            GetUserInfoInput::default()
        } else {
            match serde_json::from_value(input) {
                Ok(v) => v,
                Err(e) => return ToolResult::error(format!("invalid input: {e}")),
            }
        };
        match self.memory.get_attributes(&self.user_id, parsed.key.as_deref()) {
            Ok(attrs) if attrs.is_empty() => ToolResult::success("no saved information found".to_string()),
            Ok(attrs) => {
                let rendered = attrs
                    .iter()
                    .map(|a| format!("{}={}", a.key, a.value))
                    .collect::<Vec<_>>()
                    .join(", ");
                ToolResult::success(rendered)
            }
            Err(e) => ToolResult::error(format!("failed to read: {e}")),
        }
    }
}

#[derive(Deserialize)]
struct RememberInput {
    fact: String,
    #[serde(default)]
    fact_type: Option<String>,
}

pub struct RememberTool {
    memory: Arc<MemoryManager>,
    user_id: String,
    memory_cap: usize,
}

impl RememberTool {
    pub fn new(memory: Arc<MemoryManager>, user_id: String, memory_cap: usize) -> Self {
        Self { memory, user_id, memory_cap }
    }
}

#[async_trait]
impl Tool for RememberTool {
    fn name(&self) -> &str {
        "remember"
    }

    fn description(&self) -> &str {
        "Remember a fact the learner explicitly asked to be remembered (goal, preference, or note)."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "fact": {"type": "string"},
                "fact_type": {
                    "type": "string",
                    "enum": ["identity", "learning_style", "topic_preference", "goal", "general"]
                }
            },
            "required": ["fact"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let parsed: RememberInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        let fact_type = parsed.fact_type.as_deref().map(fact_type_from_str).unwrap_or(FactType::General);
        let candidate = CandidateFact { fact_type, content: parsed.fact };
        match self.memory.write_fact(&self.user_id, candidate, self.memory_cap) {
            Ok(()) => ToolResult::success("remembered".to_string()),
            Err(e) => ToolResult::error(format!("failed to remember: {e}")),
        }
    }
}

#[derive(Deserialize)]
struct ForgetInput {
    fact: Option<String>,
    #[serde(default)]
    fact_type: Option<String>,
}

pub struct ForgetTool {
    memory: Arc<MemoryManager>,
    user_id: String,
}

impl ForgetTool {
    pub fn new(memory: Arc<MemoryManager>, user_id: String) -> Self {
        Self { memory, user_id }
    }
}

#[async_trait]
impl Tool for ForgetTool {
    fn name(&self) -> &str {
        "forget"
    }

    fn description(&self) -> &str {
        "Forget a previously remembered fact. Provide the fact's exact text, or a fact_type to \
         clear an entire category."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "fact": {"type": "string"},
                "fact_type": {
                    "type": "string",
                    "enum": ["identity", "learning_style", "topic_preference", "goal", "general"]
                }
            }
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let parsed: ForgetInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        let fact_type = parsed.fact_type.as_deref().map(fact_type_from_str).unwrap_or(FactType::General);
        match self.memory.forget_fact(&self.user_id, fact_type, parsed.fact.as_deref()) {
            Ok(()) => ToolResult::success("forgotten".to_string()),
            Err(e) => ToolResult::error(format!("failed to forget: {e}")),
        }
    }
}

pub struct ListMemoriesTool {
    memory: Arc<MemoryManager>,
    user_id: String,
}

impl ListMemoriesTool {
    pub fn new(memory: Arc<MemoryManager>, user_id: String) -> Self {
        Self { memory, user_id }
    }
}

#[async_trait]
impl Tool for ListMemoriesTool {
    fn name(&self) -> &str {
        "list_memories"
    }

    fn description(&self) -> &str {
        "List every fact currently remembered about the learner."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _input: serde_json::Value) -> ToolResult {
        match self.memory.get_facts(&self.user_id) {
            Ok(facts) if facts.is_empty() => ToolResult::success("no memories stored".to_string()),
            Ok(facts) => {
                let rendered = facts
                    .iter()
                    .map(|f| format!("[{}] {}", f.fact_type, f.content))
                    .collect::<Vec<_>>()
                    .join("\n");
                ToolResult::success(rendered)
            }
            Err(e) => ToolResult::error(format!("failed to list memories: {e}")),
        }
    }
}

pub struct ClearAllMemoriesTool {
    memory: Arc<MemoryManager>,
    user_id: String,
}

impl ClearAllMemoriesTool {
    pub fn new(memory: Arc<MemoryManager>, user_id: String) -> Self {
        Self { memory, user_id }
    }
}

#[async_trait]
impl Tool for ClearAllMemoriesTool {
    fn name(&self) -> &str {
        "clear_all_memories"
    }

    fn description(&self) -> &str {
        "Erase every remembered fact about the learner. Irreversible — only call when the \
         learner explicitly asks to start fresh."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _input: serde_json::Value) -> ToolResult {
        match self.memory.clear_all_facts(&self.user_id) {
            Ok(()) => ToolResult::success("all memories cleared".to_string()),
            Err(e) => ToolResult::error(format!("failed to clear memories: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> Arc<MemoryManager> {
        Arc::new(MemoryManager::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap())
    }

    #[tokio::test]
    async fn remember_then_list_round_trips() {
        let memory = manager();
        let remember = RememberTool::new(memory.clone(), "u1".to_string(), 50);
        remember.execute(serde_json::json!({"fact": "wants extra COLREGs drills"})).await;

        let list = ListMemoriesTool::new(memory, "u1".to_string());
        let result = list.execute(serde_json::json!({})).await;
        assert!(result.content.contains("extra COLREGs drills"));
    }

    #[tokio::test]
    async fn save_then_get_user_info_round_trips() {
        let memory = manager();
        let save = SaveUserInfoTool::new(memory.clone(), "u1".to_string());
        save.execute(serde_json::json!({"key": "rank", "value": "cadet"})).await;

        let get = GetUserInfoTool::new(memory, "u1".to_string());
        let result = get.execute(serde_json::json!({"key": "rank"})).await;
        assert!(result.content.contains("rank=cadet"));
    }

    #[tokio::test]
    async fn clear_all_memories_empties_the_list() {
        let memory = manager();
        let remember = RememberTool::new(memory.clone(), "u1".to_string(), 50);
        remember.execute(serde_json::json!({"fact": "likes diagrams"})).await;

        let clear = ClearAllMemoriesTool::new(memory.clone(), "u1".to_string());
        clear.execute(serde_json::json!({})).await;

        let list = ListMemoriesTool::new(memory, "u1".to_string());
        let result = list.execute(serde_json::json!({})).await;
        assert_eq!(result.content, "no memories stored");
    }
}
