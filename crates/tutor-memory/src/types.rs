use serde::{Deserialize, Serialize};

/// Message role for a persisted chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => Err(format!("unknown message role: {other}")),
        }
    }
}

/// A persisted chat message, append-only.
///
/// `is_blocked` messages are kept for audit but MUST NOT appear in the
/// conversation window used to build the next prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub session_id: String,
    pub user_id: String,
    pub role: MessageRole,
    pub content: String,
    pub is_blocked: bool,
    pub block_reason: Option<String>,
    /// `{agent_hint: IntentType}` on assistant messages, consumed by the
    /// intent classifier's follow-up-detection step.
    pub metadata: Option<serde_json::Value>,
    pub model_used: Option<String>,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub created_at: String,
}

/// Kind of memory fact.
///
/// `Identity` is the only singleton type — at most one row
/// per `(user_id, fact_type)`. All others are list-valued and bounded by the
/// per-user cap with LRU eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactType {
    Identity,
    LearningStyle,
    TopicPreference,
    Goal,
    /// Free-form facts taken via the user-facing `remember`/`forget` tools;
    /// a catch-all for facts that don't fit the other named categories.
    General,
}

impl FactType {
    pub fn is_singleton(&self) -> bool {
        matches!(self, FactType::Identity)
    }
}

impl std::fmt::Display for FactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Identity => write!(f, "identity"),
            Self::LearningStyle => write!(f, "learning_style"),
            Self::TopicPreference => write!(f, "topic_preference"),
            Self::Goal => write!(f, "goal"),
            Self::General => write!(f, "general"),
        }
    }
}

impl std::str::FromStr for FactType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "identity" => Ok(Self::Identity),
            "learning_style" => Ok(Self::LearningStyle),
            "topic_preference" => Ok(Self::TopicPreference),
            "goal" => Ok(Self::Goal),
            "general" => Ok(Self::General),
            other => Err(format!("unknown fact type: {other}")),
        }
    }
}

/// A single managed insight ("memory fact") about a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub id: i64,
    pub user_id: String,
    pub fact_type: FactType,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A fact an extractor proposes, before it is checked against existing rows.
#[derive(Debug, Clone)]
pub struct CandidateFact {
    pub fact_type: FactType,
    pub content: String,
}

/// A single explicit key/value attribute set via the `save_user_info` tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAttribute {
    pub user_id: String,
    pub key: String,
    pub value: String,
    pub updated_at: String,
}
