use serde::{Deserialize, Serialize};
use tutor_core::Level;

/// Known, commonly-read profile settings. Anything outside this set still
/// round-trips through `extra`, so an external LMS can stash arbitrary
/// key/value pairs without a schema migration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileAttributes {
    pub preferred_explanation_length: Option<ExplanationLength>,
    pub notification_opt_in: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationLength {
    Brief,
    Standard,
    Detailed,
}

/// A learner's accumulated profile: identity, level, learning preferences,
/// topic strengths/weaknesses, and running counters. Upserted on first
/// interaction and refreshed asynchronously by the insight extractor after
/// each turn — never blocks the turn that updates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningProfile {
    pub user_id: String,
    pub level: Level,
    pub learning_style: Option<String>,
    pub weak_topics: Vec<String>,
    pub strong_topics: Vec<String>,
    pub total_sessions: u64,
    pub total_messages: u64,
    pub attributes: ProfileAttributes,
    pub created_at: String,
    pub updated_at: String,
}

impl LearningProfile {
    pub fn new(user_id: impl Into<String>, now: String) -> Self {
        Self {
            user_id: user_id.into(),
            level: Level::default(),
            learning_style: None,
            weak_topics: Vec::new(),
            strong_topics: Vec::new(),
            total_sessions: 0,
            total_messages: 0,
            attributes: ProfileAttributes::default(),
            created_at: now.clone(),
            updated_at: now,
        }
    }
}
