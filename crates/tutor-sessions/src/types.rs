use serde::{Deserialize, Serialize};

/// A persisted chat session.
///
/// Created lazily on the first message of a `session_id`; tracks aggregate
/// stats so the gateway can report usage without scanning the full message
/// log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// UUIDv7 primary key — time-sortable.
    pub id: String,
    pub user_id: String,
    /// Optional user-provided title, e.g. "COLREGs review".
    pub display_name: Option<String>,
    pub message_count: u32,
    pub total_tokens: u64,
    pub last_model: Option<String>,
    /// RFC3339 creation timestamp.
    pub created_at: String,
    /// RFC3339 timestamp of the last update.
    pub updated_at: String,
}
