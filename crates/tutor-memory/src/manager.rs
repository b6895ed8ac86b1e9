use std::collections::HashMap;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::instrument;

use crate::error::Result;
use crate::types::{CandidateFact, ChatMessage, Fact, FactType, MessageRole, UserAttribute};

/// Cap on the rendered known-facts summary injected into the system prompt.
/// Facts beyond this are still stored, just not rendered.
const MAX_SUMMARY_CHARS: usize = 6000;
const SUMMARY_CACHE_TTL_SECS: i64 = 300;
const MAX_SUMMARY_CACHE_ENTRIES: usize = 256;

struct CachedSummary {
    rendered: String,
    built_at: chrono::DateTime<chrono::Utc>,
}

/// Persists chat history and the per-user managed insight list, and answers
/// the `retrieve`/`save_user_info`/`get_user_info`/`remember`/`forget` tool
/// calls the reasoning agent makes.
pub struct MemoryManager {
    db: Mutex<Connection>,
    summary_cache: Mutex<HashMap<String, CachedSummary>>,
}

impl MemoryManager {
    pub fn new(conn: Connection) -> Result<Self> {
        crate::db::init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            summary_cache: Mutex::new(HashMap::new()),
        })
    }

    fn normalize(content: &str) -> String {
        content.trim().to_lowercase()
    }

    /// Check-before-write insight algorithm:
    /// - singleton type, same normalized content as the existing row: ignore.
    /// - singleton type, different content: upsert (replace) the one row.
    /// - list-valued type, content duplicates an existing entry: ignore.
    /// - otherwise: insert a new row.
    ///
    /// After the write, oldest rows beyond `cap` are evicted (step 3).
    #[instrument(skip(self, candidate))]
    pub fn write_fact(&self, user_id: &str, candidate: CandidateFact, cap: usize) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        let normalized = Self::normalize(&candidate.content);
        let fact_type = candidate.fact_type.to_string();

        if candidate.fact_type.is_singleton() {
            let existing: Option<(i64, String)> = db
                .query_row(
                    "SELECT id, content FROM facts WHERE user_id = ?1 AND fact_type = ?2",
                    params![user_id, fact_type],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match existing {
                Some((_, existing_content)) if Self::normalize(&existing_content) == normalized => {
                    return Ok(());
                }
                Some((id, _)) => {
                    db.execute(
                        "UPDATE facts SET content = ?1, updated_at = ?2 WHERE id = ?3",
                        params![candidate.content, now, id],
                    )?;
                }
                None => {
                    db.execute(
                        "INSERT INTO facts (user_id, fact_type, content, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?4)",
                        params![user_id, fact_type, candidate.content, now],
                    )?;
                }
            }
        } else {
            let duplicate: Option<i64> = db
                .query_row(
                    "SELECT id FROM facts
                     WHERE user_id = ?1 AND fact_type = ?2 AND lower(trim(content)) = ?3",
                    params![user_id, fact_type, normalized],
                    |row| row.get(0),
                )
                .optional()?;
            if duplicate.is_some() {
                return Ok(());
            }
            db.execute(
                "INSERT OR IGNORE INTO facts (user_id, fact_type, content, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![user_id, fact_type, candidate.content, now],
            )?;
        }

        db.execute(
            "DELETE FROM facts WHERE user_id = ?1 AND id NOT IN (
                SELECT id FROM facts WHERE user_id = ?1 ORDER BY updated_at DESC LIMIT ?2
             )",
            params![user_id, cap as i64],
        )?;
        drop(db);
        self.summary_cache.lock().unwrap().remove(user_id);
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn get_facts(&self, user_id: &str) -> Result<Vec<Fact>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, user_id, fact_type, content, created_at, updated_at
             FROM facts WHERE user_id = ?1 ORDER BY updated_at DESC",
        )?;
        let rows = stmt
            .query_map(params![user_id], Self::row_to_fact)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Backs the `forget(fact)` tool. With `content` given, removes only the
    /// matching row(s); otherwise clears every fact of that type.
    #[instrument(skip(self))]
    pub fn forget_fact(&self, user_id: &str, fact_type: FactType, content: Option<&str>) -> Result<()> {
        let db = self.db.lock().unwrap();
        let fact_type = fact_type.to_string();
        match content {
            Some(c) => {
                db.execute(
                    "DELETE FROM facts WHERE user_id = ?1 AND fact_type = ?2 AND lower(trim(content)) = ?3",
                    params![user_id, fact_type, Self::normalize(c)],
                )?;
            }
            None => {
                db.execute(
                    "DELETE FROM facts WHERE user_id = ?1 AND fact_type = ?2",
                    params![user_id, fact_type],
                )?;
            }
        }
        drop(db);
        self.summary_cache.lock().unwrap().remove(user_id);
        Ok(())
    }

    /// Backs the `clear_all_memories()` tool: wipes the entire managed
    /// insight list for a user. Explicit attributes and chat history are
    /// untouched — those are separate stores with their own lifecycle.
    #[instrument(skip(self))]
    pub fn clear_all_facts(&self, user_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute("DELETE FROM facts WHERE user_id = ?1", params![user_id])?;
        drop(db);
        self.summary_cache.lock().unwrap().remove(user_id);
        Ok(())
    }

    /// Backs `save_user_info(key, value)`.
    #[instrument(skip(self, value))]
    pub fn set_attribute(&self, user_id: &str, key: &str, value: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO user_attributes (user_id, key, value, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![user_id, key, value, now],
        )?;
        Ok(())
    }

    /// Backs `get_user_info(key?)`. `None` returns every stored attribute.
    #[instrument(skip(self))]
    pub fn get_attributes(&self, user_id: &str, key: Option<&str>) -> Result<Vec<UserAttribute>> {
        let db = self.db.lock().unwrap();
        match key {
            Some(k) => {
                let row = db
                    .query_row(
                        "SELECT user_id, key, value, updated_at FROM user_attributes
                         WHERE user_id = ?1 AND key = ?2",
                        params![user_id, k],
                        Self::row_to_attribute,
                    )
                    .optional()?;
                Ok(row.into_iter().collect())
            }
            None => {
                let mut stmt = db.prepare(
                    "SELECT user_id, key, value, updated_at FROM user_attributes WHERE user_id = ?1",
                )?;
                let rows = stmt
                    .query_map(params![user_id], Self::row_to_attribute)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            }
        }
    }

    #[instrument(skip(self, msg), fields(session_id = %msg.session_id))]
    pub fn save_message(&self, msg: &ChatMessage) -> Result<i64> {
        let db = self.db.lock().unwrap();
        let metadata = msg
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        db.execute(
            "INSERT INTO chat_messages
             (session_id, user_id, role, content, is_blocked, block_reason, metadata,
              model_used, tokens_in, tokens_out, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                msg.session_id,
                msg.user_id,
                msg.role.to_string(),
                msg.content,
                msg.is_blocked as i64,
                msg.block_reason,
                metadata,
                msg.model_used,
                msg.tokens_in,
                msg.tokens_out,
                msg.created_at,
            ],
        )?;
        Ok(db.last_insert_rowid())
    }

    /// Loads the most recent messages for a session, optionally excluding
    /// blocked ones, oldest-first so they drop straight into a prompt.
    #[instrument(skip(self))]
    pub fn load_recent_messages(
        &self,
        session_id: &str,
        limit: usize,
        exclude_blocked: bool,
    ) -> Result<Vec<ChatMessage>> {
        let db = self.db.lock().unwrap();
        let sql = if exclude_blocked {
            "SELECT id, session_id, user_id, role, content, is_blocked, block_reason, metadata,
                    model_used, tokens_in, tokens_out, created_at
             FROM chat_messages
             WHERE session_id = ?1 AND is_blocked = 0
             ORDER BY created_at DESC, id DESC LIMIT ?2"
        } else {
            "SELECT id, session_id, user_id, role, content, is_blocked, block_reason, metadata,
                    model_used, tokens_in, tokens_out, created_at
             FROM chat_messages
             WHERE session_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT ?2"
        };
        let mut stmt = db.prepare(sql)?;
        let mut rows = stmt
            .query_map(params![session_id, limit as i64], Self::row_to_message)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.reverse();
        Ok(rows)
    }

    /// Pages through a user's history across all sessions, newest first,
    /// excluding blocked messages by default — backs `GET /api/v1/history/
    /// {user_id}`. Unlike `load_recent_messages` (session-scoped, oldest
    /// first for prompt-building), this is user-scoped and keeps the
    /// caller's requested order for display.
    #[instrument(skip(self))]
    pub fn list_messages_for_user(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
        exclude_blocked: bool,
    ) -> Result<Vec<ChatMessage>> {
        let db = self.db.lock().unwrap();
        let sql = if exclude_blocked {
            "SELECT id, session_id, user_id, role, content, is_blocked, block_reason, metadata,
                    model_used, tokens_in, tokens_out, created_at
             FROM chat_messages
             WHERE user_id = ?1 AND is_blocked = 0
             ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3"
        } else {
            "SELECT id, session_id, user_id, role, content, is_blocked, block_reason, metadata,
                    model_used, tokens_in, tokens_out, created_at
             FROM chat_messages
             WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3"
        };
        let mut stmt = db.prepare(sql)?;
        let rows = stmt
            .query_map(params![user_id, limit as i64, offset as i64], Self::row_to_message)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    #[instrument(skip(self))]
    pub fn delete_history_for_user(&self, user_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute("DELETE FROM chat_messages WHERE user_id = ?1", params![user_id])?;
        Ok(())
    }

    /// Renders the known-facts summary injected into the system prompt,
    /// cached per user for a few minutes so a rapid back-and-forth doesn't
    /// re-query and re-render on every turn.
    #[instrument(skip(self))]
    pub fn render_facts_summary(&self, user_id: &str) -> Result<String> {
        {
            let cache = self.summary_cache.lock().unwrap();
            if let Some(entry) = cache.get(user_id) {
                let age = chrono::Utc::now().signed_duration_since(entry.built_at);
                if age.num_seconds() < SUMMARY_CACHE_TTL_SECS {
                    return Ok(entry.rendered.clone());
                }
            }
        }

        let facts = self.get_facts(user_id)?;
        let mut rendered = String::new();
        for fact in &facts {
            let line = format!("- [{}] {}\n", fact.fact_type, fact.content);
            if rendered.len() + line.len() > MAX_SUMMARY_CHARS {
                break;
            }
            rendered.push_str(&line);
        }

        let mut cache = self.summary_cache.lock().unwrap();
        if cache.len() >= MAX_SUMMARY_CACHE_ENTRIES {
            if let Some(oldest_key) = cache
                .iter()
                .min_by_key(|(_, v)| v.built_at)
                .map(|(k, _)| k.clone())
            {
                cache.remove(&oldest_key);
            }
        }
        cache.insert(
            user_id.to_string(),
            CachedSummary {
                rendered: rendered.clone(),
                built_at: chrono::Utc::now(),
            },
        );
        Ok(rendered)
    }

    fn row_to_fact(row: &rusqlite::Row) -> rusqlite::Result<Fact> {
        let fact_type: String = row.get(2)?;
        Ok(Fact {
            id: row.get(0)?,
            user_id: row.get(1)?,
            fact_type: fact_type.parse().unwrap_or(FactType::General),
            content: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn row_to_attribute(row: &rusqlite::Row) -> rusqlite::Result<UserAttribute> {
        Ok(UserAttribute {
            user_id: row.get(0)?,
            key: row.get(1)?,
            value: row.get(2)?,
            updated_at: row.get(3)?,
        })
    }

    fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<ChatMessage> {
        let role: String = row.get(3)?;
        let metadata: Option<String> = row.get(7)?;
        Ok(ChatMessage {
            id: row.get(0)?,
            session_id: row.get(1)?,
            user_id: row.get(2)?,
            role: role.parse().unwrap_or(MessageRole::User),
            content: row.get(4)?,
            is_blocked: row.get::<_, i64>(5)? != 0,
            block_reason: row.get(6)?,
            metadata: metadata
                .map(|m| serde_json::from_str(&m))
                .transpose()
                .map_err(|_| rusqlite::Error::InvalidColumnType(7, "metadata".into(), rusqlite::types::Type::Text))?,
            model_used: row.get(8)?,
            tokens_in: row.get(9)?,
            tokens_out: row.get(10)?,
            created_at: row.get(11)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> MemoryManager {
        let conn = Connection::open_in_memory().unwrap();
        MemoryManager::new(conn).unwrap()
    }

    fn candidate(fact_type: FactType, content: &str) -> CandidateFact {
        CandidateFact { fact_type, content: content.to_string() }
    }

    #[test]
    fn singleton_fact_is_replaced_not_duplicated() {
        let mgr = manager();
        mgr.write_fact("u1", candidate(FactType::Identity, "Prefers she/her"), 50).unwrap();
        mgr.write_fact("u1", candidate(FactType::Identity, "Prefers they/them"), 50).unwrap();
        let facts = mgr.get_facts("u1").unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].content, "Prefers they/them");
    }

    #[test]
    fn singleton_fact_with_same_content_is_ignored() {
        let mgr = manager();
        mgr.write_fact("u1", candidate(FactType::Identity, "Name is Alex"), 50).unwrap();
        mgr.write_fact("u1", candidate(FactType::Identity, "name is alex "), 50).unwrap();
        let facts = mgr.get_facts("u1").unwrap();
        assert_eq!(facts.len(), 1);
    }

    #[test]
    fn list_valued_duplicates_are_ignored() {
        let mgr = manager();
        mgr.write_fact("u1", candidate(FactType::Goal, "Pass the deck officer exam"), 50).unwrap();
        mgr.write_fact("u1", candidate(FactType::Goal, "pass the deck officer exam"), 50).unwrap();
        mgr.write_fact("u1", candidate(FactType::Goal, "Learn COLREGs"), 50).unwrap();
        let facts = mgr.get_facts("u1").unwrap();
        assert_eq!(facts.len(), 2);
    }

    #[test]
    fn cap_evicts_oldest_facts() {
        let mgr = manager();
        for i in 0..5 {
            mgr.write_fact("u1", candidate(FactType::General, &format!("fact {i}")), 3).unwrap();
        }
        let facts = mgr.get_facts("u1").unwrap();
        assert_eq!(facts.len(), 3);
        assert!(facts.iter().all(|f| f.content != "fact 0" && f.content != "fact 1"));
    }

    #[test]
    fn forget_removes_matching_content_only() {
        let mgr = manager();
        mgr.write_fact("u1", candidate(FactType::General, "likes tea"), 50).unwrap();
        mgr.write_fact("u1", candidate(FactType::General, "likes coffee"), 50).unwrap();
        mgr.forget_fact("u1", FactType::General, Some("likes tea")).unwrap();
        let facts = mgr.get_facts("u1").unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].content, "likes coffee");
    }

    #[test]
    fn clear_all_facts_wipes_every_type() {
        let mgr = manager();
        mgr.write_fact("u1", candidate(FactType::Identity, "Name is Alex"), 50).unwrap();
        mgr.write_fact("u1", candidate(FactType::Goal, "Learn COLREGs"), 50).unwrap();
        mgr.clear_all_facts("u1").unwrap();
        assert!(mgr.get_facts("u1").unwrap().is_empty());
    }

    #[test]
    fn attribute_set_then_get_round_trips() {
        let mgr = manager();
        mgr.set_attribute("u1", "favorite_color", "blue").unwrap();
        mgr.set_attribute("u1", "favorite_color", "green").unwrap();
        let attrs = mgr.get_attributes("u1", Some("favorite_color")).unwrap();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].value, "green");
    }

    #[test]
    fn recent_messages_exclude_blocked_and_return_oldest_first() {
        let mgr = manager();
        let mk = |content: &str, blocked: bool, created_at: &str| ChatMessage {
            id: 0,
            session_id: "s1".into(),
            user_id: "u1".into(),
            role: MessageRole::User,
            content: content.into(),
            is_blocked: blocked,
            block_reason: None,
            metadata: None,
            model_used: None,
            tokens_in: 0,
            tokens_out: 0,
            created_at: created_at.into(),
        };
        mgr.save_message(&mk("first", false, "2026-01-01T00:00:00Z")).unwrap();
        mgr.save_message(&mk("blocked one", true, "2026-01-01T00:00:01Z")).unwrap();
        mgr.save_message(&mk("second", false, "2026-01-01T00:00:02Z")).unwrap();

        let messages = mgr.load_recent_messages("s1", 50, true).unwrap();
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[test]
    fn facts_summary_is_cached_until_invalidated() {
        let mgr = manager();
        mgr.write_fact("u1", candidate(FactType::Goal, "Learn COLREGs"), 50).unwrap();
        let first = mgr.render_facts_summary("u1").unwrap();
        assert!(first.contains("Learn COLREGs"));
        mgr.write_fact("u1", candidate(FactType::Goal, "Learn navigation"), 50).unwrap();
        let second = mgr.render_facts_summary("u1").unwrap();
        assert!(second.contains("Learn navigation"));
    }
}
