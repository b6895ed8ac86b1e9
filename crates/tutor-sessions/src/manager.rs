use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{Result, SessionError};
use crate::types::Session;

/// Thread-safe manager for persisted chat sessions.
///
/// Wraps a single SQLite connection in a `Mutex`, the same pattern used by
/// every other manager in this workspace (`tutor-memory::MemoryManager`,
/// `tutor-users::UserManager`).
pub struct SessionManager {
    db: Mutex<Connection>,
}

impl SessionManager {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    /// Return an existing session or create a new one.
    ///
    /// `session_id` is caller-supplied (from the chat request body); a fresh
    /// UUIDv7 is generated when absent. A session is created lazily on the
    /// first message of a session id — creating one is cheap, no LLM call
    /// is involved.
    #[instrument(skip(self), fields(user_id, session_id))]
    pub fn get_or_create(&self, user_id: &str, session_id: Option<&str>) -> Result<Session> {
        if let Some(id) = session_id {
            if let Some(session) = self.get(id)? {
                debug!("session cache hit");
                return Ok(session);
            }
        }

        let id = session_id
            .map(String::from)
            .unwrap_or_else(|| Uuid::now_v7().to_string());
        let now = chrono::Utc::now().to_rfc3339();

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR IGNORE INTO chat_sessions (id, user_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
            rusqlite::params![id, user_id, now],
        )?;

        let session = db.query_row(
            "SELECT id, user_id, display_name, message_count, total_tokens,
                    last_model, created_at, updated_at
             FROM chat_sessions WHERE id = ?1",
            rusqlite::params![id],
            row_to_session,
        )?;

        Ok(session)
    }

    /// Retrieve a session by id, returning `None` if it does not exist.
    #[instrument(skip(self), fields(id))]
    pub fn get(&self, id: &str) -> Result<Option<Session>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT id, user_id, display_name, message_count, total_tokens,
                    last_model, created_at, updated_at
             FROM chat_sessions WHERE id = ?1",
            rusqlite::params![id],
            row_to_session,
        ) {
            Ok(s) => Ok(Some(s)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(SessionError::Database(e)),
        }
    }

    /// List the most-recently-updated sessions for a user, newest first.
    #[instrument(skip(self), fields(user_id, limit))]
    pub fn list_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<Session>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, user_id, display_name, message_count, total_tokens,
                    last_model, created_at, updated_at
             FROM chat_sessions
             WHERE user_id = ?1
             ORDER BY updated_at DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![user_id, limit as i64], row_to_session)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Increment `message_count` by 1, add `tokens` to `total_tokens`, and
    /// record the model used. Also bumps `updated_at`.
    #[instrument(skip(self), fields(id, tokens, model))]
    pub fn update_stats(&self, id: &str, tokens: u64, model: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        let rows_changed = db.execute(
            "UPDATE chat_sessions
             SET message_count = message_count + 1,
                 total_tokens  = total_tokens  + ?1,
                 last_model    = ?2,
                 updated_at    = ?3
             WHERE id = ?4",
            rusqlite::params![tokens as i64, model, now, id],
        )?;
        if rows_changed == 0 {
            return Err(SessionError::NotFound { id: id.to_string() });
        }
        Ok(())
    }

    /// Permanently delete a session record. The associated messages in
    /// `tutor-memory` are owned separately and must be purged alongside this
    /// call (see `tutor-gateway::http::chat::delete_history`).
    #[instrument(skip(self), fields(id))]
    pub fn delete(&self, id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let rows_changed = db.execute("DELETE FROM chat_sessions WHERE id = ?1", rusqlite::params![id])?;
        if rows_changed == 0 {
            return Err(SessionError::NotFound { id: id.to_string() });
        }
        Ok(())
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        user_id: row.get(1)?,
        display_name: row.get(2)?,
        message_count: row.get::<_, i64>(3)? as u32,
        total_tokens: row.get::<_, i64>(4)? as u64,
        last_model: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        conn
    }

    #[test]
    fn get_or_create_is_idempotent_on_explicit_id() {
        let mgr = SessionManager::new(open_test_db());
        let first = mgr.get_or_create("u-1", Some("sess-1")).unwrap();
        let second = mgr.get_or_create("u-1", Some("sess-1")).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.id, "sess-1");
    }

    #[test]
    fn get_or_create_generates_id_when_absent() {
        let mgr = SessionManager::new(open_test_db());
        let session = mgr.get_or_create("u-1", None).unwrap();
        assert!(!session.id.is_empty());
    }

    #[test]
    fn update_stats_accumulates_tokens() {
        let mgr = SessionManager::new(open_test_db());
        let session = mgr.get_or_create("u-1", Some("sess-1")).unwrap();
        mgr.update_stats(&session.id, 100, "claude-sonnet-4-6").unwrap();
        mgr.update_stats(&session.id, 50, "claude-sonnet-4-6").unwrap();
        let reloaded = mgr.get(&session.id).unwrap().unwrap();
        assert_eq!(reloaded.message_count, 2);
        assert_eq!(reloaded.total_tokens, 150);
    }

    #[test]
    fn update_stats_on_missing_session_errors() {
        let mgr = SessionManager::new(open_test_db());
        let err = mgr.update_stats("nonexistent", 1, "model").unwrap_err();
        assert!(matches!(err, SessionError::NotFound { .. }));
    }

    #[test]
    fn list_for_user_orders_newest_first() {
        let mgr = SessionManager::new(open_test_db());
        mgr.get_or_create("u-1", Some("a")).unwrap();
        mgr.get_or_create("u-1", Some("b")).unwrap();
        let sessions = mgr.list_for_user("u-1", 10).unwrap();
        assert_eq!(sessions.len(), 2);
    }
}
