use rusqlite::{Connection, Result};

/// Initialise memory tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_facts_table(conn)?;
    create_messages_table(conn)?;
    create_attributes_table(conn)?;
    Ok(())
}

/// Explicit user-controlled key/value store backing the `save_user_info` /
/// `get_user_info` tools, kept separate from the managed insight list in
/// `facts` (which the background extractor owns).
fn create_attributes_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS user_attributes (
            user_id     TEXT NOT NULL,
            key         TEXT NOT NULL,
            value       TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            PRIMARY KEY (user_id, key)
        );",
    )
}

fn create_facts_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS facts (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     TEXT NOT NULL,
            fact_type   TEXT NOT NULL,
            content     TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            UNIQUE(user_id, fact_type, content)
        );
        CREATE INDEX IF NOT EXISTS idx_facts_user
            ON facts(user_id, updated_at DESC);",
    )
}

/// `chat_messages` plus an external-content FTS5 index kept in sync manually
/// on write/delete, the same pattern used for `user_memory_fts`.
fn create_messages_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chat_messages (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id   TEXT NOT NULL,
            user_id      TEXT NOT NULL,
            role         TEXT NOT NULL,
            content      TEXT NOT NULL,
            is_blocked   INTEGER NOT NULL DEFAULT 0,
            block_reason TEXT,
            metadata     TEXT,
            model_used   TEXT,
            tokens_in    INTEGER NOT NULL DEFAULT 0,
            tokens_out   INTEGER NOT NULL DEFAULT 0,
            created_at   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_session
            ON chat_messages(session_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_messages_user
            ON chat_messages(user_id, created_at DESC);",
    )
}
