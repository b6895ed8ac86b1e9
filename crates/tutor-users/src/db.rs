use rusqlite::{Connection, Result};

/// Initializes the learning-profile table. Safe to call on every
/// startup — `CREATE IF NOT EXISTS` keeps it idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS learning_profiles (
            user_id           TEXT PRIMARY KEY NOT NULL,
            level             TEXT NOT NULL DEFAULT 'cadet',
            learning_style    TEXT,
            weak_topics       TEXT NOT NULL DEFAULT '[]',
            strong_topics     TEXT NOT NULL DEFAULT '[]',
            total_sessions    INTEGER NOT NULL DEFAULT 0,
            total_messages    INTEGER NOT NULL DEFAULT 0,
            attributes        TEXT NOT NULL DEFAULT '{}',
            created_at        TEXT NOT NULL,
            updated_at        TEXT NOT NULL
        );",
    )
}

pub(crate) fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<crate::types::LearningProfile> {
    let level_str: String = row.get(1)?;
    let weak_topics: Vec<String> = serde_json::from_str(&row.get::<_, String>(3)?).unwrap_or_default();
    let strong_topics: Vec<String> = serde_json::from_str(&row.get::<_, String>(4)?).unwrap_or_default();
    let attributes = serde_json::from_str(&row.get::<_, String>(7)?).unwrap_or_default();
    Ok(crate::types::LearningProfile {
        user_id: row.get(0)?,
        level: level_str.parse().unwrap_or_default(),
        learning_style: row.get(2)?,
        weak_topics,
        strong_topics,
        total_sessions: row.get::<_, i64>(5)? as u64,
        total_messages: row.get::<_, i64>(6)? as u64,
        attributes,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}
