use std::sync::Mutex;

use rusqlite::{params, OptionalExtension};
use tracing::instrument;
use tutor_core::Level;

use crate::db::row_to_profile;
use crate::error::{Result, UserError};
use crate::types::LearningProfile;

/// Owns the learning-profile table: upsert-on-first-interaction, counter
/// updates, and the asynchronous field refresh the insight extractor
/// performs after each turn.
pub struct UserManager {
    db: Mutex<rusqlite::Connection>,
}

impl UserManager {
    pub fn new(conn: rusqlite::Connection) -> Result<Self> {
        crate::db::init_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    /// Returns the profile for `user_id`, creating a default one (Cadet
    /// level, empty topic lists) if this is the user's first interaction.
    #[instrument(skip(self))]
    pub fn get_or_create(&self, user_id: &str) -> Result<LearningProfile> {
        let conn = self.db.lock().expect("users db lock poisoned");
        if let Some(profile) = fetch(&conn, user_id)? {
            return Ok(profile);
        }
        let now = chrono::Utc::now().to_rfc3339();
        let profile = LearningProfile::new(user_id, now);
        insert(&conn, &profile)?;
        Ok(profile)
    }

    #[instrument(skip(self))]
    pub fn get(&self, user_id: &str) -> Result<LearningProfile> {
        let conn = self.db.lock().expect("users db lock poisoned");
        fetch(&conn, user_id)?.ok_or_else(|| UserError::NotFound(user_id.to_string()))
    }

    /// Increments the turn/session counters. Called once per session start
    /// and once per user message, respectively.
    #[instrument(skip(self))]
    pub fn record_session_started(&self, user_id: &str) -> Result<()> {
        self.get_or_create(user_id)?;
        let conn = self.db.lock().expect("users db lock poisoned");
        conn.execute(
            "UPDATE learning_profiles SET total_sessions = total_sessions + 1, updated_at = ?2 WHERE user_id = ?1",
            params![user_id, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn record_message(&self, user_id: &str) -> Result<()> {
        self.get_or_create(user_id)?;
        let conn = self.db.lock().expect("users db lock poisoned");
        conn.execute(
            "UPDATE learning_profiles SET total_messages = total_messages + 1, updated_at = ?2 WHERE user_id = ?1",
            params![user_id, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Applied by the insight extractor: set the level, add a weak/strong
    /// topic (deduplicated), or set the learning style. Each call touches
    /// only the field it's given — callers compose several calls rather
    /// than resending the whole profile, so a partial insight never clobbers
    /// fields an earlier insight already set.
    #[instrument(skip(self))]
    pub fn set_level(&self, user_id: &str, level: Level) -> Result<()> {
        self.get_or_create(user_id)?;
        let conn = self.db.lock().expect("users db lock poisoned");
        conn.execute(
            "UPDATE learning_profiles SET level = ?2, updated_at = ?3 WHERE user_id = ?1",
            params![user_id, level.to_string(), chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn set_learning_style(&self, user_id: &str, style: &str) -> Result<()> {
        self.get_or_create(user_id)?;
        let conn = self.db.lock().expect("users db lock poisoned");
        conn.execute(
            "UPDATE learning_profiles SET learning_style = ?2, updated_at = ?3 WHERE user_id = ?1",
            params![user_id, style, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn add_weak_topic(&self, user_id: &str, topic: &str) -> Result<()> {
        self.add_topic(user_id, topic, true)
    }

    #[instrument(skip(self))]
    pub fn add_strong_topic(&self, user_id: &str, topic: &str) -> Result<()> {
        self.add_topic(user_id, topic, false)
    }

    fn add_topic(&self, user_id: &str, topic: &str, weak: bool) -> Result<()> {
        let profile = self.get_or_create(user_id)?;
        let mut topics = if weak { profile.weak_topics } else { profile.strong_topics };
        if !topics.iter().any(|t| t.eq_ignore_ascii_case(topic)) {
            topics.push(topic.to_string());
        }
        let column = if weak { "weak_topics" } else { "strong_topics" };
        let conn = self.db.lock().expect("users db lock poisoned");
        conn.execute(
            &format!("UPDATE learning_profiles SET {column} = ?2, updated_at = ?3 WHERE user_id = ?1"),
            params![user_id, serde_json::to_string(&topics)?, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

fn fetch(conn: &rusqlite::Connection, user_id: &str) -> Result<Option<LearningProfile>> {
    conn.query_row(
        "SELECT user_id, level, learning_style, weak_topics, strong_topics,
                total_sessions, total_messages, attributes, created_at, updated_at
         FROM learning_profiles WHERE user_id = ?1",
        params![user_id],
        row_to_profile,
    )
    .optional()
    .map_err(UserError::DatabaseError)
}

fn insert(conn: &rusqlite::Connection, profile: &LearningProfile) -> Result<()> {
    conn.execute(
        "INSERT INTO learning_profiles
            (user_id, level, learning_style, weak_topics, strong_topics,
             total_sessions, total_messages, attributes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            profile.user_id,
            profile.level.to_string(),
            profile.learning_style,
            serde_json::to_string(&profile.weak_topics)?,
            serde_json::to_string(&profile.strong_topics)?,
            profile.total_sessions,
            profile.total_messages,
            serde_json::to_string(&profile.attributes)?,
            profile.created_at,
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> UserManager {
        UserManager::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn first_interaction_creates_a_default_profile() {
        let mgr = manager();
        let profile = mgr.get_or_create("user-1").unwrap();
        assert_eq!(profile.level, Level::Cadet);
        assert!(profile.weak_topics.is_empty());
    }

    #[test]
    fn counters_increment_independently() {
        let mgr = manager();
        mgr.record_session_started("user-1").unwrap();
        mgr.record_message("user-1").unwrap();
        mgr.record_message("user-1").unwrap();
        let profile = mgr.get("user-1").unwrap();
        assert_eq!(profile.total_sessions, 1);
        assert_eq!(profile.total_messages, 2);
    }

    #[test]
    fn weak_topics_are_deduplicated_case_insensitively() {
        let mgr = manager();
        mgr.add_weak_topic("user-1", "COLREGs Rule 5").unwrap();
        mgr.add_weak_topic("user-1", "colregs rule 5").unwrap();
        let profile = mgr.get("user-1").unwrap();
        assert_eq!(profile.weak_topics.len(), 1);
    }

    #[test]
    fn get_on_unknown_user_errors() {
        let mgr = manager();
        assert!(mgr.get("ghost").is_err());
    }
}
