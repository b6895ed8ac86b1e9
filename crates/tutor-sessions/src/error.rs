use thiserror::Error;

/// Errors that can occur during session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The requested session does not exist in the database.
    #[error("session not found: {id}")]
    NotFound { id: String },

    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;

impl From<SessionError> for tutor_core::TutorError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound { id } => tutor_core::TutorError::NotFound(format!("session {id}")),
            SessionError::Database(e) => tutor_core::TutorError::PersistenceUnavailable(e.to_string()),
        }
    }
}
