use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("fact not found: {user_id}/{fact_type}")]
    FactNotFound { user_id: String, fact_type: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MemoryError>;

impl From<MemoryError> for tutor_core::TutorError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::Database(e) => tutor_core::TutorError::PersistenceUnavailable(e.to_string()),
            MemoryError::FactNotFound { user_id, fact_type } => {
                tutor_core::TutorError::NotFound(format!("fact {fact_type} for user {user_id}"))
            }
            MemoryError::Serialization(e) => tutor_core::TutorError::Serialization(e),
        }
    }
}
