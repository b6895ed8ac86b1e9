use thiserror::Error;

#[derive(Debug, Error)]
pub enum UserError {
    #[error("learning profile not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

pub type Result<T> = std::result::Result<T, UserError>;

impl From<UserError> for tutor_core::TutorError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::NotFound(id) => tutor_core::TutorError::NotFound(format!("learning profile {id}")),
            UserError::DatabaseError(e) => tutor_core::TutorError::PersistenceUnavailable(e.to_string()),
            UserError::Serialization(e) => tutor_core::TutorError::Serialization(e),
            UserError::PermissionDenied(msg) => tutor_core::TutorError::Forbidden(msg),
        }
    }
}
