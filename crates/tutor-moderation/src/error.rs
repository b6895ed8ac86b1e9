use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("moderation model call failed: {0}")]
    ModelUnavailable(String),

    #[error("moderation model response could not be parsed: {0}")]
    InvalidResponse(String),

    #[error("moderation check timed out after {ms}ms")]
    Timeout { ms: u64 },
}

pub type Result<T> = std::result::Result<T, ModerationError>;

impl From<ModerationError> for tutor_core::TutorError {
    fn from(err: ModerationError) -> Self {
        match err {
            ModerationError::ModelUnavailable(msg) => tutor_core::TutorError::UpstreamModel(msg),
            ModerationError::InvalidResponse(msg) => tutor_core::TutorError::UpstreamModel(msg),
            ModerationError::Timeout { ms } => tutor_core::TutorError::Timeout {
                operation: "moderation_check".to_string(),
                ms,
            },
        }
    }
}
