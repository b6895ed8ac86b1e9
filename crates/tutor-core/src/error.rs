use thiserror::Error;

/// Taxonomy shared by every crate in the workspace. Components return one of
/// these (or a narrower crate-local enum that converts into it); the gateway
/// is the only place that maps a variant to an HTTP status (see
/// `tutor-gateway::http::error`).
#[derive(Debug, Error)]
pub enum TutorError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("upstream quota exceeded: {0}")]
    Quota(String),

    #[error("timed out after {ms}ms: {operation}")]
    Timeout { operation: String, ms: u64 },

    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    #[error("upstream model error: {0}")]
    UpstreamModel(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TutorError {
    /// Stable string code, part of the `{status:"error", error:{code, message}}`
    /// body every HTTP handler returns on failure.
    pub fn code(&self) -> &'static str {
        match self {
            TutorError::Validation(_) => "VALIDATION_ERROR",
            TutorError::Auth(_) => "AUTH_ERROR",
            TutorError::Forbidden(_) => "FORBIDDEN",
            TutorError::NotFound(_) => "NOT_FOUND",
            TutorError::Quota(_) => "QUOTA_ERROR",
            TutorError::Timeout { .. } => "TIMEOUT",
            TutorError::PersistenceUnavailable(_) => "PERSISTENCE_UNAVAILABLE",
            TutorError::UpstreamModel(_) => "UPSTREAM_MODEL_ERROR",
            TutorError::Config(_) => "CONFIG_ERROR",
            TutorError::Serialization(_) => "SERIALIZATION_ERROR",
            TutorError::Io(_) => "IO_ERROR",
            TutorError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status code for this error kind.
    pub fn http_status(&self) -> u16 {
        match self {
            TutorError::Validation(_) => 400,
            TutorError::Auth(_) => 401,
            TutorError::Forbidden(_) => 403,
            TutorError::NotFound(_) => 404,
            TutorError::Quota(_) => 429,
            TutorError::Timeout { .. } => 408,
            TutorError::PersistenceUnavailable(_) => 503,
            TutorError::UpstreamModel(_) => 502,
            TutorError::Config(_) | TutorError::Serialization(_) | TutorError::Io(_) | TutorError::Internal(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, TutorError>;
