use thiserror::Error;

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("chunk not found: {0}")]
    ChunkNotFound(String),

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("invalid chunk: {0}")]
    InvalidChunk(String),

    #[error("pdf error: {0}")]
    Pdf(String),

    #[error("embedding provider error: {0}")]
    Embedding(String),

    #[error("vision provider error: {0}")]
    Vision(String),

    #[error("blob store error: {0}")]
    BlobStore(String),
}

pub type Result<T> = std::result::Result<T, KnowledgeError>;

impl From<KnowledgeError> for tutor_core::TutorError {
    fn from(err: KnowledgeError) -> Self {
        match err {
            KnowledgeError::Database(e) => tutor_core::TutorError::PersistenceUnavailable(e.to_string()),
            KnowledgeError::Serialization(e) => tutor_core::TutorError::Serialization(e),
            KnowledgeError::ChunkNotFound(id) => tutor_core::TutorError::NotFound(format!("chunk {id}")),
            KnowledgeError::DocumentNotFound(id) => tutor_core::TutorError::NotFound(format!("document {id}")),
            KnowledgeError::JobNotFound(id) => tutor_core::TutorError::NotFound(format!("job {id}")),
            KnowledgeError::InvalidChunk(msg) => tutor_core::TutorError::Validation(msg),
            KnowledgeError::Pdf(msg) => tutor_core::TutorError::Internal(msg),
            KnowledgeError::Embedding(msg) | KnowledgeError::Vision(msg) => {
                tutor_core::TutorError::UpstreamModel(msg)
            }
            KnowledgeError::BlobStore(msg) => tutor_core::TutorError::Internal(msg),
        }
    }
}
