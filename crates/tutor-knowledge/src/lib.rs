pub mod blobstore;
pub mod chunk;
pub mod classify;
pub mod db;
pub mod embed;
pub mod error;
pub mod extract;
pub mod ingest;
mod jobs;
pub mod providers;
pub mod retrieve;
pub mod store;
pub mod types;
pub mod vision;

pub use blobstore::{BlobStore, FilesystemBlobStore};
pub use embed::Embedder;
pub use error::KnowledgeError;
pub use ingest::{IngestionPipeline, IngestionSettings, PageRenderer};
pub use providers::{OpenAiEmbedder, OpenAiVisionExtractor, PdftoppmRenderer};
pub use retrieve::{HybridRetriever, RetrievalConfig};
pub use store::KnowledgeStore;
pub use types::{
    BoundingBox, Citation, ContentType, DocumentChunk, DocumentSummary, EvidenceImage, IngestionJob,
    JobStatus, PageStatus, SearchFilters, SearchHit, SearchResult,
};
pub use vision::{VisionExtraction, VisionExtractor};
