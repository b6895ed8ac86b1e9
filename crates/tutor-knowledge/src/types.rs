use serde::{Deserialize, Serialize};

/// Kind of content a chunk represents ("Document Chunk").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Heading,
    Table,
    Formula,
    DiagramReference,
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ContentType::Text => "text",
            ContentType::Heading => "heading",
            ContentType::Table => "table",
            ContentType::Formula => "formula",
            ContentType::DiagramReference => "diagram_reference",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ContentType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "heading" => Ok(Self::Heading),
            "table" => Ok(Self::Table),
            "formula" => Ok(Self::Formula),
            "diagram_reference" => Ok(Self::DiagramReference),
            other => Err(format!("unknown content_type: {other}")),
        }
    }
}

/// A normalized rectangle on a page, coordinates in `[0, 100]` on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

/// One semantically coherent unit of a page ("Document Chunk").
///
/// Invariants enforced at construction (`ChunkBuilder`) and again by
/// `KnowledgeStore::insert_chunks` before the write lands:
/// `bounding_boxes.is_empty() || image_url.is_some()`, `page_number >= 1`,
/// `confidence` in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Opaque identity, stable once inserted.
    pub node_id: String,
    pub document_id: String,
    pub page_number: u32,
    pub chunk_index: u32,
    pub content: String,
    pub content_type: ContentType,
    pub confidence: f32,
    /// Dense embedding, dimension determined by the embedder in use.
    pub embedding: Vec<f32>,
    pub image_url: Option<String>,
    pub bounding_boxes: Vec<BoundingBox>,
    pub created_at: String,
    pub updated_at: String,
}

impl DocumentChunk {
    /// Validate the cross-field invariants from the data model before a write.
    pub fn validate(&self) -> Result<(), String> {
        if self.page_number < 1 {
            return Err("page_number must be >= 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err("confidence must be in [0, 1]".to_string());
        }
        if !self.bounding_boxes.is_empty() && self.image_url.is_none() {
            return Err("bounding_boxes present but image_url missing".to_string());
        }
        Ok(())
    }
}

/// Filters applied after fusion, per the hybrid search algorithm.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub document_id: Option<String>,
    pub content_types: Option<Vec<ContentType>>,
    pub page_range: Option<(u32, u32)>,
    /// Minimum fused score to keep a hit. `0.0` (default) disables the filter.
    pub min_score: f64,
}

/// One fused hit: the chunk plus its dense/lexical/fused scores.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: DocumentChunk,
    pub dense_score: f64,
    pub lexical_score: f64,
    pub fused_score: f64,
}

/// A chunk-group returned to the caller as evidence for an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub document_id: String,
    pub page_number: u32,
    /// Node ids of the member chunks, in the order they were merged.
    pub node_ids: Vec<String>,
    pub content_snippet: String,
    pub image_url: Option<String>,
    pub bounding_boxes: Vec<BoundingBox>,
    pub relevance_score: f64,
    pub title: Option<String>,
}

/// The page-level image referenced by one or more citations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceImage {
    pub document_id: String,
    pub page_number: u32,
    pub image_url: String,
}

/// Result of `HybridRetriever::search`.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub hits: Vec<SearchHit>,
    pub citations: Vec<Citation>,
    pub evidence_images: Vec<EvidenceImage>,
}

/// Per-page status during ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Pending,
    Direct,
    Vision,
    Failed,
    Skipped,
}

impl std::fmt::Display for PageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PageStatus::Pending => "pending",
            PageStatus::Direct => "direct",
            PageStatus::Vision => "vision",
            PageStatus::Failed => "failed",
            PageStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// One row of `GET /api/v1/knowledge/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub document_id: String,
    pub title: Option<String>,
    pub page_count: u32,
    pub chunk_count: u32,
    pub created_at: String,
}

/// Transient ingestion job, surfaced via the status lookup endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionJob {
    pub job_id: String,
    pub document_id: String,
    pub total_pages: u32,
    pub successful_pages: u32,
    pub failed_pages: u32,
    pub vision_pages: u32,
    pub direct_pages: u32,
    pub skipped_pages: u32,
    pub status: JobStatus,
    pub started_at: String,
    pub completed_at: Option<String>,
}

impl IngestionJob {
    /// `direct_pages / total_pages * 100`, `0.0` when there are no pages yet.
    pub fn api_savings_percent(&self) -> f64 {
        if self.total_pages == 0 {
            return 0.0;
        }
        (self.direct_pages as f64 / self.total_pages as f64) * 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

/// One text run extracted from a page, with a position normalized to
/// `[0, 100]` on both axes, before semantic chunking groups runs together.
#[derive(Debug, Clone)]
pub struct TextRun {
    pub text: String,
    pub bbox: Option<BoundingBox>,
}

/// Output of extracting a single page, before chunking.
#[derive(Debug, Clone)]
pub struct PageExtraction {
    pub runs: Vec<TextRun>,
    pub image_url: Option<String>,
    pub status: PageStatus,
    /// Per-run confidence the extractor reports (`None` → caller applies the
    /// direct=1.0 / vision=0.85 defaults from the data model).
    pub confidence: Option<f32>,
}
