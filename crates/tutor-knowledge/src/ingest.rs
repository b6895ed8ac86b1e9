use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::blobstore::BlobStore;
use crate::chunk::{chunk_page, ChunkerConfig};
use crate::classify::{is_directly_usable, UsabilityWeights};
use crate::embed::{embed_with_retry, Embedder};
use crate::error::Result;
use crate::extract::{runs_to_plain_text, PdfDocument};
use crate::store::KnowledgeStore;
use crate::types::{ContentType, DocumentChunk, JobStatus, PageStatus};
use crate::vision::VisionExtractor;

/// Tunables for the ingestion pipeline, mirroring `IngestionConfig`.
#[derive(Debug, Clone, Copy)]
pub struct IngestionSettings {
    pub chunker: ChunkerConfig,
    pub usability_weights: UsabilityWeights,
    pub text_usability_threshold: f64,
    pub page_concurrency: usize,
    pub vision_dpi: u32,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            usability_weights: UsabilityWeights::default(),
            text_usability_threshold: 0.6,
            page_concurrency: 4,
            vision_dpi: 200,
        }
    }
}

const DIRECT_CONFIDENCE: f32 = 1.0;
const VISION_CONFIDENCE: f32 = 0.85;

/// Renders a page to an image for the vision fallback and for the evidence
/// images attached to citations. Left pluggable because rasterizing a PDF
/// page is an external concern (a PDF renderer or headless browser), not
/// something this crate's storage/search layer should own.
#[async_trait::async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, document_bytes: &[u8], page_number: u32, dpi: u32) -> Result<Vec<u8>>;
}

/// Orchestrates ingesting one PDF: classify each page as direct or vision,
/// extract/chunk/embed it, and persist it transactionally. Pages already
/// chunked from a prior run are skipped, so a retried ingestion resumes
/// rather than re-processing the whole document.
pub struct IngestionPipeline {
    store: Arc<KnowledgeStore>,
    embedder: Arc<dyn Embedder>,
    vision: Arc<dyn VisionExtractor>,
    renderer: Arc<dyn PageRenderer>,
    blobs: Arc<dyn BlobStore>,
    settings: IngestionSettings,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<KnowledgeStore>,
        embedder: Arc<dyn Embedder>,
        vision: Arc<dyn VisionExtractor>,
        renderer: Arc<dyn PageRenderer>,
        blobs: Arc<dyn BlobStore>,
        settings: IngestionSettings,
    ) -> Self {
        Self {
            store,
            embedder,
            vision,
            renderer,
            blobs,
            settings,
        }
    }

    #[instrument(skip(self, document_bytes))]
    pub async fn ingest_document(&self, document_id: &str, title: Option<&str>, document_bytes: Vec<u8>) -> Result<String> {
        let job_id = Uuid::new_v4().to_string();
        let doc = PdfDocument::open(document_bytes.clone())?;
        let page_count = doc.page_count();

        self.store.register_document(document_id, title, None, page_count)?;
        self.store.create_job(&job_id, document_id, page_count)?;

        let semaphore = Arc::new(Semaphore::new(self.settings.page_concurrency));
        let doc = Arc::new(doc);
        let document_bytes = Arc::new(document_bytes);

        let mut handles = Vec::with_capacity(page_count as usize);
        for page_number in 1..=page_count {
            if self.store.page_has_chunks(document_id, page_number)? {
                info!(document_id, page_number, "page already ingested, skipping");
                self.store.record_page_result(document_id, page_number, PageStatus::Skipped)?;
                self.store.increment_job_counters(&job_id, PageStatus::Skipped)?;
                continue;
            }

            let semaphore = semaphore.clone();
            let doc = doc.clone();
            let document_bytes = document_bytes.clone();
            let document_id = document_id.to_string();
            let job_id = job_id.clone();
            let pipeline = self.clone_handles();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let outcome = pipeline.ingest_page(&document_id, page_number, &doc, &document_bytes).await;
                match outcome {
                    Ok(status) => {
                        pipeline.store.record_page_result(&document_id, page_number, status).ok();
                        pipeline.store.increment_job_counters(&job_id, status).ok();
                    }
                    Err(err) => {
                        warn!(document_id, page_number, %err, "page ingestion failed");
                        pipeline.store.record_page_result(&document_id, page_number, PageStatus::Failed).ok();
                        pipeline.store.increment_job_counters(&job_id, PageStatus::Failed).ok();
                    }
                }
            }));
        }

        for handle in handles {
            handle.await.expect("ingestion task panicked");
        }

        let job = self.store.get_job(&job_id)?;
        let final_status = if job.failed_pages > 0 && job.successful_pages == 0 {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        };
        self.store.complete_job(&job_id, final_status)?;

        Ok(job_id)
    }

    fn clone_handles(&self) -> Self {
        Self {
            store: self.store.clone(),
            embedder: self.embedder.clone(),
            vision: self.vision.clone(),
            renderer: self.renderer.clone(),
            blobs: self.blobs.clone(),
            settings: self.settings,
        }
    }

    async fn ingest_page(&self, document_id: &str, page_number: u32, doc: &PdfDocument, document_bytes: &[u8]) -> Result<PageStatus> {
        let direct_runs = doc.extract_page(page_number)?;
        let direct_text = runs_to_plain_text(&direct_runs);

        let usable = is_directly_usable(&direct_text, self.settings.usability_weights, self.settings.text_usability_threshold);

        let (runs, status, confidence) = if usable {
            (direct_runs, PageStatus::Direct, DIRECT_CONFIDENCE)
        } else {
            let image_bytes = self.renderer.render(document_bytes, page_number, self.settings.vision_dpi).await?;
            let extraction = self.vision.extract_page(&image_bytes, self.settings.vision_dpi).await?;
            (extraction.into(), PageStatus::Vision, VISION_CONFIDENCE)
        };

        if runs.is_empty() {
            return Ok(PageStatus::Skipped);
        }

        let drafts = chunk_page(&runs, self.settings.chunker, confidence);
        if drafts.is_empty() {
            return Ok(PageStatus::Skipped);
        }

        // Bounding boxes are only meaningful against a page image, and the
        // data model requires image_url whenever bounding_boxes is non-empty
        // (§3 invariant), so every page gets its image uploaded regardless
        // of which extraction path produced its text — not only the vision
        // path, which renders one anyway to call the vision model.
        let needs_image = status == PageStatus::Vision || drafts.iter().any(|d| !d.bounding_boxes.is_empty());
        let image_url = if needs_image {
            let image_bytes = self.renderer.render(document_bytes, page_number, self.settings.vision_dpi).await?;
            Some(self.blobs.put(&format!("{document_id}/page-{page_number}.png"), image_bytes, "image/png").await?)
        } else {
            None
        };

        let texts: Vec<String> = drafts.iter().map(|d| d.content.clone()).collect();
        let embeddings = embed_with_retry(self.embedder.as_ref(), &texts).await?;

        let now = chrono::Utc::now().to_rfc3339();
        let chunks: Vec<DocumentChunk> = drafts
            .into_iter()
            .zip(embeddings.into_iter())
            .enumerate()
            .map(|(chunk_index, (draft, embedding))| DocumentChunk {
                node_id: Uuid::new_v4().to_string(),
                document_id: document_id.to_string(),
                page_number,
                chunk_index: chunk_index as u32,
                content: draft.content,
                content_type: draft.content_type,
                confidence: draft.confidence,
                embedding,
                image_url: if matches!(draft.content_type, ContentType::DiagramReference)
                    || status == PageStatus::Vision
                    || !draft.bounding_boxes.is_empty()
                {
                    image_url.clone()
                } else {
                    None
                },
                bounding_boxes: draft.bounding_boxes,
                created_at: now.clone(),
                updated_at: now.clone(),
            })
            .collect();

        self.store.insert_chunks(&chunks)?;
        Ok(status)
    }
}
