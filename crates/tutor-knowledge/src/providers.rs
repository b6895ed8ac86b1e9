//! Concrete `Embedder`/`VisionExtractor` adapters over OpenAI-compatible
//! HTTP APIs, in the same shape as `tutor-agent`'s `OpenAiProvider`: a bare
//! `reqwest::Client`, bearer auth, and a small JSON response struct per
//! endpoint.

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use tracing::warn;

use crate::error::{KnowledgeError, Result};
use crate::ingest::PageRenderer;
use crate::vision::{VisionExtraction, VisionExtractor, VisionRun};
use crate::Embedder;

/// Calls OpenAI's `/v1/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimension: usize,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String, base_url: String, model: String, dimension: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
            model,
            dimension,
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| KnowledgeError::Embedding(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "embedding API error");
            return Err(KnowledgeError::Embedding(format!("HTTP {status}: {text}")));
        }

        let parsed: EmbeddingsResponse = resp
            .json()
            .await
            .map_err(|e| KnowledgeError::Embedding(e.to_string()))?;

        let mut by_index: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        for item in parsed.data {
            if item.index < by_index.len() {
                by_index[item.index] = Some(item.embedding);
            }
        }
        by_index
            .into_iter()
            .enumerate()
            .map(|(i, v)| v.ok_or_else(|| KnowledgeError::Embedding(format!("missing embedding for input {i}"))))
            .collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
    index: usize,
}

/// Calls an OpenAI-compatible chat completions endpoint with an inline
/// base64 image, asking the model to transcribe the page's text. No
/// bounding boxes are recovered this way — callers fall back to
/// whole-page evidence images instead, per the vision-path contract.
pub struct OpenAiVisionExtractor {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiVisionExtractor {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
            model,
        }
    }
}

const VISION_PROMPT: &str = "Transcribe all text visible in this document page image, \
    preserving reading order. Output plain text only, one paragraph per logical block. \
    Do not add commentary.";

#[async_trait]
impl VisionExtractor for OpenAiVisionExtractor {
    async fn extract_page(&self, image_bytes: &[u8], _dpi: u32) -> Result<VisionExtraction> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image_bytes);
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": VISION_PROMPT},
                    {"type": "image_url", "image_url": {"url": format!("data:image/png;base64,{encoded}")}},
                ],
            }],
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| KnowledgeError::Vision(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "vision API error");
            return Err(KnowledgeError::Vision(format!("HTTP {status}: {text}")));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| KnowledgeError::Vision(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        let runs = text
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| VisionRun {
                text: p.to_string(),
                content_type_hint: None,
            })
            .collect();

        Ok(VisionExtraction { runs })
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageBody,
}

#[derive(Deserialize)]
struct ChatMessageBody {
    content: Option<String>,
}

/// Rasterizes a page by shelling out to `pdftoppm` (poppler-utils), writing
/// the source bytes to a scratch file and reading back the single-page PNG
/// it produces. An external-tool dependency rather than a pure-Rust
/// renderer, since no crate in this workspace's dependency universe does
/// PDF rasterization — only text/glyph extraction (`pdf`).
pub struct PdftoppmRenderer {
    binary: String,
}

impl Default for PdftoppmRenderer {
    fn default() -> Self {
        Self::new("pdftoppm")
    }
}

impl PdftoppmRenderer {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

#[async_trait]
impl PageRenderer for PdftoppmRenderer {
    async fn render(&self, document_bytes: &[u8], page_number: u32, dpi: u32) -> Result<Vec<u8>> {
        let dir = tempfile::tempdir().map_err(|e| KnowledgeError::Pdf(e.to_string()))?;
        let input_path = dir.path().join("source.pdf");
        let output_prefix = dir.path().join("page");
        tokio::fs::write(&input_path, document_bytes)
            .await
            .map_err(|e| KnowledgeError::Pdf(e.to_string()))?;

        let status = tokio::process::Command::new(&self.binary)
            .arg("-png")
            .arg("-r")
            .arg(dpi.to_string())
            .arg("-f")
            .arg(page_number.to_string())
            .arg("-l")
            .arg(page_number.to_string())
            .arg(&input_path)
            .arg(&output_prefix)
            .status()
            .await
            .map_err(|e| KnowledgeError::Pdf(format!("failed to spawn {}: {e}", self.binary)))?;

        if !status.success() {
            return Err(KnowledgeError::Pdf(format!("{} exited with {status}", self.binary)));
        }

        // pdftoppm pads the page number in its output filename once the
        // document has more than one digit worth of pages; both forms are
        // tried since we only rendered a single page.
        for candidate in [
            format!("page-{page_number}.png"),
            format!("page-{page_number:02}.png"),
            format!("page-{page_number:03}.png"),
        ] {
            let path = dir.path().join(&candidate);
            if let Ok(bytes) = tokio::fs::read(&path).await {
                return Ok(bytes);
            }
        }
        Err(KnowledgeError::Pdf(format!(
            "pdftoppm produced no output file for page {page_number}"
        )))
    }
}
