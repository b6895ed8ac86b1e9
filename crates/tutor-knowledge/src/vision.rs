use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::TextRun;

/// Structured output of running a rendered page image through a
/// vision-capable model: recovered text runs plus a content-type hint per
/// run, used when a page fails the text-usability check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionExtraction {
    pub runs: Vec<VisionRun>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionRun {
    pub text: String,
    pub content_type_hint: Option<String>,
}

/// Extracts text from a rendered page image. The pipeline falls back to
/// this path for pages whose direct-extraction usability score is below
/// the configured threshold (scans, tables, diagrams).
#[async_trait]
pub trait VisionExtractor: Send + Sync {
    async fn extract_page(&self, image_bytes: &[u8], dpi: u32) -> Result<VisionExtraction>;
}

impl From<VisionExtraction> for Vec<TextRun> {
    fn from(extraction: VisionExtraction) -> Self {
        extraction
            .runs
            .into_iter()
            .map(|r| TextRun { text: r.text, bbox: None })
            .collect()
    }
}
