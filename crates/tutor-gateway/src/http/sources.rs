//! `GET /api/v1/sources/` (paged, filtered chunk listing) and
//! `GET /api/v1/sources/{node_id}` (single chunk lookup).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use tutor_core::error::TutorError;
use tutor_knowledge::{BoundingBox, ContentType, DocumentChunk};

use crate::app::AppState;
use crate::http::error::GatewayResult;

fn default_limit() -> u32 {
    50
}

#[derive(Debug, Deserialize)]
pub struct SourcesQuery {
    pub document_id: Option<String>,
    pub content_type: Option<String>,
    pub page_number: Option<u32>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

#[derive(Debug, Serialize)]
pub struct ChunkDto {
    pub node_id: String,
    pub document_id: String,
    pub page_number: u32,
    pub chunk_index: u32,
    pub content: String,
    pub content_type: String,
    pub confidence: f32,
    pub image_url: Option<String>,
    pub bounding_boxes: Vec<BoundingBox>,
}

impl From<DocumentChunk> for ChunkDto {
    fn from(c: DocumentChunk) -> Self {
        Self {
            node_id: c.node_id,
            document_id: c.document_id,
            page_number: c.page_number,
            chunk_index: c.chunk_index,
            content: c.content,
            content_type: c.content_type.to_string(),
            confidence: c.confidence,
            image_url: c.image_url,
            bounding_boxes: c.bounding_boxes,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SourcesResponse {
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
    pub chunks: Vec<ChunkDto>,
}

pub async fn list_sources(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SourcesQuery>,
) -> GatewayResult<Json<SourcesResponse>> {
    let content_type = query
        .content_type
        .as_deref()
        .map(|s| s.parse::<ContentType>())
        .transpose()
        .map_err(TutorError::Validation)?;

    let (chunks, total) = state.knowledge.list_chunks(
        query.document_id.as_deref(),
        content_type,
        query.page_number,
        query.limit,
        query.offset,
    )?;

    Ok(Json(SourcesResponse {
        total,
        limit: query.limit,
        offset: query.offset,
        chunks: chunks.into_iter().map(ChunkDto::from).collect(),
    }))
}

pub async fn get_source(
    State(state): State<Arc<AppState>>,
    Path(node_id): Path<String>,
) -> GatewayResult<Json<ChunkDto>> {
    let chunk = state.knowledge.get_chunk(&node_id)?;
    Ok(Json(ChunkDto::from(chunk)))
}
