//! `POST /api/v1/knowledge/ingest-multimodal`, `GET /api/v1/knowledge/jobs/
//! {job_id}`, `GET /api/v1/knowledge/list`, `GET /api/v1/knowledge/stats`.

use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::Serialize;

use tutor_core::error::TutorError;
use tutor_core::types::Role;
use tutor_users::permissions::{Permission, PermissionCheck, PermissionChecker};

use crate::app::AppState;
use crate::http::error::GatewayResult;

#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub job_id: String,
    pub document_id: String,
    pub total_pages: u32,
    pub successful_pages: u32,
    pub failed_pages: u32,
    pub vision_pages: u32,
    pub direct_pages: u32,
    pub skipped_pages: u32,
    pub status: tutor_knowledge::JobStatus,
    pub api_savings_percent: f64,
    pub started_at: String,
    pub completed_at: Option<String>,
}

impl From<tutor_knowledge::IngestionJob> for JobSummary {
    fn from(job: tutor_knowledge::IngestionJob) -> Self {
        Self {
            api_savings_percent: job.api_savings_percent(),
            job_id: job.job_id,
            document_id: job.document_id,
            total_pages: job.total_pages,
            successful_pages: job.successful_pages,
            failed_pages: job.failed_pages,
            vision_pages: job.vision_pages,
            direct_pages: job.direct_pages,
            skipped_pages: job.skipped_pages,
            status: job.status,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

/// Ingests one PDF. `role` must be `admin`; `document_id` identifies the
/// target document; `resume`/`max_pages` are accepted for contract
/// compatibility but the pipeline already skips previously-ingested pages
/// unconditionally (see DESIGN.md).
pub async fn ingest_multimodal(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> GatewayResult<Json<JobSummary>> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut document_id: Option<String> = None;
    let mut role: Option<String> = None;
    let mut title: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| TutorError::Validation(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                title = field.file_name().map(|s| s.to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| TutorError::Validation(format!("failed to read file field: {e}")))?;
                file_bytes = Some(data.to_vec());
            }
            "document_id" => {
                document_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| TutorError::Validation(format!("invalid document_id field: {e}")))?,
                );
            }
            "role" => {
                role = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| TutorError::Validation(format!("invalid role field: {e}")))?,
                );
            }
            _ => {
                // resume / max_pages and any other fields are drained but unused.
                let _ = field.text().await;
            }
        }
    }

    let file_bytes = file_bytes.ok_or_else(|| TutorError::Validation("missing multipart field: file".to_string()))?;
    let document_id = document_id.ok_or_else(|| TutorError::Validation("missing multipart field: document_id".to_string()))?;
    let role_str = role.ok_or_else(|| TutorError::Validation("missing multipart field: role".to_string()))?;

    let role: Role = role_str
        .parse()
        .map_err(|_| TutorError::Validation(format!("unknown role: {role_str}")))?;

    match PermissionChecker::check(role, Permission::IngestDocument, "", "") {
        PermissionCheck::Allowed => {}
        PermissionCheck::Denied { reason } => return Err(TutorError::Forbidden(reason).into()),
    }

    let job_id = state
        .ingestion
        .ingest_document(&document_id, title.as_deref(), file_bytes)
        .await?;
    let job = state.knowledge.get_job(&job_id)?;

    Ok(Json(JobSummary::from(job)))
}

pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> GatewayResult<Json<JobSummary>> {
    let job = state.knowledge.get_job(&job_id)?;
    Ok(Json(JobSummary::from(job)))
}

pub async fn list_documents(State(state): State<Arc<AppState>>) -> GatewayResult<Json<Vec<tutor_knowledge::DocumentSummary>>> {
    Ok(Json(state.knowledge.list_documents()?))
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub documents: i64,
    pub chunks: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// `GET /api/v1/knowledge/stats`. Persistence failures are reported as a
/// `warning` on a zeroed body rather than failing the call, per the HTTP
/// contract.
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    match state.knowledge.stats() {
        Ok((documents, chunks)) => Json(StatsResponse {
            documents,
            chunks,
            warning: None,
        }),
        Err(err) => Json(StatsResponse {
            documents: 0,
            chunks: 0,
            warning: Some(err.to_string()),
        }),
    }
}
