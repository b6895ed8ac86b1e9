//! `POST /api/v1/chat` and `POST /api/v1/chat/stream` — the tutoring
//! conversation endpoint. Delegates the entire turn to
//! `tutor_agent::Orchestrator::handle_turn`, which already composes
//! moderation, memory, and retrieval internally.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};
use tracing::warn;

use tutor_agent::TurnRequest;
use tutor_core::error::TutorError;
use tutor_core::types::Role;
use tutor_knowledge::Citation;

use crate::app::AppState;
use crate::http::error::GatewayResult;

#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    pub user_id: String,
    pub message: String,
    pub role: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SourceDto {
    pub node_id: String,
    pub document_id: String,
    pub page_number: u32,
    pub content_snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bounding_boxes: Vec<tutor_knowledge::BoundingBox>,
    pub relevance_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl From<Citation> for SourceDto {
    fn from(c: Citation) -> Self {
        Self {
            node_id: c.node_ids.first().cloned().unwrap_or_default(),
            document_id: c.document_id,
            page_number: c.page_number,
            content_snippet: c.content_snippet,
            image_url: c.image_url,
            bounding_boxes: c.bounding_boxes,
            relevance_score: c.relevance_score,
            title: c.title,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatData {
    pub answer: String,
    pub sources: Vec<SourceDto>,
    pub evidence_images: Vec<tutor_knowledge::EvidenceImage>,
    pub suggested_questions: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatMetadata {
    pub agent_type: String,
    pub processing_time: u64,
    pub tools_used: Vec<tutor_agent::orchestrator::ToolUsage>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponseBody {
    pub status: &'static str,
    pub data: ChatData,
    pub metadata: ChatMetadata,
}

/// Renders the handful of profile fields the prompt builder cares about into
/// a short paragraph — the orchestrator takes this pre-rendered since
/// `tutor-agent` has no dependency on `tutor-users`.
fn render_profile_context(profile: &tutor_users::LearningProfile) -> String {
    let mut lines = vec![format!("Learner level: {}.", profile.level)];
    if let Some(style) = &profile.learning_style {
        lines.push(format!("Preferred learning style: {style}."));
    }
    if !profile.weak_topics.is_empty() {
        lines.push(format!("Weak topics: {}.", profile.weak_topics.join(", ")));
    }
    if !profile.strong_topics.is_empty() {
        lines.push(format!("Strong topics: {}.", profile.strong_topics.join(", ")));
    }
    lines.join(" ")
}

async fn run_turn(state: &Arc<AppState>, req: ChatRequestBody) -> GatewayResult<(tutor_agent::TurnResult, String)> {
    if req.message.trim().is_empty() {
        return Err(TutorError::Validation("message must not be empty".to_string()).into());
    }
    let role: Role = req
        .role
        .parse()
        .map_err(|_| TutorError::Validation(format!("unknown role: {}", req.role)))?;

    let session = state.sessions.get_or_create(&req.user_id, req.session_id.as_deref())?;
    let profile = state.users.get_or_create(&req.user_id)?;
    state.users.record_message(&req.user_id)?;

    let turn_req = TurnRequest {
        user_id: req.user_id.clone(),
        session_id: session.id.clone(),
        role,
        message: req.message.clone(),
        profile_context: Some(render_profile_context(&profile)),
    };

    let result = state.orchestrator.handle_turn(turn_req).await;

    let tokens_out = result.answer.chars().count() as u64 / 4;
    if let Err(err) = state.sessions.update_stats(&session.id, tokens_out, &state.config.agent.model) {
        warn!(%err, "failed to update session stats");
    }

    Ok((result, session.id))
}

pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequestBody>,
) -> GatewayResult<Json<ChatResponseBody>> {
    let (result, _session_id) = run_turn(&state, req).await?;

    Ok(Json(ChatResponseBody {
        status: "success",
        data: ChatData {
            answer: result.answer,
            sources: result.sources.into_iter().map(SourceDto::from).collect(),
            evidence_images: result.evidence_images,
            suggested_questions: result.suggested_questions,
        },
        metadata: ChatMetadata {
            agent_type: result.metadata.agent_type,
            processing_time: result.metadata.processing_time_ms,
            tools_used: result.metadata.tools_used,
        },
    }))
}

/// Chunk size (chars) the thinking trace and final answer are split into
/// for the SSE wire. `/api/v1/chat/stream` runs the full (non-streaming)
/// tool loop to completion and then re-plays `thinking` and `answer` as
/// chunked events — a deliberate simplification over true token-by-token
/// streaming (see DESIGN.md), since `Orchestrator` has no incremental-output
/// variant. Event order is fixed: zero or more `thinking`, then one or more
/// `answer`, then exactly one `sources` and one `metadata`, then `done` (or,
/// on failure, a single `error` event in place of the rest).
const STREAM_CHUNK_CHARS: usize = 24;

fn chunk_event(event: &'static str, text: &str) -> Vec<Event> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    chars
        .chunks(STREAM_CHUNK_CHARS)
        .map(|chunk| Event::default().event(event).data(chunk.iter().collect::<String>()))
        .collect()
}

pub async fn chat_stream_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequestBody>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let outcome = run_turn(&state, req).await;

    let stream = async_stream::stream! {
        let result = match outcome {
            Ok((result, _session_id)) => result,
            Err(err) => {
                let payload = serde_json::json!({ "message": err.to_string() });
                yield Ok(Event::default().event("error").data(payload.to_string()));
                return;
            }
        };

        if let Some(thinking) = &result.thinking {
            for event in chunk_event("thinking", thinking) {
                yield Ok(event);
                tokio::time::sleep(Duration::from_millis(15)).await;
            }
        }
        for event in chunk_event("answer", &result.answer) {
            yield Ok(event);
            tokio::time::sleep(Duration::from_millis(15)).await;
        }

        let sources: Vec<SourceDto> = result.sources.into_iter().map(SourceDto::from).collect();
        let sources_payload = serde_json::json!({
            "sources": sources,
            "evidence_images": result.evidence_images,
            "suggested_questions": result.suggested_questions,
        });
        yield Ok(Event::default().event("sources").data(sources_payload.to_string()));

        let metadata_payload = serde_json::json!({
            "agent_type": result.metadata.agent_type,
            "processing_time": result.metadata.processing_time_ms,
            "tools_used": result.metadata.tools_used,
        });
        yield Ok(Event::default().event("metadata").data(metadata_payload.to_string()));

        yield Ok(Event::default().event("done").data("{}"));
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
