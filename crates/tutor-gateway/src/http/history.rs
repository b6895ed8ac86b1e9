//! `GET /api/v1/history/{user_id}` and `DELETE /api/v1/chat/history/{user_id}`.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use tutor_core::error::TutorError;
use tutor_core::types::Role;
use tutor_users::permissions::{Permission, PermissionCheck, PermissionChecker};

use crate::app::AppState;
use crate::http::error::GatewayResult;

fn default_limit() -> usize {
    20
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
    pub session_id: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub user_id: String,
    pub limit: usize,
    pub offset: usize,
    pub messages: Vec<HistoryEntry>,
}

pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> GatewayResult<Json<HistoryResponse>> {
    let messages = state
        .memory
        .list_messages_for_user(&user_id, query.limit, query.offset, true)?;

    Ok(Json(HistoryResponse {
        user_id,
        limit: query.limit,
        offset: query.offset,
        messages: messages
            .into_iter()
            .map(|m| HistoryEntry {
                role: m.role.to_string(),
                content: m.content,
                session_id: m.session_id,
                created_at: m.created_at,
            })
            .collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct DeleteHistoryBody {
    pub role: String,
    pub requesting_user_id: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteHistoryResponse {
    pub status: &'static str,
    pub user_id: String,
}

/// Purges both message history (`tutor-memory`) and session records
/// (`tutor-sessions`) for the target user. Admins may delete anyone's;
/// everyone else only their own.
pub async fn delete_history(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(body): Json<DeleteHistoryBody>,
) -> GatewayResult<Json<DeleteHistoryResponse>> {
    let role: Role = body
        .role
        .parse()
        .map_err(|_| TutorError::Validation(format!("unknown role: {}", body.role)))?;

    match PermissionChecker::check(role, Permission::ManageOwnData, &body.requesting_user_id, &user_id) {
        PermissionCheck::Allowed => {}
        PermissionCheck::Denied { reason } => return Err(TutorError::Forbidden(reason).into()),
    }

    state.memory.delete_history_for_user(&user_id)?;
    for session in state.sessions.list_for_user(&user_id, usize::MAX)? {
        state.sessions.delete(&session.id)?;
    }

    Ok(Json(DeleteHistoryResponse {
        status: "success",
        user_id,
    }))
}
