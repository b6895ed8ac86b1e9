//! `GET /api/v1/memories/{user_id}` — the facts the memory subsystem has
//! learned about a user, capped by `memory.memory_cap`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::app::AppState;
use crate::http::error::GatewayResult;

#[derive(Debug, Serialize)]
pub struct FactDto {
    pub fact_type: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct MemoriesResponse {
    pub user_id: String,
    pub total_facts: usize,
    pub max_facts: usize,
    pub facts: Vec<FactDto>,
}

pub async fn get_memories(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> GatewayResult<Json<MemoriesResponse>> {
    let facts = state.memory.get_facts(&user_id)?;

    Ok(Json(MemoriesResponse {
        user_id,
        total_facts: facts.len(),
        max_facts: state.config.memory.memory_cap,
        facts: facts
            .into_iter()
            .map(|f| FactDto {
                fact_type: f.fact_type.to_string(),
                content: f.content,
                created_at: f.created_at,
            })
            .collect(),
    }))
}
