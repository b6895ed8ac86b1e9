//! `GET /health` (shallow liveness, no I/O) and `GET /health/db` (deep check
//! that actually touches the database and the configured model providers).
//! `HealthTracker` in `tutor-agent` is passive — it only records outcomes of
//! real traffic — so the deep check here issues its own timed probes rather
//! than reading a cached status.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use tutor_agent::{ChatRequest, ChatRole, Message};

use crate::app::AppState;

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub status: &'static str,
}

/// `GET /health`. Must not touch the database or any upstream provider.
pub async fn health_handler() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: &'static str,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DbHealthBody {
    pub status: &'static str,
    pub database: ComponentHealth,
    pub model_provider: ComponentHealth,
}

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// `GET /health/db`. Runs a trivial query against the shared SQLite database
/// and a minimal completion against the configured model provider, each under
/// its own timeout, and reports per-component latency.
pub async fn health_db_handler(State(state): State<Arc<AppState>>) -> Json<DbHealthBody> {
    let db = probe_database(&state).await;
    let provider = probe_provider(&state).await;

    let status = if db.status == "ok" && provider.status == "ok" {
        "ok"
    } else {
        "degraded"
    };

    Json(DbHealthBody {
        status,
        database: db,
        model_provider: provider,
    })
}

async fn probe_database(state: &Arc<AppState>) -> ComponentHealth {
    let knowledge = state.knowledge.clone();
    let start = Instant::now();
    let result = tokio::time::timeout(
        PROBE_TIMEOUT,
        tokio::task::spawn_blocking(move || knowledge.stats()),
    )
    .await;

    let latency_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(Ok(Ok(_))) => ComponentHealth {
            status: "ok",
            latency_ms,
            message: None,
        },
        Ok(Ok(Err(e))) => ComponentHealth {
            status: "down",
            latency_ms,
            message: Some(e.to_string()),
        },
        Ok(Err(e)) => ComponentHealth {
            status: "down",
            latency_ms,
            message: Some(format!("db probe task panicked: {e}")),
        },
        Err(_) => ComponentHealth {
            status: "down",
            latency_ms,
            message: Some("database probe timed out".to_string()),
        },
    }
}

async fn probe_provider(state: &Arc<AppState>) -> ComponentHealth {
    let req = ChatRequest {
        model: state.config.agent.model.clone(),
        system: "Reply with the single word: ok.".to_string(),
        system_prompt: None,
        messages: vec![Message {
            role: ChatRole::User,
            content: "ping".to_string(),
        }],
        max_tokens: 8,
        stream: false,
        thinking: None,
        tools: Vec::new(),
        raw_messages: None,
    };

    let start = Instant::now();
    let result = tokio::time::timeout(PROBE_TIMEOUT, state.provider.send(&req)).await;
    let latency_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(Ok(_)) => ComponentHealth {
            status: "ok",
            latency_ms,
            message: None,
        },
        Ok(Err(e)) => ComponentHealth {
            status: "down",
            latency_ms,
            message: Some(e.to_string()),
        },
        Err(_) => ComponentHealth {
            status: "down",
            latency_ms,
            message: Some("model provider probe timed out".to_string()),
        },
    }
}
