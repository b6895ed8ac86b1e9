//! `X-API-Key` header auth, checked ahead of every route. A single static
//! key rather than per-mode auth, applied as one global middleware layer
//! instead of a per-handler check.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::app::AppState;
use crate::http::error::GatewayError;
use tutor_core::error::TutorError;

/// When `config.gateway.api_key` is `None`, auth is disabled (local dev).
/// Otherwise the request must carry `X-API-Key: <key>` matching exactly.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let Some(expected) = &state.config.gateway.api_key else {
        return Ok(next.run(request).await);
    };

    let provided = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok());

    if provided != Some(expected.as_str()) {
        return Err(TutorError::Auth("missing or invalid X-API-Key header".to_string()).into());
    }

    Ok(next.run(request).await)
}
