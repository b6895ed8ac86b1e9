//! Maps `TutorError` onto the `{status:"error", error:{code, message}}` body
//! every handler in this crate returns on failure, so each handler can just
//! propagate with `?` instead of hand-building a response per error site.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use tutor_core::error::TutorError;

pub struct GatewayError(pub TutorError);

impl<E> From<E> for GatewayError
where
    E: Into<TutorError>,
{
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

impl From<anyhow::Error> for GatewayError {
    fn from(e: anyhow::Error) -> Self {
        Self(TutorError::Internal(e.to_string()))
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(error = %self.0, code = self.0.code(), "request failed");
        }
        let body = Json(json!({
            "status": "error",
            "error": {
                "code": self.0.code(),
                "message": self.0.to_string(),
            }
        }));
        (status, body).into_response()
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
