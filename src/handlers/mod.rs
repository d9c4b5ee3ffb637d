pub mod random;
pub mod stats;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tracing::error;

use crate::error::FetchError;

// ─── GET /healthcheck ────────────────────────────────────────────

pub async fn healthcheck() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// ─── Unified error type ──────────────────────────────────────────

/// The core could not produce a value; the status follows the error's class.
#[derive(Debug)]
pub struct AppError(pub FetchError);

impl From<FetchError> for AppError {
    fn from(err: FetchError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status: StatusCode = self.0.status();
        let message = self.0.to_string();

        error!(status = status.as_u16(), error = %message, "request failed");

        let body = json!({
            "error":  message,
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}
