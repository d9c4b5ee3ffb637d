use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

use super::AppError;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RandomAverage {
    pub random_average: f64,
}

// ─── GET /api/random ─────────────────────────────────────────────

pub async fn get_random(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RandomAverage>, AppError> {
    let random_average = state.service.current_average().await?;
    Ok(Json(RandomAverage { random_average }))
}
