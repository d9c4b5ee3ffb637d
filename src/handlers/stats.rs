use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::metrics::MetricsSnapshot;
use crate::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub average: f64,
    pub samples: u64,
    pub upstream: MetricsSnapshot,
}

// ─── GET /api/stats ──────────────────────────────────────────────

/// Upstream call counters and latency, plus the current average.
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<Stats> {
    let average = state.service.state();
    Json(Stats {
        average: average.mean(),
        samples: average.count(),
        upstream: state.metrics.snapshot(),
    })
}
