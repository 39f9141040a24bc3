// handlers/debug.rs - GET /debug/vars

use axum::{extract::State, Json};

use crate::middleware::MetricsSnapshot;
use crate::state::AppState;

pub async fn vars(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
