// handlers/healthcheck.rs - GET /v1/healthcheck

use axum::extract::State;
use serde_json::json;

use crate::middleware::{ApiResult, Envelope};
use crate::state::AppState;

pub async fn healthcheck(State(state): State<AppState>) -> ApiResult {
    Ok(Envelope::new("status", "available").and(
        "system_info",
        json!({
            "environment": state.config.environment.as_str(),
            "version": env!("CARGO_PKG_VERSION"),
        }),
    ))
}
