//! Manual sync trigger

use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    /// False when a pass was already pending and this request was coalesced
    pub accepted: bool,
}

/// POST /sync
///
/// Non-blocking: returns at once, whether or not a pass was queued.
pub async fn trigger_sync(State(state): State<AppState>) -> ApiResult<Json<TriggerResponse>> {
    let orchestrator = state
        .orchestrator
        .as_ref()
        .ok_or_else(|| ApiError::BadRequest("sync is disabled".to_string()))?;

    let accepted = orchestrator.trigger_sync(false).await;
    Ok(Json(TriggerResponse { accepted }))
}

pub fn sync_routes() -> Router<AppState> {
    Router::new().route("/sync", post(trigger_sync))
}
