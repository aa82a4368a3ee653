//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::orchestrator::PassSummary;
use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status ("ok")
    pub status: String,
    /// Module name ("bevly-sync")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Whether the background sync is running
    pub sync_enabled: bool,
    /// Most recently finished sync pass
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<PassSummary>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let last_sync = match &state.orchestrator {
        Some(orchestrator) => orchestrator.last_summary().await,
        None => None,
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "bevly-sync".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        sync_enabled: state.orchestrator.is_some(),
        last_sync,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
