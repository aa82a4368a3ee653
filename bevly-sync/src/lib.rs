//! bevly-sync library interface
//!
//! Menu crawling, metadata enrichment and the sync loop that keeps the
//! beverage knowledge base fresh, plus the thin HTTP shell around them.

pub mod api;
pub mod error;
pub mod fusion;
pub mod gc;
pub mod orchestrator;
pub mod policy;
pub mod repository;
pub mod scheduler;
pub mod sources;
pub mod text;
pub mod throttle;

pub use crate::error::{ApiError, ApiResult, SyncError};

use axum::Router;
use chrono::{DateTime, Utc};
use orchestrator::SyncOrchestrator;
use repository::Repository;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    /// Absent when the background sync is disabled
    pub orchestrator: Option<Arc<SyncOrchestrator>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(repo: Arc<dyn Repository>, orchestrator: Option<Arc<SyncOrchestrator>>) -> Self {
        Self {
            repo,
            orchestrator,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::sync_routes())
        .merge(api::drink_routes())
        .with_state(state)
}
