//! Error types for bevly-sync
//!
//! [`SyncError`] is what a sync pass collects: every failure carries the
//! provider, beverage or source it happened on. [`ApiError`] is the HTTP
//! shell's error.

use crate::sources::SourceError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failure recorded during a sync pass
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// Menu fetch failed for one provider; its prior menu is kept
    #[error("Menu fetch for provider {provider} failed: {source}")]
    Menu {
        provider: String,
        #[source]
        source: SourceError,
    },

    /// One metadata source failed for one beverage
    #[error("Metadata source {source_name} failed for {beverage}: {error}")]
    Metadata {
        beverage: String,
        source_name: String,
        error: SourceError,
    },

    /// Repository read or write failed for one entity
    #[error("Storage error for {entity}: {error}")]
    Storage { entity: String, error: String },

    /// Providers or beverages could not be enumerated; the pass was abandoned
    #[error("Sync pass aborted: {0}")]
    Fatal(String),
}

impl SyncError {
    pub fn storage(entity: impl Into<String>, error: &bevly_common::Error) -> Self {
        Self::Storage {
            entity: entity.into(),
            error: error.to_string(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// bevly-common error
    #[error("Common error: {0}")]
    Common(#[from] bevly_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Common(bevly_common::Error::NotFound(msg)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", msg)
            }
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
