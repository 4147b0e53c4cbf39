use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::analysis::AnalysisError;
use crate::conversation::ProviderError;
use crate::models::session::TransitionError;
use crate::sessions::store::StoreError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Session {0} has already been completed")]
    SessionCompleted(Uuid),

    #[error("Invalid status transition: {0}")]
    InvalidTransition(#[from] TransitionError),

    #[error("Quota exceeded: {used}/{limit}")]
    QuotaExceeded { used: u32, limit: u32 },

    #[error("Too many requests")]
    RateLimited { retry_after_secs: u64 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Scoring did not finish within {0}s")]
    ScoringTimeout(u64),

    #[error("Conversation provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("S3 error: {0}")]
    S3(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::TenantNotFound(id) => AppError::NotFound(format!("Tenant {id} not found")),
            StoreError::QuotaExceeded { used, limit } => AppError::QuotaExceeded { used, limit },
            StoreError::Database(e) => AppError::Database(e),
            StoreError::Corrupt(e) => AppError::Internal(e.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::SessionCompleted(_) => (
                StatusCode::BAD_REQUEST,
                "SESSION_COMPLETED",
                "This session has already been completed.".to_string(),
            ),
            AppError::InvalidTransition(e) => {
                (StatusCode::BAD_REQUEST, "INVALID_TRANSITION", e.to_string())
            }
            AppError::QuotaExceeded { used, limit } => (
                StatusCode::BAD_REQUEST,
                "QUOTA_EXCEEDED",
                format!("Session quota exceeded ({used}/{limit}). Contact an administrator to increase it."),
            ),
            AppError::RateLimited { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                format!("Too many requests, retry in {retry_after_secs}s"),
            ),
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Analysis(e) => {
                tracing::error!("Analysis error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "ANALYSIS_ERROR",
                    format!("Interview analysis failed: {e}"),
                )
            }
            AppError::ScoringTimeout(secs) => {
                tracing::error!("Scoring timed out after {secs}s");
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    "SCORING_TIMEOUT",
                    format!("Scoring did not finish within {secs}s. Send the completion again to retry scoring."),
                )
            }
            AppError::Provider(e) => {
                tracing::error!("Conversation provider error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "PROVIDER_ERROR",
                    "The conversation provider request failed".to_string(),
                )
            }
            AppError::S3(msg) => {
                tracing::error!("S3 error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "S3_ERROR",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
