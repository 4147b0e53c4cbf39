use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    Json,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::analysis::fusion::FinalScore;
use crate::analysis::Analysis;
use crate::errors::AppError;
use crate::models::session::{InterviewSession, SessionStatus};
use crate::rate_limit::RateDecision;
use crate::sessions::lifecycle::{CreateSessionRequest, SessionStart, SessionUpdate, UpdateOutcome};
use crate::state::AppState;

const CREATE_SCOPE: &str = "session-create";

#[derive(Deserialize)]
pub struct TenantQuery {
    pub tenant_id: Uuid,
}

/// Caller identity from the `tenant_id` query parameter. A missing or malformed value is
/// a 400 in the usual error envelope.
pub struct TenantScope(pub Uuid);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for TenantScope {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(query) = Query::<TenantQuery>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;
        Ok(TenantScope(query.tenant_id))
    }
}

#[derive(Serialize)]
pub struct SignedUrlResponse {
    pub signed_url: String,
}

#[derive(Serialize)]
pub struct SessionResult {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub analysis: Option<Analysis>,
    pub final_score: Option<FinalScore>,
}

#[derive(Serialize)]
pub struct QuotaResponse {
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
}

/// Bodies are decoded here rather than by the `Json` extractor so that malformed JSON and
/// unknown fields come back as a 400 in the usual error envelope.
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    serde_json::from_slice(body)
        .map_err(|e| AppError::Validation(format!("invalid request body: {e}")))
}

/// POST /api/v1/sessions
pub async fn handle_create_session(
    State(state): State<AppState>,
    TenantScope(tenant_id): TenantScope,
    body: Bytes,
) -> Result<(StatusCode, Json<InterviewSession>), AppError> {
    let req: CreateSessionRequest = parse_body(&body)?;

    match state
        .rate_limiter
        .check(CREATE_SCOPE, &tenant_id.to_string())
        .await
    {
        Ok(RateDecision::Allowed { .. }) => {}
        Ok(RateDecision::Limited { retry_after_secs }) => {
            return Err(AppError::RateLimited { retry_after_secs })
        }
        // Throttling is an extra guard; quota still bounds creation if Redis is down.
        Err(e) => warn!("Rate limiter unavailable, allowing request: {e}"),
    }

    let session = state.sessions.create_session(tenant_id, req).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /api/v1/sessions
pub async fn handle_list_sessions(
    State(state): State<AppState>,
    TenantScope(tenant_id): TenantScope,
) -> Result<Json<Vec<InterviewSession>>, AppError> {
    let sessions = state.sessions.store.list_sessions(tenant_id).await?;
    Ok(Json(sessions))
}

/// GET /api/v1/sessions/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    TenantScope(tenant_id): TenantScope,
) -> Result<Json<SessionStart>, AppError> {
    let start = state.sessions.get_for_start(id, tenant_id).await?;
    Ok(Json(start))
}

/// PATCH /api/v1/sessions/:id
pub async fn handle_update_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    TenantScope(tenant_id): TenantScope,
    body: Bytes,
) -> Result<Json<UpdateOutcome>, AppError> {
    let update: SessionUpdate = parse_body(&body)?;
    let outcome = state
        .sessions
        .update_session(id, tenant_id, update)
        .await?;
    Ok(Json(outcome))
}

/// GET /api/v1/sessions/:id/signed-url
pub async fn handle_signed_url(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    TenantScope(tenant_id): TenantScope,
) -> Result<Json<SignedUrlResponse>, AppError> {
    let signed_url = state.sessions.signed_url(id, tenant_id).await?;
    Ok(Json(SignedUrlResponse { signed_url }))
}

/// GET /api/v1/sessions/:id/result
pub async fn handle_session_result(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    TenantScope(tenant_id): TenantScope,
) -> Result<Json<SessionResult>, AppError> {
    let session = state.sessions.get_owned(id, tenant_id).await?;
    if session.status != SessionStatus::Completed {
        return Err(AppError::Validation(format!(
            "Session {id} is {} and has no result yet",
            session.status
        )));
    }
    Ok(Json(SessionResult {
        session_id: session.id,
        status: session.status,
        completed_at: session.completed_at,
        analysis: session.analysis,
        final_score: session.final_score,
    }))
}

/// GET /api/v1/tenants/:id/quota
pub async fn handle_tenant_quota(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<QuotaResponse>, AppError> {
    let quota = state
        .sessions
        .store
        .get_quota(tenant_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Tenant {tenant_id} not found")))?;
    Ok(Json(QuotaResponse {
        used: quota.used,
        limit: quota.limit,
        remaining: quota.remaining(),
    }))
}
