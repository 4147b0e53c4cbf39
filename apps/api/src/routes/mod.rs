pub mod health;

use axum::{routing::get, Router};

use crate::sessions::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/api/v1/sessions",
            get(handlers::handle_list_sessions).post(handlers::handle_create_session),
        )
        .route(
            "/api/v1/sessions/:id",
            get(handlers::handle_get_session).patch(handlers::handle_update_session),
        )
        .route(
            "/api/v1/sessions/:id/signed-url",
            get(handlers::handle_signed_url),
        )
        .route(
            "/api/v1/sessions/:id/result",
            get(handlers::handle_session_result),
        )
        .route(
            "/api/v1/tenants/:id/quota",
            get(handlers::handle_tenant_quota),
        )
        .with_state(state)
}
