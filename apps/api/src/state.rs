use std::sync::Arc;

use crate::rate_limit::RateLimiter;
use crate::sessions::lifecycle::SessionManager;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionManager,
    /// Throttles session creation per tenant.
    pub rate_limiter: Arc<dyn RateLimiter>,
}
