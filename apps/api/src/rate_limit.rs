//! Fixed-window rate limiting keyed by identity, shared across instances through Redis.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after_secs: u64 },
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Counts one hit for `identity` within `scope` and reports whether it is allowed.
    async fn check(&self, scope: &str, identity: &str) -> Result<RateDecision, RateLimitError>;
}

#[derive(Clone)]
pub struct RedisRateLimiter {
    client: redis::Client,
    limit: u32,
    window: Duration,
}

impl RedisRateLimiter {
    pub fn new(client: redis::Client, limit: u32, window: Duration) -> Self {
        Self {
            client,
            limit,
            window: window.max(Duration::from_secs(1)),
        }
    }
}

/// Key for the window that contains `now_secs`. Each window gets its own key, so a key
/// never needs resetting; it only has to expire.
pub fn window_key(scope: &str, identity: &str, now_secs: u64, window_secs: u64) -> String {
    format!("ratelimit:{scope}:{identity}:{}", now_secs / window_secs.max(1))
}

pub fn decide(count: u64, limit: u32, now_secs: u64, window_secs: u64) -> RateDecision {
    let window_secs = window_secs.max(1);
    if count <= u64::from(limit) {
        RateDecision::Allowed {
            remaining: (u64::from(limit) - count) as u32,
        }
    } else {
        RateDecision::Limited {
            retry_after_secs: window_secs - now_secs % window_secs,
        }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(&self, scope: &str, identity: &str) -> Result<RateDecision, RateLimitError> {
        let now_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let window_secs = self.window.as_secs();
        let key = window_key(scope, identity, now_secs, window_secs);

        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .incr(&key, 1u64)
            .expire(&key, window_secs as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;

        let decision = decide(count, self.limit, now_secs, window_secs);
        if let RateDecision::Limited { .. } = decision {
            warn!("Rate limit hit for {scope}:{identity} ({count} in window)");
        }
        Ok(decision)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_key_changes_at_window_boundary() {
        let a = window_key("session-create", "t1", 119, 60);
        let b = window_key("session-create", "t1", 120, 60);
        assert_eq!(a, "ratelimit:session-create:t1:1");
        assert_eq!(b, "ratelimit:session-create:t1:2");
    }

    #[test]
    fn test_decide_allows_up_to_limit() {
        assert_eq!(decide(1, 3, 0, 60), RateDecision::Allowed { remaining: 2 });
        assert_eq!(decide(3, 3, 0, 60), RateDecision::Allowed { remaining: 0 });
    }

    #[test]
    fn test_decide_limits_past_limit_until_window_end() {
        assert_eq!(
            decide(4, 3, 130, 60),
            RateDecision::Limited {
                retry_after_secs: 50
            }
        );
    }
}
