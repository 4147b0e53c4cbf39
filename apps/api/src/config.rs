use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::conversation::retry::RetryPolicy;

const DEFAULT_ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io/v1/convai";

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub anthropic_api_key: String,
    pub elevenlabs_api_key: String,
    pub elevenlabs_base_url: String,
    pub retrieval_max_attempts: u32,
    pub retrieval_delay_ms: u64,
    pub pipeline_timeout_secs: u64,
    pub session_create_limit: u32,
    pub session_create_window_secs: u64,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            elevenlabs_api_key: require_env("XI_API_KEY")?,
            elevenlabs_base_url: std::env::var("ELEVENLABS_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_ELEVENLABS_BASE_URL.to_string()),
            retrieval_max_attempts: parse_env("RETRIEVAL_MAX_ATTEMPTS", 5)?,
            retrieval_delay_ms: parse_env("RETRIEVAL_DELAY_MS", 10_000)?,
            pipeline_timeout_secs: parse_env("PIPELINE_TIMEOUT_SECS", 150)?,
            session_create_limit: parse_env("SESSION_CREATE_LIMIT", 20)?,
            session_create_window_secs: parse_env("SESSION_CREATE_WINDOW_SECS", 60)?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Retry policy for polling the conversation provider.
    pub fn retrieval_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.retrieval_max_attempts,
            Duration::from_millis(self.retrieval_delay_ms),
        )
    }

    pub fn pipeline_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline_timeout_secs)
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}
