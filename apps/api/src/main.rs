mod analysis;
mod config;
mod conversation;
mod db;
mod errors;
mod llm_client;
mod models;
mod rate_limit;
mod routes;
mod sessions;
mod state;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::analysis::judge::LlmJudge;
use crate::config::Config;
use crate::conversation::ElevenLabsClient;
use crate::db::create_pool;
use crate::llm_client::LlmClient;
use crate::rate_limit::RedisRateLimiter;
use crate::routes::build_router;
use crate::sessions::artifacts::S3AudioStore;
use crate::sessions::lifecycle::SessionManager;
use crate::sessions::store::PgSessionStore;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Intervue API v{}", env!("CARGO_PKG_VERSION"));

    // PostgreSQL (migrations run on connect)
    let db = create_pool(&config.database_url).await?;

    let redis = redis::Client::open(config.redis_url.clone())?;
    info!("Redis client initialized");

    let s3 = build_s3_client(&config).await;
    info!("S3 client initialized (bucket: {})", config.s3_bucket);

    let llm = LlmClient::new(config.anthropic_api_key.clone());
    info!("LLM judge initialized (model: {})", llm_client::MODEL);

    let provider = ElevenLabsClient::new(
        config.elevenlabs_api_key.clone(),
        config.elevenlabs_base_url.clone(),
    );

    let sessions = SessionManager {
        store: Arc::new(PgSessionStore::new(db)),
        provider: Arc::new(provider),
        judge: Arc::new(LlmJudge(llm)),
        audio: Arc::new(S3AudioStore::new(s3, config.s3_bucket.clone())),
        retrieval: config.retrieval_policy(),
        pipeline_timeout: config.pipeline_timeout(),
    };
    info!(
        "Conversation retrieval: {} attempts, {}ms apart, {}s pipeline budget",
        config.retrieval_max_attempts, config.retrieval_delay_ms, config.pipeline_timeout_secs
    );

    let state = AppState {
        sessions,
        rate_limiter: Arc::new(RedisRateLimiter::new(
            redis,
            config.session_create_limit,
            Duration::from_secs(config.session_create_window_secs),
        )),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the web client's domain is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "intervue-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
