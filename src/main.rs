//! Contest engine — entry point.
//!
//! Starts the background scheduler that closes elapsed contests and
//! distributes prizes, and exposes a small Axum REST API for activity
//! ingestion and admin recovery.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use reqwest::Client;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use contest_engine::api;
use contest_engine::config::Config;
use contest_engine::db;
use contest_engine::scheduler::{self, SchedulerState};
use contest_engine::sender::{HttpChainTransfer, HttpGiftSender};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    // Load config from environment.
    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    // One HTTP client shared by both delivery boundaries; its timeout
    // bounds every external send call.
    let client = Client::builder()
        .timeout(std::time::Duration::from_secs(config.send_timeout_secs))
        .build()?;

    let gifts = HttpGiftSender::new(client.clone(), config.gift_api_url.clone());
    let chain = HttpChainTransfer::new(client, config.chain_api_url.clone());

    // ─── Background scheduler ─────────────────────────────
    let engine = Arc::new(SchedulerState {
        pool: pool.clone(),
        config: config.clone(),
        gifts,
        chain,
    });
    let scheduler_handle = scheduler::start(engine.clone());

    // ─── REST API ─────────────────────────────────────────
    let api_state = Arc::new(api::ApiState { engine });

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/contests/:id/activity", post(api::post_activity))
        .route("/contests/:id/boost", post(api::post_boost))
        .route("/contests/:id/leaderboard", get(api::get_leaderboard))
        .route(
            "/contests/:id/position/:participant_id",
            get(api::get_position),
        )
        .route("/scheduler/tick", post(api::post_tick))
        .route("/distributions/:id/retry", post(api::post_retry))
        .route("/pool/:gift_id", get(api::get_pool))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(api_state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The scheduler is stopped explicitly so an in-flight tick finishes
    // before the process exits.
    scheduler_handle.stop().await;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
