//! EcoloBrick chat backend
//!
//! Serves the EcoloBot widget: canned answers for known topics, Gemini for
//! everything else.

mod api;
mod chat;
mod llm;
mod session;

use api::{create_router, AppState};
use chat::ChatResponder;
use llm::LlmConfig;
use session::{SessionLimits, SessionStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ecolobrick=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let port: u16 = std::env::var("ECOLOBRICK_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);

    // Generation service; a missing key only shows up when a call fails
    let llm_config = LlmConfig::from_env();
    let responder = ChatResponder::new(llm_config.build_service()?);
    tracing::info!(
        model = %responder.model_id(),
        gateway = llm_config.gateway.is_some(),
        timeout_secs = llm_config.timeout.as_secs(),
        "Generation service configured"
    );

    let limits = SessionLimits::from_env();
    tracing::info!(
        idle_ttl_secs = limits.idle_ttl.as_secs(),
        max_sessions = limits.max_sessions,
        "Session limits configured"
    );
    let sessions = Arc::new(SessionStore::with_limits(responder, limits));
    let _sweeper = SessionStore::spawn_sweeper(&sessions);
    let state = AppState::new(sessions);

    // The widget is served from a different origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new().gzip(true).br(true);

    let app = create_router(state)
        .layer(cors)
        .layer(compression)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("EcoloBrick chat server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
