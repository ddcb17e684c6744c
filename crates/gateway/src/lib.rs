//! HTTP gateway for toolchat.
//!
//! Exposes the health check and the `/llm` API: streaming chat over SSE,
//! chat titles, tool management and provider keys.
//!
//! Built on Axum.

pub mod error;
pub mod llm;

use std::sync::Arc;

use axum::{Router, http::Method, response::Json, routing::get};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use toolchat_agent::Orchestrator;
use toolchat_config::AppConfig;
use toolchat_core::provider::Provider;
use toolchat_providers::AnthropicProvider;
use toolchat_tools::ToolManager;

/// Shared application state for the gateway.
pub struct AppState {
    pub config: AppConfig,
    pub provider: Arc<dyn Provider>,
    pub tools: Arc<ToolManager>,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Wire the orchestrator to the given provider and tools.
    pub fn new(config: AppConfig, provider: Arc<dyn Provider>, tools: Arc<ToolManager>) -> Self {
        let orchestrator = Arc::new(Orchestrator::from_config(
            provider.clone(),
            tools.clone(),
            &config,
        ));
        Self {
            config,
            provider,
            tools,
            orchestrator,
        }
    }
}

pub type SharedState = Arc<AppState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .nest("/llm", llm::llm_router(state))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server and serve until Ctrl+C.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let provider: Arc<dyn Provider> = Arc::new(AnthropicProvider::from_config(&config));
    if !provider.has_api_key() {
        warn!("No API key configured; set one with PUT /llm/provider/anthropic/key");
    }

    let tools = Arc::new(ToolManager::from_config(&config.tools)?);
    if let Err(e) = tools.start().await {
        warn!(error = %e, "Some enabled tools failed to start");
    }

    let state = Arc::new(AppState::new(config, provider, tools.clone()));
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped, closing tool backends");
    tools.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
