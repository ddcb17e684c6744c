//! `/llm` routes: streaming chat, titles, tool management, provider keys.
//!
//! Endpoints:
//!
//! - `POST /llm/chat?model=<id>`: run the orchestration loop, SSE
//! - `POST /llm/chat/title`: short title for a new chat
//! - `GET  /llm/tools`: list tools
//! - `PUT  /llm/tools`: replace the tool catalog
//! - `PUT  /llm/tool/{id}/enable`: enable a tool
//! - `PUT  /llm/tool/{id}/disable`: disable a tool
//! - `PUT  /llm/tool/{id}/args`: set launch arguments
//! - `PUT  /llm/tool/{id}/env`: set backend environment
//! - `GET  /llm/providers`: providers and models
//! - `PUT  /llm/provider/{provider}/key`: set a provider API key

use std::collections::BTreeMap;
use std::convert::Infallible;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use toolchat_core::message::Conversation;
use toolchat_core::provider::{ModelInfo, Provider};
use toolchat_core::tool::Tool;
use tracing::{info, warn};

use crate::SharedState;
use crate::error::ApiError;

pub fn llm_router(state: SharedState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/chat/title", post(title_handler))
        .route("/tools", get(list_tools_handler).put(replace_tools_handler))
        .route("/tool/{id}/enable", put(enable_tool_handler))
        .route("/tool/{id}/disable", put(disable_tool_handler))
        .route("/tool/{id}/args", put(tool_args_handler))
        .route("/tool/{id}/env", put(tool_env_handler))
        .route("/providers", get(list_providers_handler))
        .route("/provider/{provider}/key", put(provider_key_handler))
        .with_state(state)
}

// ── Chat ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Conversation,
    /// Ids of the tools the model may use in this run.
    #[serde(default)]
    pub tools: Vec<String>,
}

/// `POST /llm/chat?model=<id>`: stream one orchestration run as SSE.
///
/// Each frame's `data` is one JSON-encoded `StreamEvent`. The stream closes
/// when the run ends; a client disconnect cancels the run.
async fn chat_handler(
    State(state): State<SharedState>,
    Query(query): Query<ChatQuery>,
    Json(payload): Json<ChatRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let model = query
        .model
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Model is required".into()))?;

    state.orchestrator.validate(&model, &payload.messages)?;

    let messages = payload.messages.len();
    let handle = state.orchestrator.clone().spawn(
        model.clone(),
        payload.messages,
        payload.tools,
        state.config.agent.event_buffer,
    );
    info!(run_id = %handle.run_id, model = %model, messages, "Chat stream started");

    // Dropping the response stream cancels the run.
    let guard = handle.cancel.drop_guard();
    let stream = ReceiverStream::new(handle.events).map(move |event| {
        let _ = &guard;
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Deserialize)]
pub struct TitleRequest {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TitleResponse {
    pub title: String,
}

/// `POST /llm/chat/title`
async fn title_handler(
    State(state): State<SharedState>,
    Json(payload): Json<TitleRequest>,
) -> Result<Json<TitleResponse>, ApiError> {
    if payload.message.trim().is_empty() {
        return Err(ApiError::BadRequest("Message is required".into()));
    }

    let title = toolchat_agent::generate_title(
        state.provider.as_ref(),
        &state.config.title.model,
        &payload.message,
        state.config.title.max_tokens,
    )
    .await?;

    Ok(Json(TitleResponse { title }))
}

// ── Tools ─────────────────────────────────────────────────────────────────

/// `GET /llm/tools`
async fn list_tools_handler(State(state): State<SharedState>) -> Json<Vec<Tool>> {
    Json(state.tools.list().await)
}

#[derive(Debug, Deserialize)]
pub struct ReplaceToolsRequest {
    pub tools: Vec<Tool>,
}

/// `PUT /llm/tools`
async fn replace_tools_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ReplaceToolsRequest>,
) -> Result<Json<Vec<Tool>>, ApiError> {
    info!(count = payload.tools.len(), "Replacing tool catalog");
    Ok(Json(state.tools.replace_all(payload.tools).await?))
}

async fn enable_tool_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Tool>, ApiError> {
    Ok(Json(state.tools.set_enabled(&id, true).await?))
}

async fn disable_tool_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Tool>, ApiError> {
    Ok(Json(state.tools.set_enabled(&id, false).await?))
}

#[derive(Debug, Deserialize)]
pub struct ToolArgsRequest {
    pub args: Option<Vec<String>>,
}

async fn tool_args_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<ToolArgsRequest>,
) -> Result<Json<Tool>, ApiError> {
    Ok(Json(state.tools.set_args(&id, payload.args).await?))
}

#[derive(Debug, Deserialize)]
pub struct ToolEnvRequest {
    pub env: BTreeMap<String, String>,
}

async fn tool_env_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<ToolEnvRequest>,
) -> Result<Json<Tool>, ApiError> {
    Ok(Json(state.tools.set_env(&id, payload.env).await?))
}

// ── Providers ─────────────────────────────────────────────────────────────

/// A provider as shown to clients. The API key itself is never returned.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    pub id: String,
    pub name: String,
    pub icon_url: String,
    pub has_api_key: bool,
    pub models: Vec<ModelInfo>,
}

fn provider_info(provider: &dyn Provider) -> ProviderInfo {
    let (name, icon_url) = match provider.name() {
        "anthropic" => ("Anthropic", "https://anthropic.com/favicon.ico"),
        other => (other, ""),
    };
    ProviderInfo {
        id: provider.name().to_string(),
        name: name.to_string(),
        icon_url: icon_url.to_string(),
        has_api_key: provider.has_api_key(),
        models: provider.models(),
    }
}

/// `GET /llm/providers`
async fn list_providers_handler(State(state): State<SharedState>) -> Json<Vec<ProviderInfo>> {
    Json(vec![provider_info(state.provider.as_ref())])
}

#[derive(Debug, Deserialize)]
pub struct ProviderKeyRequest {
    pub key: String,
}

/// `PUT /llm/provider/{provider}/key`
async fn provider_key_handler(
    State(state): State<SharedState>,
    Path(provider): Path<String>,
    Json(payload): Json<ProviderKeyRequest>,
) -> Result<(StatusCode, Json<ProviderInfo>), ApiError> {
    if provider != state.provider.name() {
        return Err(ApiError::NotFound(format!("Provider not found: {provider}")));
    }
    if payload.key.trim().is_empty() {
        warn!(provider = %provider, "Clearing provider API key");
    }

    state.provider.set_api_key(&payload.key)?;
    info!(provider = %provider, "Provider API key updated");
    Ok((StatusCode::OK, Json(provider_info(state.provider.as_ref()))))
}
