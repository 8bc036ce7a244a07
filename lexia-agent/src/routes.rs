//! HTTP routes for the agent service.
//!
//! - `GET  /`                     service info
//! - `GET  /health`               liveness
//! - `POST /chat`                 process one inbound message
//! - `GET  /sessions/:session_id` debug read of a session log

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use lexia_common::config::AuthConfig;
use lexia_common::logging::RequestContext;
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;

use crate::chat::{ChatResponse, ChatService};
use crate::error::AgentError;
use crate::session::Session;

/// Service name reported by `/` and used for request contexts.
pub const SERVICE_NAME: &str = "lexia-agent";

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

// ============================================================================
// State
// ============================================================================

/// Shared state for the agent HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub chat: ChatService,
}

impl AppState {
    pub fn new(chat: ChatService) -> Self {
        Self { chat }
    }
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EndpointList {
    pub health: String,
    pub chat: String,
    pub sessions: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
    pub status: String,
    pub endpoints: EndpointList,
}

// ============================================================================
// Handlers
// ============================================================================

async fn root() -> impl IntoResponse {
    Json(ServiceInfo {
        service: SERVICE_NAME.into(),
        version: env!("CARGO_PKG_VERSION").into(),
        status: "running".into(),
        endpoints: EndpointList {
            health: "/health".into(),
            chat: "/chat".into(),
            sessions: "/sessions/{session_id}".into(),
        },
    })
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".into(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

fn presented_secret(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AuthConfig::HEADER)
        .and_then(|v| v.to_str().ok())
}

/// POST /chat
///
/// The body is taken raw so the shared secret is checked before the payload
/// is interpreted.
async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ChatResponse>, AgentError> {
    let ctx = RequestContext::from_headers(&headers, SERVICE_NAME);
    let response = state
        .chat
        .handle_chat(&ctx.trace_id, presented_secret(&headers), &body)
        .await?;
    Ok(Json(response))
}

/// GET /sessions/:session_id
async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Session>, AgentError> {
    if let Err(e) = state.chat.authorize(presented_secret(&headers)) {
        tracing::warn!(session_id = %session_id, "Rejected session read: shared secret mismatch");
        return Err(e);
    }
    let session = state.chat.session(&session_id).await?;
    Ok(Json(session))
}

// ============================================================================
// Router Builder
// ============================================================================

/// Build the agent HTTP router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/sessions/:session_id", get(get_session))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}
