//! Lexia Agent - Chat service behind the Léxia WhatsApp webhook.
//!
//! The webhook relay posts each inbound WhatsApp message to `/chat`; the
//! agent answers with the reply text to send back. WhatsApp may deliver the
//! same message more than once, so every provider message id is processed
//! at most once.
//!
//! ## Architecture
//!
//! ```text
//! Relay → /chat (secret check → validate → dedup) → session turn → reply backend
//!                                                          ↓
//!                                             user + assistant appended
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod chat;
pub mod dedup;
pub mod error;
pub mod reply;
pub mod routes;
pub mod session;

pub use chat::{ChatRequest, ChatResponse, ChatService};
pub use dedup::DedupGuard;
pub use error::AgentError;
pub use reply::{
    create_generator, HttpReplyGenerator, ReplyError, ReplyGenerator, ReplyRequest,
    TemplateReplyGenerator,
};
pub use routes::{build_router, AppState};
pub use session::{Message, Role, Session, SessionStore};

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use lexia_common::config::Config;
use tower_http::cors::{Any, CorsLayer};

/// Build the shared service state from configuration.
pub fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let generator = create_generator(&config.agent, config.auth.secret())?;
    let chat = ChatService::new(
        SessionStore::new(),
        DedupGuard::from_retention_secs(config.dedup.retention_secs),
        generator,
        config.auth.secret(),
    );
    Ok(AppState::new(chat))
}

/// Build the full application router with CORS.
pub fn build_app_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    build_router(state).layer(cors)
}

/// Start the agent server and run until ctrl-c or SIGTERM.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.bind_address()))?;

    let state = build_state(config)?;
    let sweeper = state
        .chat
        .dedup()
        .spawn_sweeper(Duration::from_secs(config.dedup.sweep_interval_secs.max(1)));

    tracing::info!(
        backend = state.chat.generator_name(),
        auth_enabled = state.chat.auth_enabled(),
        dedup_retention_secs = ?config.dedup.retention_secs,
        "Starting Lexia Agent on {}",
        addr
    );

    let router = build_app_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    tracing::info!("Lexia Agent stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
