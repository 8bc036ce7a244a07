//! Chat request handling.
//!
//! A request moves through four steps, in this order:
//!
//! 1. shared-secret check (when configured)
//! 2. validation of `session_id` and `text`
//! 3. deduplication by provider `message_id`
//! 4. user append, reply generation, assistant append
//!
//! Step 3 records the id before any session mutation, so each provider
//! message is processed at most once. If reply generation fails the user
//! message stays in the log, the id stays recorded, and a redelivery is
//! answered as a duplicate: that message is dropped, not retried.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use lexia_common::chat_span;
use lexia_common::security::secret_matches;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::dedup::DedupGuard;
use crate::error::AgentError;
use crate::reply::{ReplyGenerator, ReplyRequest};
use crate::session::{Message, Session, SessionStore};

/// Inbound chat message, as posted by the webhook relay.
///
/// Every field is optional at the wire level; required fields are checked
/// by [`ChatService::submit`] so missing and empty values fail the same way.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    /// Provider message id, used for deduplication
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    /// Provider timestamp; informational only
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl ChatRequest {
    /// Convenience constructor for the required fields.
    pub fn new(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    fn session_id_str(&self) -> &str {
        self.session_id.as_deref().unwrap_or_default()
    }
}

/// Reply to a chat message.
///
/// An empty `reply` means the message was a duplicate; the relay must not
/// deliver anything to the end user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub reply: String,
    pub timestamp: DateTime<Utc>,
    pub message_id: Option<String>,
}

impl ChatResponse {
    pub fn is_duplicate(&self) -> bool {
        self.reply.is_empty()
    }
}

/// Request handler composing the session store, dedup guard and reply backend.
#[derive(Clone)]
pub struct ChatService {
    sessions: SessionStore,
    dedup: DedupGuard,
    generator: Arc<dyn ReplyGenerator>,
    shared_secret: Option<Arc<str>>,
}

impl ChatService {
    pub fn new(
        sessions: SessionStore,
        dedup: DedupGuard,
        generator: Arc<dyn ReplyGenerator>,
        shared_secret: Option<&str>,
    ) -> Self {
        Self {
            sessions,
            dedup,
            generator,
            shared_secret: shared_secret.filter(|s| !s.is_empty()).map(Arc::from),
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn dedup(&self) -> &DedupGuard {
        &self.dedup
    }

    pub fn generator_name(&self) -> &'static str {
        self.generator.name()
    }

    pub fn auth_enabled(&self) -> bool {
        self.shared_secret.is_some()
    }

    /// Check the presented shared secret.
    pub fn authorize(&self, presented: Option<&str>) -> Result<(), AgentError> {
        if secret_matches(self.shared_secret.as_deref(), presented) {
            Ok(())
        } else {
            Err(AgentError::Unauthorized)
        }
    }

    /// Full request path for a raw JSON body: auth, parse, then [`Self::submit`].
    pub async fn handle_chat(
        &self,
        trace_id: &str,
        presented_secret: Option<&str>,
        body: &[u8],
    ) -> Result<ChatResponse, AgentError> {
        if let Err(e) = self.authorize(presented_secret) {
            tracing::warn!(trace_id = %trace_id, "Rejected chat request: shared secret mismatch");
            return Err(e);
        }

        let request = serde_json::from_slice::<ChatRequest>(body).map_err(|e| {
            tracing::warn!(trace_id = %trace_id, error = %e, "Rejected chat request: malformed body");
            AgentError::InvalidRequest(format!("malformed JSON body: {e}"))
        })?;

        let span = chat_span!(trace_id, request.session_id_str(), request.message_id);
        self.submit(request).instrument(span).await
    }

    /// Process an already-authorized request.
    pub async fn submit(&self, request: ChatRequest) -> Result<ChatResponse, AgentError> {
        let (session_id, text) = match validate(&request) {
            Ok(fields) => fields,
            Err(e) => {
                tracing::warn!(
                    session_id = ?request.session_id,
                    message_id = ?request.message_id,
                    error = %e,
                    "Rejected chat request"
                );
                return Err(e);
            }
        };
        let message_id = request.message_id.clone();

        if self.dedup.is_duplicate(message_id.as_deref()) {
            tracing::info!(
                session_id = %session_id,
                message_id = ?message_id,
                "Duplicate message suppressed"
            );
            return Ok(ChatResponse {
                session_id: session_id.to_string(),
                reply: String::new(),
                timestamp: Utc::now(),
                message_id,
            });
        }

        let mut turn = self.sessions.begin_turn(session_id).await;
        turn.append_message(Message::user(text, message_id.clone()));

        tracing::info!(
            session_id = %session_id,
            message_id = ?message_id,
            user_id = ?request.user_id,
            backend = self.generator.name(),
            "Processing message"
        );

        let messages = turn.messages();
        let reply_request = ReplyRequest {
            session_id,
            text,
            message_id: message_id.as_deref(),
            context: request.context.as_deref().filter(|c| !c.trim().is_empty()),
            history: &messages[..messages.len() - 1],
        };

        let reply = match self.generator.generate(reply_request).await {
            Ok(reply) if !reply.trim().is_empty() => reply,
            Ok(_) => {
                tracing::error!(
                    session_id = %session_id,
                    message_id = ?message_id,
                    "Reply generator returned an empty reply; message dropped"
                );
                return Err(AgentError::ReplyGeneration("empty reply".into()));
            }
            Err(e) => {
                tracing::error!(
                    session_id = %session_id,
                    message_id = ?message_id,
                    error = %e,
                    "Reply generation failed; message dropped"
                );
                return Err(e.into());
            }
        };

        let assistant = Message::assistant(reply, message_id.clone());
        let timestamp = assistant.timestamp;
        let reply = assistant.content.clone();
        let log_len = turn.append_message(assistant);

        tracing::debug!(session_id = %session_id, log_len, "Reply recorded");

        Ok(ChatResponse {
            session_id: session_id.to_string(),
            reply,
            timestamp,
            message_id,
        })
    }

    /// Debug read of a session log.
    ///
    /// Blocks while a turn on the same session is generating its reply, for
    /// at most the reply backend timeout.
    pub async fn session(&self, session_id: &str) -> Result<Session, AgentError> {
        self.sessions.get(session_id).await.ok_or_else(|| {
            tracing::warn!(session_id = %session_id, "Session lookup for unknown id");
            AgentError::SessionNotFound(session_id.to_string())
        })
    }
}

/// Extract the required fields, rejecting missing or empty values.
fn validate(request: &ChatRequest) -> Result<(&str, &str), AgentError> {
    let session_id = request.session_id.as_deref().filter(|s| !s.is_empty());
    let text = request.text.as_deref().filter(|t| !t.is_empty());

    match (session_id, text) {
        (Some(session_id), Some(text)) => Ok((session_id, text)),
        _ => Err(AgentError::InvalidRequest(
            "session_id and text are required".into(),
        )),
    }
}
