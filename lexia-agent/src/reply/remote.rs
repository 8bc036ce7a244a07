//! Remote agent reply backend.
//!
//! Forwards each turn to an agent service speaking the same `/chat` contract
//! as this crate: `{session_id, text, message_id, context}` in, `{reply}` out.

use std::time::Duration;

use async_trait::async_trait;
use lexia_common::config::AuthConfig;
use reqwest::Client;
use serde::Serialize;

use super::{ReplyError, ReplyGenerator, ReplyRequest};
use crate::session::Message;

/// Most recent history entries flattened into the context string.
const MAX_CONTEXT_MESSAGES: usize = 20;

#[derive(Debug, Serialize)]
struct RemoteChatRequest<'a> {
    session_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<String>,
}

/// Reply generator backed by a remote agent over HTTP.
pub struct HttpReplyGenerator {
    endpoint: String,
    shared_secret: Option<String>,
    client: Client,
}

impl HttpReplyGenerator {
    /// Create a generator posting to `{endpoint}/chat`.
    pub fn new(
        endpoint: &str,
        shared_secret: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            shared_secret: shared_secret.filter(|s| !s.is_empty()),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Flatten the tail of a conversation into `USER: ...` / `AGENT: ...` lines.
fn history_context(history: &[Message]) -> Option<String> {
    if history.is_empty() {
        return None;
    }

    let start = history.len().saturating_sub(MAX_CONTEXT_MESSAGES);
    let lines: Vec<String> = history[start..]
        .iter()
        .map(|m| format!("{}: {}", m.role.label(), m.content))
        .collect();

    Some(lines.join("\n"))
}

#[async_trait]
impl ReplyGenerator for HttpReplyGenerator {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn generate(&self, request: ReplyRequest<'_>) -> Result<String, ReplyError> {
        let context = request
            .context
            .map(String::from)
            .or_else(|| history_context(request.history));

        let payload = RemoteChatRequest {
            session_id: request.session_id,
            text: request.text,
            message_id: request.message_id,
            context,
        };

        let url = format!("{}/chat", self.endpoint);
        let mut builder = self.client.post(&url).json(&payload);
        if let Some(ref secret) = self.shared_secret {
            builder = builder.header(AuthConfig::HEADER, secret);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::error!(error = %e, url = %url, "Failed to reach remote agent");
            ReplyError::Transport(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Remote agent returned error");
            return Err(ReplyError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ReplyError::InvalidResponse(e.to_string()))?;

        let reply = body
            .get("reply")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ReplyError::InvalidResponse("missing string field 'reply'".into()))?
            .trim();

        if reply.is_empty() {
            return Err(ReplyError::EmptyReply);
        }

        Ok(reply.to_string())
    }
}
