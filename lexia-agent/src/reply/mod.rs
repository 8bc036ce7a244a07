//! Reply generation backends.
//!
//! The chat handler treats reply generation as a black box: it hands over
//! the session, the user text and optional context, and gets text back.

mod remote;
mod template;

pub use remote::HttpReplyGenerator;
pub use template::TemplateReplyGenerator;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lexia_common::config::AgentConfig;

use crate::session::Message;

/// Reply generation error.
#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    #[error("Agent request failed: {0}")]
    Transport(String),

    #[error("Agent returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid agent response: {0}")]
    InvalidResponse(String),

    #[error("Agent returned an empty reply")]
    EmptyReply,
}

/// Input for a single reply.
#[derive(Debug, Clone, Copy)]
pub struct ReplyRequest<'a> {
    pub session_id: &'a str,
    pub text: &'a str,
    pub message_id: Option<&'a str>,
    /// Free-form context supplied by the caller
    pub context: Option<&'a str>,
    /// Conversation before this turn, oldest first
    pub history: &'a [Message],
}

/// A backend that turns a user message into reply text.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &'static str;

    /// Generate a reply for one user message.
    async fn generate(&self, request: ReplyRequest<'_>) -> Result<String, ReplyError>;
}

/// Pick the reply backend from configuration.
///
/// A configured `reply_endpoint` selects the remote agent; otherwise the
/// local template answers.
pub fn create_generator(
    agent: &AgentConfig,
    shared_secret: Option<&str>,
) -> anyhow::Result<Arc<dyn ReplyGenerator>> {
    match agent.reply_endpoint.as_deref() {
        Some(endpoint) => {
            let generator = HttpReplyGenerator::new(
                endpoint,
                shared_secret.map(String::from),
                Duration::from_secs(agent.reply_timeout_secs),
            )?;
            Ok(Arc::new(generator))
        }
        None => Ok(Arc::new(TemplateReplyGenerator)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_generator_defaults_to_template() {
        let generator = create_generator(&AgentConfig::default(), None).unwrap();
        assert_eq!(generator.name(), "template");
    }

    #[test]
    fn test_create_generator_with_endpoint() {
        let agent = AgentConfig {
            reply_endpoint: Some("http://127.0.0.1:9000".into()),
            ..Default::default()
        };
        let generator = create_generator(&agent, Some("s3")).unwrap();
        assert_eq!(generator.name(), "http");
    }
}
