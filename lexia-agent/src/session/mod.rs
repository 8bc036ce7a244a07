//! Conversation sessions.

mod store;

pub use store::{SessionStore, SessionTurn};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Prefix used when flattening history into a text context.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Assistant => "AGENT",
        }
    }
}

/// A single entry in a session log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Provider message id that triggered this entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl Message {
    /// A message sent by the end user.
    pub fn user(content: impl Into<String>, message_id: Option<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            message_id,
        }
    }

    /// A reply produced by the agent.
    pub fn assistant(content: impl Into<String>, message_id: Option<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            message_id,
        }
    }
}

/// Conversation state for one session id.
///
/// The message log is append-only; entries are never edited or removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    messages: Vec<Message>,
}

impl Session {
    /// Create an empty session.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
            messages: Vec::new(),
        }
    }

    /// Messages in append order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub(crate) fn push(&mut self, message: Message) -> usize {
        self.messages.push(message);
        self.messages.len()
    }
}
