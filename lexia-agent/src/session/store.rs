//! In-memory session store.
//!
//! Sessions are created lazily and live for the whole process. Each session
//! sits behind its own async mutex, so turns on one session are serialized
//! while different sessions proceed in parallel.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{Message, Session};
use crate::error::AgentError;

type SessionCell = Arc<Mutex<Session>>;

/// Session store shared by all request handlers.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, SessionCell>>,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the session cell for `session_id`, creating an empty session on first use.
    ///
    /// Creation goes through the map entry, so concurrent callers with the
    /// same id always end up with the same cell.
    fn get_or_create(&self, session_id: &str) -> SessionCell {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(session_id = %session_id, "Creating session");
                Arc::new(Mutex::new(Session::new(session_id)))
            })
            .value()
            .clone()
    }

    /// Get or create a session and return a snapshot of it.
    pub async fn get_or_create_session(&self, session_id: &str) -> Session {
        let cell = self.get_or_create(session_id);
        let session = cell.lock().await;
        session.clone()
    }

    /// Get or create a session and take exclusive access to it.
    ///
    /// The returned turn holds the session lock until dropped.
    pub async fn begin_turn(&self, session_id: &str) -> SessionTurn {
        let cell = self.get_or_create(session_id);
        SessionTurn {
            session: cell.lock_owned().await,
        }
    }

    /// Append a message to an existing session. Returns the new log length.
    pub async fn append_message(
        &self,
        session_id: &str,
        message: Message,
    ) -> Result<usize, AgentError> {
        let cell = self
            .sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AgentError::SessionNotFound(session_id.to_string()))?;

        let mut session = cell.lock().await;
        Ok(session.push(message))
    }

    /// Snapshot of a session, if it exists.
    ///
    /// Waits for any turn in progress on that session, so the snapshot never
    /// shows a user message without its reply while one is being generated.
    pub async fn get(&self, session_id: &str) -> Option<Session> {
        let cell = self.sessions.get(session_id).map(|e| e.value().clone())?;
        let session = cell.lock().await;
        Some(session.clone())
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Exclusive access to one session for the duration of a request.
#[derive(Debug)]
pub struct SessionTurn {
    session: OwnedMutexGuard<Session>,
}

impl SessionTurn {
    pub fn session_id(&self) -> &str {
        &self.session.id
    }

    /// Messages in append order.
    pub fn messages(&self) -> &[Message] {
        self.session.messages()
    }

    /// Append a message. Returns the new log length.
    pub fn append_message(&mut self, message: Message) -> usize {
        self.session.push(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;

    #[tokio::test]
    async fn test_get_or_create_is_lazy() {
        let store = SessionStore::new();
        assert!(store.get("wa_1").await.is_none());

        let session = store.get_or_create_session("wa_1").await;
        assert_eq!(session.id, "wa_1");
        assert!(session.is_empty());
        assert!(store.contains("wa_1"));
    }

    #[tokio::test]
    async fn test_get_or_create_returns_existing() {
        let store = SessionStore::new();
        let first = store.get_or_create_session("wa_1").await;
        store
            .append_message("wa_1", Message::user("Olá", None))
            .await
            .unwrap();

        let second = store.get_or_create_session("wa_1").await;
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_append_requires_session() {
        let store = SessionStore::new();
        let err = store
            .append_message("missing", Message::user("hi", None))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::SessionNotFound(id) if id == "missing"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_turn_appends_in_order() {
        let store = SessionStore::new();
        {
            let mut turn = store.begin_turn("wa_1").await;
            assert_eq!(turn.session_id(), "wa_1");
            turn.append_message(Message::user("Olá", Some("m1".into())));
            turn.append_message(Message::assistant("Oi", Some("m1".into())));
            assert_eq!(turn.messages().len(), 2);
        }

        let session = store.get("wa_1").await.unwrap();
        let roles: Vec<Role> = session.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn test_get_waits_for_turn_in_progress() {
        let store = SessionStore::new();
        let mut turn = store.begin_turn("wa_1").await;
        turn.append_message(Message::user("Olá", None));

        let pending =
            tokio::time::timeout(std::time::Duration::from_millis(20), store.get("wa_1")).await;
        assert!(pending.is_err());

        turn.append_message(Message::assistant("Oi", None));
        drop(turn);

        assert_eq!(store.get("wa_1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_creation_yields_one_session() {
        let store = SessionStore::new();
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .begin_turn("wa_shared")
                    .await
                    .append_message(Message::user(format!("msg {i}"), None));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("wa_shared").await.unwrap().len(), 32);
    }

    #[tokio::test]
    async fn test_turns_on_same_session_are_serialized() {
        let store = SessionStore::new();
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut turn = store.begin_turn("wa_1").await;
                turn.append_message(Message::user(format!("q{i}"), None));
                tokio::task::yield_now().await;
                turn.append_message(Message::assistant(format!("a{i}"), None));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let session = store.get("wa_1").await.unwrap();
        assert_eq!(session.len(), 32);
        for pair in session.messages().chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
            assert_eq!(pair[0].content[1..], pair[1].content[1..]);
        }
    }
}
