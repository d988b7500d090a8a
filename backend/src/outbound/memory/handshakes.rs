//! In-memory handshake session repository.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::HandshakeSession;
use crate::domain::ports::{HandshakeSessionRepository, HandshakeSessionRepositoryError};

use super::lock;

/// Handshake sessions keyed by session id, with a unique `state`.
#[derive(Debug, Default)]
pub struct InMemoryHandshakeSessionRepository {
    sessions: Mutex<HashMap<Uuid, HandshakeSession>>,
}

impl InMemoryHandshakeSessionRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions, expired ones included.
    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// Whether no sessions are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl HandshakeSessionRepository for InMemoryHandshakeSessionRepository {
    async fn insert(
        &self,
        session: &HandshakeSession,
    ) -> Result<(), HandshakeSessionRepositoryError> {
        let mut sessions = lock(&self.sessions);
        if sessions.values().any(|existing| existing.state == session.state) {
            return Err(HandshakeSessionRepositoryError::duplicate_state());
        }
        sessions.insert(session.session_id, session.clone());
        Ok(())
    }

    async fn find_by_state(
        &self,
        state: &str,
    ) -> Result<Option<HandshakeSession>, HandshakeSessionRepositoryError> {
        Ok(lock(&self.sessions)
            .values()
            .find(|session| session.state == state)
            .cloned())
    }

    async fn take_by_state(
        &self,
        state: &str,
    ) -> Result<Option<HandshakeSession>, HandshakeSessionRepositoryError> {
        let mut sessions = lock(&self.sessions);
        let session_id = sessions
            .values()
            .find(|session| session.state == state)
            .map(|session| session.session_id);
        Ok(session_id.and_then(|id| sessions.remove(&id)))
    }

    async fn delete(&self, session_id: &Uuid) -> Result<bool, HandshakeSessionRepositoryError> {
        Ok(lock(&self.sessions).remove(session_id).is_some())
    }

    async fn delete_expired(
        &self,
        now: DateTime<Utc>,
    ) -> Result<u64, HandshakeSessionRepositoryError> {
        let mut sessions = lock(&self.sessions);
        let before = sessions.len();
        sessions.retain(|_, session| session.expires_at >= now);
        Ok(u64::try_from(before - sessions.len()).unwrap_or(u64::MAX))
    }
}
