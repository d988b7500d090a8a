//! Port for staged OAuth handshake sessions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::HandshakeSession;

use super::define_port_error;

define_port_error! {
    /// Errors raised by handshake session adapters.
    pub enum HandshakeSessionRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "handshake session repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "handshake session repository query failed: {message}",
        /// Another session already uses the same `state`.
        DuplicateState => "handshake state already in use",
    }
}

/// Port for storing handshake sessions keyed by `state`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HandshakeSessionRepository: Send + Sync {
    /// Insert a new session; fails with `DuplicateState` on a state clash.
    async fn insert(&self, session: &HandshakeSession)
    -> Result<(), HandshakeSessionRepositoryError>;

    /// Find the session carrying `state`, expired or not.
    async fn find_by_state(
        &self,
        state: &str,
    ) -> Result<Option<HandshakeSession>, HandshakeSessionRepositoryError>;

    /// Remove the session carrying `state` and return it, expired or not.
    ///
    /// At most one caller receives a given session.
    async fn take_by_state(
        &self,
        state: &str,
    ) -> Result<Option<HandshakeSession>, HandshakeSessionRepositoryError>;

    /// Delete a session; returns whether a row was removed.
    async fn delete(&self, session_id: &Uuid) -> Result<bool, HandshakeSessionRepositoryError>;

    /// Delete every session whose `expires_at` is before `now`.
    async fn delete_expired(&self, now: DateTime<Utc>)
    -> Result<u64, HandshakeSessionRepositoryError>;
}
