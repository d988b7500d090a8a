//! Single-use, time-boxed storage of staged authorization handshakes.

use std::sync::Arc;

use chrono::TimeDelta;
use mockable::Clock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::ports::{HandshakeSessionRepository, HandshakeSessionRepositoryError};
use crate::domain::{AccountId, Error};

use super::{
    HandshakeSession, HandshakeTicket, HandshakeTokenSource, OsRngTokenSource, pkce_challenge,
};

/// Handshake store configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeConfig {
    /// Lifetime of a session from `begin`.
    pub session_ttl: TimeDelta,
    /// Attempts at inserting a session before a state clash is an error.
    pub max_insert_attempts: u32,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            session_ttl: TimeDelta::hours(1),
            max_insert_attempts: 3,
        }
    }
}

fn map_session_error(error: HandshakeSessionRepositoryError) -> Error {
    Error::storage_unavailable(error.to_string())
}

/// Persists OAuth staged-authorization sessions keyed by `state`.
///
/// Unknown, expired, and already-completed `state` values all resolve to
/// `NotFound`, so the caller cannot tell them apart.
#[derive(Clone)]
pub struct AuthHandshakeStore {
    sessions: Arc<dyn HandshakeSessionRepository>,
    tokens: Arc<dyn HandshakeTokenSource>,
    clock: Arc<dyn Clock>,
    config: HandshakeConfig,
}

impl AuthHandshakeStore {
    /// Create a store drawing randomness from the OS RNG.
    pub fn new(
        sessions: Arc<dyn HandshakeSessionRepository>,
        clock: Arc<dyn Clock>,
        config: HandshakeConfig,
    ) -> Self {
        Self::with_token_source(sessions, Arc::new(OsRngTokenSource), clock, config)
    }

    /// Create a store with an explicit token source.
    pub fn with_token_source(
        sessions: Arc<dyn HandshakeSessionRepository>,
        tokens: Arc<dyn HandshakeTokenSource>,
        clock: Arc<dyn Clock>,
        config: HandshakeConfig,
    ) -> Self {
        Self {
            sessions,
            tokens,
            clock,
            config,
        }
    }

    /// Start a handshake for `account`.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` when the session cannot be persisted, including
    /// when every insert attempt clashed on `state`.
    pub async fn begin(&self, account: &AccountId) -> Result<HandshakeTicket, Error> {
        let attempts = self.config.max_insert_attempts.max(1);
        for attempt in 1..=attempts {
            let now = self.clock.utc();
            let session = HandshakeSession {
                session_id: Uuid::new_v4(),
                state: self.tokens.state(),
                code_verifier: self.tokens.code_verifier(),
                account: account.clone(),
                created_at: now,
                expires_at: now + self.config.session_ttl,
            };
            match self.sessions.insert(&session).await {
                Ok(()) => {
                    info!(
                        account = %account,
                        session_id = %session.session_id,
                        "handshake session created"
                    );
                    return Ok(HandshakeTicket {
                        session_id: session.session_id,
                        code_challenge: pkce_challenge(&session.code_verifier),
                        state: session.state,
                        code_verifier: session.code_verifier,
                        expires_at: session.expires_at,
                    });
                }
                Err(HandshakeSessionRepositoryError::DuplicateState) => {
                    warn!(attempt, "handshake state clashed; regenerating");
                }
                Err(error) => return Err(map_session_error(error)),
            }
        }
        Err(Error::storage_unavailable(
            "could not allocate a unique handshake state",
        ))
    }

    /// Look up the live session carrying `state`.
    ///
    /// # Errors
    ///
    /// - `NotFound` when no live session carries `state`.
    /// - `StorageUnavailable` when the lookup fails.
    pub async fn resolve(&self, state: &str) -> Result<HandshakeSession, Error> {
        let found = self
            .sessions
            .find_by_state(state)
            .await
            .map_err(map_session_error)?;
        let Some(session) = found else {
            return Err(Error::not_found("handshake session not found"));
        };

        if session.is_expired_at(self.clock.utc()) {
            if let Err(error) = self.sessions.delete(&session.session_id).await {
                debug!(error = %error, "failed to drop expired handshake session");
            }
            return Err(Error::not_found("handshake session not found"));
        }
        Ok(session)
    }

    /// Remove and return the live session carrying `state`.
    ///
    /// The session is gone once this returns, so a second call with the same
    /// `state` fails even when the first caller never finishes.
    ///
    /// # Errors
    ///
    /// - `NotFound` when no live session carries `state`.
    /// - `StorageUnavailable` when the removal fails.
    pub async fn consume(&self, state: &str) -> Result<HandshakeSession, Error> {
        let taken = self
            .sessions
            .take_by_state(state)
            .await
            .map_err(map_session_error)?;
        match taken {
            Some(session) if !session.is_expired_at(self.clock.utc()) => {
                debug!(session_id = %session.session_id, "handshake session consumed");
                Ok(session)
            }
            Some(_) | None => Err(Error::not_found("handshake session not found")),
        }
    }

    /// Remove a session. Completing an unknown session is not an error.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` when the delete fails.
    pub async fn complete(&self, session_id: &Uuid) -> Result<(), Error> {
        let removed = self
            .sessions
            .delete(session_id)
            .await
            .map_err(map_session_error)?;
        debug!(session_id = %session_id, removed, "handshake session completed");
        Ok(())
    }

    /// Delete every expired session, returning how many were removed.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` when the delete fails.
    pub async fn sweep_expired(&self) -> Result<u64, Error> {
        let removed = self
            .sessions
            .delete_expired(self.clock.utc())
            .await
            .map_err(map_session_error)?;
        if removed > 0 {
            info!(removed, "expired handshake sessions removed");
        }
        Ok(removed)
    }
}
