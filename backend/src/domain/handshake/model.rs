//! Staged OAuth handshake records.

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::domain::AccountId;

/// A pending authorization handshake, looked up by its `state`.
///
/// ## Invariants
/// - `state` is unique among unexpired sessions.
/// - The session is unusable once `now > expires_at`.
#[derive(Clone, PartialEq, Eq)]
pub struct HandshakeSession {
    /// Independent random identifier.
    pub session_id: Uuid,
    /// Opaque anti-forgery value echoed back by the provider.
    pub state: String,
    /// PKCE verifier presented when exchanging the authorization code.
    pub code_verifier: Zeroizing<String>,
    /// Account that started the handshake.
    pub account: AccountId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Deadline after which `state` no longer resolves.
    pub expires_at: DateTime<Utc>,
}

impl HandshakeSession {
    /// Whether the session is past its deadline at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

impl fmt::Debug for HandshakeSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeSession")
            .field("session_id", &self.session_id)
            .field("state", &self.state)
            .field("code_verifier", &"<redacted>")
            .field("account", &self.account)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Values returned by `begin`, used to build the provider authorization URL.
#[derive(Clone)]
pub struct HandshakeTicket {
    /// Session identifier for a later `complete`.
    pub session_id: Uuid,
    /// `state` query parameter.
    pub state: String,
    /// PKCE verifier; keep server side.
    pub code_verifier: Zeroizing<String>,
    /// PKCE S256 challenge derived from the verifier.
    pub code_challenge: String,
    /// Deadline of the session.
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for HandshakeTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeTicket")
            .field("session_id", &self.session_id)
            .field("state", &self.state)
            .field("code_verifier", &"<redacted>")
            .field("code_challenge", &self.code_challenge)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
