//! Vehicle-API credentials and the grants that produce them.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use zeroize::Zeroizing;

use crate::domain::AccountId;

/// Long-lived vehicle-API credential for one account.
///
/// Token material is zeroised on drop and never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    access_token: Zeroizing<String>,
    refresh_token: Zeroizing<String>,
    expires_at: DateTime<Utc>,
}

impl Credential {
    /// Build a credential from its parts.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: Zeroizing::new(access_token.into()),
            refresh_token: Zeroizing::new(refresh_token.into()),
            expires_at,
        }
    }

    /// Bearer token for vehicle-API calls.
    pub fn access_token(&self) -> &str {
        self.access_token.as_str()
    }

    /// Token used to mint a new access token.
    pub fn refresh_token(&self) -> &str {
        self.refresh_token.as_str()
    }

    /// Access token expiry.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the access token is past its expiry at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Lifetime left at `now`; negative once expired.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> TimeDelta {
        self.expires_at - now
    }

    /// Whether the credential should be refreshed at `now`.
    pub fn needs_refresh_at(&self, now: DateTime<Utc>, threshold: TimeDelta) -> bool {
        self.remaining_at(now) < threshold
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Token endpoint response, before it is anchored to the clock.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    /// New access token.
    pub access_token: Zeroizing<String>,
    /// Rotated refresh token, when the provider issued one.
    pub refresh_token: Option<Zeroizing<String>>,
    /// Lifetime of the access token.
    pub expires_in: TimeDelta,
}

impl TokenGrant {
    /// Anchor the grant at `now`, keeping `previous_refresh` when the
    /// provider did not rotate it.
    pub fn into_credential(self, now: DateTime<Utc>, previous_refresh: Option<&str>) -> Credential {
        let refresh_token = match self.refresh_token {
            Some(token) => token,
            None => Zeroizing::new(previous_refresh.unwrap_or_default().to_owned()),
        };
        Credential {
            access_token: self.access_token,
            refresh_token,
            expires_at: now + self.expires_in,
        }
    }
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// A credential together with its owner, as listed by the sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredential {
    /// Owner.
    pub account: AccountId,
    /// Stored credential.
    pub credential: Credential,
}

/// Outcome of a scheduled refresh sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSweepReport {
    /// Credentials inspected.
    pub examined: usize,
    /// Credentials refreshed and saved.
    pub refreshed: usize,
    /// Credentials due for refresh that could not be refreshed.
    pub failed: usize,
}
