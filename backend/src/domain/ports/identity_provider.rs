//! Port for verifying caller identity tokens.

use async_trait::async_trait;

use crate::domain::AccountId;

use super::define_port_error;

define_port_error! {
    /// Errors raised by identity provider adapters.
    pub enum IdentityProviderError {
        /// The token is malformed, expired, or forged.
        Invalid { message: String } => "identity token rejected: {message}",
        /// The provider could not be reached.
        Unavailable { message: String } => "identity provider unavailable: {message}",
        /// The provider did not answer within the call deadline.
        Timeout { message: String } => "identity provider timed out: {message}",
    }
}

/// Identity established from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// Account identity used as the lease key.
    pub account: AccountId,
    /// Email claim, when present.
    pub email: Option<String>,
}

/// Port for verifying identity tokens.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify `token` and return the identity it asserts.
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityProviderError>;
}

/// Fixture provider that accepts any non-blank token as the account itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureIdentityProvider;

#[async_trait]
impl IdentityProvider for FixtureIdentityProvider {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityProviderError> {
        let account =
            AccountId::new(token).map_err(|err| IdentityProviderError::invalid(err.to_string()))?;
        Ok(VerifiedIdentity {
            email: Some(account.to_string()),
            account,
        })
    }
}
