//! Port for durable vehicle-API credentials.

use async_trait::async_trait;

use crate::domain::{AccountId, Credential, StoredCredential};

use super::define_port_error;

define_port_error! {
    /// Errors raised by credential repository adapters.
    pub enum CredentialRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "credential repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "credential repository query failed: {message}",
    }
}

/// Port for one credential row per account.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    /// Find the stored credential for `account`, expired or not.
    async fn find(&self, account: &AccountId)
    -> Result<Option<Credential>, CredentialRepositoryError>;

    /// Insert or replace the credential for `account`.
    async fn upsert(
        &self,
        account: &AccountId,
        credential: &Credential,
    ) -> Result<(), CredentialRepositoryError>;

    /// Delete the credential for `account`; returns whether a row was removed.
    async fn delete(&self, account: &AccountId) -> Result<bool, CredentialRepositoryError>;

    /// List every stored credential.
    async fn list_all(&self) -> Result<Vec<StoredCredential>, CredentialRepositoryError>;
}
