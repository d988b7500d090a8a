//! In-memory credential repository.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::ports::{CredentialRepository, CredentialRepositoryError};
use crate::domain::{AccountId, Credential, StoredCredential};

use super::lock;

/// One credential per account.
#[derive(Debug, Default)]
pub struct InMemoryCredentialRepository {
    credentials: Mutex<HashMap<AccountId, Credential>>,
}

impl InMemoryCredentialRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialRepository for InMemoryCredentialRepository {
    async fn find(
        &self,
        account: &AccountId,
    ) -> Result<Option<Credential>, CredentialRepositoryError> {
        Ok(lock(&self.credentials).get(account).cloned())
    }

    async fn upsert(
        &self,
        account: &AccountId,
        credential: &Credential,
    ) -> Result<(), CredentialRepositoryError> {
        lock(&self.credentials).insert(account.clone(), credential.clone());
        Ok(())
    }

    async fn delete(&self, account: &AccountId) -> Result<bool, CredentialRepositoryError> {
        Ok(lock(&self.credentials).remove(account).is_some())
    }

    async fn list_all(&self) -> Result<Vec<StoredCredential>, CredentialRepositoryError> {
        let mut all: Vec<StoredCredential> = lock(&self.credentials)
            .iter()
            .map(|(account, credential)| StoredCredential {
                account: account.clone(),
                credential: credential.clone(),
            })
            .collect();
        all.sort_by(|a, b| a.account.cmp(&b.account));
        Ok(all)
    }
}
