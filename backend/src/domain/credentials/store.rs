//! Credential store: cached reads, write-through saves, and refresh policy.

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use mockable::Clock;
use tracing::{info, warn};

use crate::domain::ports::{
    CredentialRepository, CredentialRepositoryError, VehicleApi, VehicleApiError,
};
use crate::domain::runtime::with_deadline;
use crate::domain::upstream::map_vehicle_api_error;
use crate::domain::{AccountId, Error};

use super::{Credential, CredentialCache, RefreshSweepReport};

/// Credential store configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenStoreConfig {
    /// How long a cached credential is served before storage is re-read.
    pub cache_ttl: TimeDelta,
    /// Refresh once less than this much lifetime remains.
    pub refresh_threshold: TimeDelta,
    /// Deadline for a token endpoint call.
    pub call_timeout: Duration,
}

impl Default for TokenStoreConfig {
    fn default() -> Self {
        Self {
            cache_ttl: TimeDelta::minutes(10),
            refresh_threshold: TimeDelta::minutes(5),
            call_timeout: Duration::from_secs(30),
        }
    }
}

fn map_repository_error(error: CredentialRepositoryError) -> Error {
    Error::storage_unavailable(error.to_string())
}

/// Persists and caches the vehicle-API credential of each account.
///
/// Cloning shares the cache.
#[derive(Clone)]
pub struct TokenStore {
    repository: Arc<dyn CredentialRepository>,
    api: Arc<dyn VehicleApi>,
    clock: Arc<dyn Clock>,
    cache: Arc<CredentialCache>,
    config: TokenStoreConfig,
}

impl TokenStore {
    /// Create a store with an empty cache.
    pub fn new(
        repository: Arc<dyn CredentialRepository>,
        api: Arc<dyn VehicleApi>,
        clock: Arc<dyn Clock>,
        config: TokenStoreConfig,
    ) -> Self {
        Self {
            repository,
            api,
            clock,
            cache: Arc::new(CredentialCache::new(config.cache_ttl)),
            config,
        }
    }

    /// Unexpired credential for `account`.
    ///
    /// # Errors
    ///
    /// - `NotFound` when no credential is stored or it has expired.
    /// - `StorageUnavailable` when storage cannot be read.
    pub async fn get(&self, account: &AccountId) -> Result<Credential, Error> {
        let now = self.clock.utc();
        match self.load(account).await? {
            Some(credential) if !credential.is_expired_at(now) => Ok(credential),
            Some(_) | None => Err(Error::not_found(format!(
                "no unexpired credential for account {account}"
            ))),
        }
    }

    /// Store `credential` for `account`; the cache follows the durable write.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` when the durable write fails. The cache is left
    /// without an entry for the account in that case.
    pub async fn save(&self, account: &AccountId, credential: Credential) -> Result<(), Error> {
        if let Err(error) = self.repository.upsert(account, &credential).await {
            self.cache.remove(account);
            return Err(map_repository_error(error));
        }
        self.cache.insert(account, credential, self.clock.utc());
        Ok(())
    }

    /// Drop the cached and durable credential for `account`.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` when the durable delete fails.
    pub async fn invalidate(&self, account: &AccountId) -> Result<(), Error> {
        let result = self.repository.delete(account).await;
        self.cache.remove(account);
        result.map(|_| ()).map_err(map_repository_error)
    }

    /// Credential for the request path, refreshing it lazily when due.
    ///
    /// When a refresh fails the last-known credential is returned if it is
    /// still unexpired.
    ///
    /// # Errors
    ///
    /// - `NotFound` when no credential is stored.
    /// - `UpstreamTimeout`/`UpstreamRejected` when a refresh is required
    ///   because the credential expired and the refresh failed.
    /// - `StorageUnavailable` when storage cannot be read or written.
    pub async fn usable(&self, account: &AccountId) -> Result<Credential, Error> {
        let Some(current) = self.load(account).await? else {
            return Err(Error::not_found(format!(
                "no credential stored for account {account}"
            )));
        };

        let now = self.clock.utc();
        if !current.needs_refresh_at(now, self.config.refresh_threshold) {
            return Ok(current);
        }

        match self.refresh_from(account, &current).await {
            Ok(refreshed) => Ok(refreshed),
            Err(error) if !current.is_expired_at(self.clock.utc()) => {
                warn!(
                    account = %account,
                    error = %error,
                    "credential refresh failed; using last-known credential"
                );
                Ok(current)
            }
            Err(error) => Err(error),
        }
    }

    /// Refresh the credential for `account` now, regardless of lifetime.
    ///
    /// # Errors
    ///
    /// `NotFound` when nothing is stored; otherwise as for the token
    /// endpoint and storage.
    pub async fn refresh(&self, account: &AccountId) -> Result<Credential, Error> {
        let Some(current) = self.load(account).await? else {
            return Err(Error::not_found(format!(
                "no credential stored for account {account}"
            )));
        };
        self.refresh_from(account, &current).await
    }

    /// Refresh every stored credential with less than the threshold left.
    ///
    /// Individual failures are logged and counted; the next sweep retries.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` when the credential list cannot be read.
    pub async fn refresh_due(&self) -> Result<RefreshSweepReport, Error> {
        let stored = self
            .repository
            .list_all()
            .await
            .map_err(map_repository_error)?;

        let mut report = RefreshSweepReport {
            examined: stored.len(),
            ..RefreshSweepReport::default()
        };
        for entry in stored {
            let now = self.clock.utc();
            if !entry
                .credential
                .needs_refresh_at(now, self.config.refresh_threshold)
            {
                continue;
            }
            match self.refresh_from(&entry.account, &entry.credential).await {
                Ok(_) => report.refreshed += 1,
                Err(error) => {
                    report.failed += 1;
                    warn!(
                        account = %entry.account,
                        error = %error,
                        "scheduled credential refresh failed"
                    );
                }
            }
        }
        info!(
            examined = report.examined,
            refreshed = report.refreshed,
            failed = report.failed,
            "credential refresh sweep finished"
        );
        Ok(report)
    }

    async fn refresh_from(
        &self,
        account: &AccountId,
        current: &Credential,
    ) -> Result<Credential, Error> {
        if current.refresh_token().is_empty() {
            return Err(Error::expired(format!(
                "credential for account {account} has no refresh token"
            )));
        }
        let grant = with_deadline(
            self.config.call_timeout,
            self.api.refresh_credential(current.refresh_token()),
            |limit| {
                VehicleApiError::timeout(format!(
                    "token refresh exceeded {}s",
                    limit.as_secs()
                ))
            },
        )
        .await
        .map_err(map_vehicle_api_error)?;

        let refreshed = grant.into_credential(self.clock.utc(), Some(current.refresh_token()));
        self.save(account, refreshed.clone()).await?;
        info!(
            account = %account,
            expires_at = %refreshed.expires_at(),
            "credential refreshed"
        );
        Ok(refreshed)
    }

    async fn load(&self, account: &AccountId) -> Result<Option<Credential>, Error> {
        let now = self.clock.utc();
        if let Some(cached) = self.cache.get(account, now) {
            return Ok(Some(cached));
        }
        let stored = self
            .repository
            .find(account)
            .await
            .map_err(map_repository_error)?;
        match stored {
            Some(credential) => {
                self.cache.insert(account, credential.clone(), now);
                Ok(Some(credential))
            }
            None => {
                self.cache.remove(account);
                Ok(None)
            }
        }
    }
}
