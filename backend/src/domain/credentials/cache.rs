//! In-process credential cache with a TTL shorter than token lifetime.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, TimeDelta, Utc};

use crate::domain::{AccountId, Credential};

struct CachedCredential {
    credential: Credential,
    cached_at: DateTime<Utc>,
}

/// Read-through cache in front of the credential repository.
///
/// Entries are only inserted after the durable write (or read) they mirror
/// has succeeded, so the cache is never ahead of storage.
pub struct CredentialCache {
    ttl: TimeDelta,
    entries: RwLock<HashMap<AccountId, CachedCredential>>,
}

impl CredentialCache {
    /// Create an empty cache whose entries live for `ttl`.
    pub fn new(ttl: TimeDelta) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Cached credential for `account` if the entry is younger than the TTL.
    pub fn get(&self, account: &AccountId, now: DateTime<Utc>) -> Option<Credential> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(account)
            .filter(|entry| now - entry.cached_at < self.ttl)
            .map(|entry| entry.credential.clone())
    }

    /// Remember `credential` for `account` as of `now`.
    pub fn insert(&self, account: &AccountId, credential: Credential, now: DateTime<Utc>) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            account.clone(),
            CachedCredential {
                credential,
                cached_at: now,
            },
        );
    }

    /// Forget `account`.
    pub fn remove(&self, account: &AccountId) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(account);
    }
}
