//! In-memory lease and lease-history repositories.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::ports::{
    LeaseHistoryRepository, LeaseHistoryRepositoryError, LeaseRepository, LeaseRepositoryError,
};
use crate::domain::{AccountId, Lease, LeaseHistoryEntry};

use super::lock;

/// Live leases keyed by account.
#[derive(Debug, Default)]
pub struct InMemoryLeaseRepository {
    leases: Mutex<HashMap<AccountId, Lease>>,
}

impl InMemoryLeaseRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeaseRepository for InMemoryLeaseRepository {
    async fn find(&self, account: &AccountId) -> Result<Option<Lease>, LeaseRepositoryError> {
        Ok(lock(&self.leases).get(account).cloned())
    }

    async fn replace(&self, lease: &Lease) -> Result<Option<Lease>, LeaseRepositoryError> {
        Ok(lock(&self.leases).insert(lease.account().clone(), lease.clone()))
    }

    async fn delete(&self, account: &AccountId) -> Result<Option<Lease>, LeaseRepositoryError> {
        Ok(lock(&self.leases).remove(account))
    }

    async fn delete_if_expired(
        &self,
        account: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<Option<Lease>, LeaseRepositoryError> {
        let mut leases = lock(&self.leases);
        let expired = leases
            .get(account)
            .is_some_and(|lease| lease.end_time() < now);
        Ok(if expired { leases.remove(account) } else { None })
    }
}

/// Append-only lease snapshots.
#[derive(Debug, Default)]
pub struct InMemoryLeaseHistoryRepository {
    entries: Mutex<Vec<LeaseHistoryEntry>>,
}

impl InMemoryLeaseHistoryRepository {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every snapshot in insertion order.
    pub fn entries(&self) -> Vec<LeaseHistoryEntry> {
        lock(&self.entries).clone()
    }
}

#[async_trait]
impl LeaseHistoryRepository for InMemoryLeaseHistoryRepository {
    async fn append(&self, entry: &LeaseHistoryEntry) -> Result<(), LeaseHistoryRepositoryError> {
        lock(&self.entries).push(entry.clone());
        Ok(())
    }

    async fn list_for_account(
        &self,
        account: &AccountId,
        limit: usize,
    ) -> Result<Vec<LeaseHistoryEntry>, LeaseHistoryRepositoryError> {
        Ok(lock(&self.entries)
            .iter()
            .rev()
            .filter(|entry| entry.lease.account() == account)
            .take(limit)
            .cloned()
            .collect())
    }
}
