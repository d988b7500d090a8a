//! Ports for live lease rows and the terminal lease history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{AccountId, Lease, LeaseHistoryEntry};

use super::define_port_error;

define_port_error! {
    /// Errors raised by lease repository adapters.
    pub enum LeaseRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "lease repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "lease repository query failed: {message}",
    }
}

/// Port for the live lease table, keyed by account.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LeaseRepository: Send + Sync {
    /// Find the lease held by `account`.
    async fn find(&self, account: &AccountId) -> Result<Option<Lease>, LeaseRepositoryError>;

    /// Store `lease`, overwriting any lease held by the same account.
    ///
    /// Returns the overwritten lease.
    async fn replace(&self, lease: &Lease) -> Result<Option<Lease>, LeaseRepositoryError>;

    /// Delete the lease held by `account`, returning it.
    async fn delete(&self, account: &AccountId) -> Result<Option<Lease>, LeaseRepositoryError>;

    /// Delete the lease held by `account` only if its `end_time` is before
    /// `now`, returning it.
    ///
    /// A lease written concurrently with a fresh window survives.
    async fn delete_if_expired(
        &self,
        account: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<Option<Lease>, LeaseRepositoryError>;
}

define_port_error! {
    /// Errors raised by lease history adapters.
    pub enum LeaseHistoryRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "lease history connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "lease history query failed: {message}",
    }
}

/// Append-only audit trail of leases that left the live table.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LeaseHistoryRepository: Send + Sync {
    /// Append a terminal snapshot.
    async fn append(&self, entry: &LeaseHistoryEntry) -> Result<(), LeaseHistoryRepositoryError>;

    /// List snapshots for `account`, most recent first.
    async fn list_for_account(
        &self,
        account: &AccountId,
        limit: usize,
    ) -> Result<Vec<LeaseHistoryEntry>, LeaseHistoryRepositoryError>;
}
