//! Lease lifecycle: start, authorize, status, end, and lazy expiry.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use tracing::{info, warn};

use crate::domain::ports::{
    LeaseHistoryRepository, LeaseHistoryRepositoryError, LeaseRepository, LeaseRepositoryError,
};
use crate::domain::{AccountId, CommandName, DenialReason, Error, VehicleId};

use super::{
    Lease, LeaseDraft, LeaseHistoryEntry, LeasePolicy, LeaseStart, LeaseStatus, OverwritePolicy,
};

fn map_lease_error(error: LeaseRepositoryError) -> Error {
    Error::storage_unavailable(error.to_string())
}

/// Owns the lease state machine for every account.
///
/// `active -> expired` happens when the clock passes `end_time` and is
/// observed lazily on read; `active -> ended` happens on [`LeaseManager::end`].
/// Both terminal transitions, and an overwrite by a new start, append a
/// history snapshot before the live row is removed. A snapshot is written at
/// least once: two callers retiring the same lease may both append it.
#[derive(Clone)]
pub struct LeaseManager {
    leases: Arc<dyn LeaseRepository>,
    history: Arc<dyn LeaseHistoryRepository>,
    clock: Arc<dyn Clock>,
    policy: LeasePolicy,
}

impl LeaseManager {
    /// Create a manager over the given repositories.
    pub fn new(
        leases: Arc<dyn LeaseRepository>,
        history: Arc<dyn LeaseHistoryRepository>,
        clock: Arc<dyn Clock>,
        policy: LeasePolicy,
    ) -> Self {
        Self {
            leases,
            history,
            clock,
            policy,
        }
    }

    /// The policy applied to new leases.
    pub fn policy(&self) -> &LeasePolicy {
        &self.policy
    }

    /// Start a lease of `duration` for `account` on `vehicle_id`.
    ///
    /// The command set comes from the policy, never from the caller.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` when `duration` is not positive or exceeds the
    ///   policy maximum.
    /// - `Conflict` when the policy rejects overwriting an active lease.
    /// - `StorageUnavailable` when the lease cannot be written.
    pub async fn start(
        &self,
        account: &AccountId,
        vehicle_id: VehicleId,
        duration: TimeDelta,
    ) -> Result<LeaseStart, Error> {
        if duration <= TimeDelta::zero() {
            return Err(Error::invalid_argument("lease duration must be positive"));
        }
        if duration > self.policy.max_duration {
            return Err(Error::invalid_argument(format!(
                "lease duration exceeds the maximum of {} minutes",
                self.policy.max_duration.num_minutes()
            )));
        }

        let now = self.clock.utc();
        let existing = self.leases.find(account).await.map_err(map_lease_error)?;
        if self.policy.overwrite == OverwritePolicy::RejectActive
            && existing
                .as_ref()
                .is_some_and(|lease| lease.status_at(now) == LeaseStatus::Active)
        {
            return Err(Error::conflict(format!(
                "account {account} already holds an active lease"
            )));
        }

        let lease = Lease::new(LeaseDraft {
            account: account.clone(),
            vehicle_id,
            created_at: now,
            start_time: now,
            end_time: now + duration,
            allowed_commands: self.policy.allowed_commands.clone(),
        })
        .map_err(|err| Error::invalid_argument(err.to_string()))?;

        if let Some(previous) = existing.as_ref() {
            self.record_history(previous.clone(), terminal_status_at(previous, now))
                .await;
        }
        let replaced = self.leases.replace(&lease).await.map_err(map_lease_error)?;
        if let Some(previous) = replaced.as_ref() {
            // Written between our read and the overwrite.
            if existing.as_ref() != Some(previous) {
                self.record_history(previous.clone(), terminal_status_at(previous, now))
                    .await;
            }
            warn!(
                account = %account,
                previous_vehicle_id = %previous.vehicle_id(),
                vehicle_id = %vehicle_id,
                "lease overwritten by a new start"
            );
        }
        info!(
            account = %account,
            vehicle_id = %vehicle_id,
            end_time = %lease.end_time(),
            "lease started"
        );
        Ok(LeaseStart { lease, replaced })
    }

    /// Start a lease using the policy's default duration.
    ///
    /// # Errors
    ///
    /// See [`LeaseManager::start`].
    pub async fn start_default(
        &self,
        account: &AccountId,
        vehicle_id: VehicleId,
    ) -> Result<LeaseStart, Error> {
        self.start(account, vehicle_id, self.policy.default_duration)
            .await
    }

    /// Check whether `account` may issue `command` now.
    ///
    /// Returns the authorizing lease.
    ///
    /// # Errors
    ///
    /// - `Denied(no_lease)` when the account holds no lease.
    /// - `Denied(expired)` when the window has closed; the lease is removed.
    /// - `Denied(command_not_allowed)` when the command is outside the set.
    /// - `StorageUnavailable` when the lease cannot be read.
    pub async fn authorize(
        &self,
        account: &AccountId,
        command: &CommandName,
    ) -> Result<Lease, Error> {
        let now = self.clock.utc();
        let Some(lease) = self.leases.find(account).await.map_err(map_lease_error)? else {
            return Err(Error::denied(
                DenialReason::NoLease,
                format!("account {account} holds no lease"),
            ));
        };

        if lease.status_at(now) == LeaseStatus::Expired {
            let end_time = lease.end_time();
            self.retire_expired(lease).await;
            return Err(Error::denied(
                DenialReason::Expired,
                format!("lease for account {account} expired at {end_time}"),
            ));
        }

        if !lease.permits(command) {
            return Err(Error::denied(
                DenialReason::CommandNotAllowed,
                format!("command {command} is not allowed by the lease"),
            ));
        }

        Ok(lease)
    }

    /// Current lease for `account`, or `None` when absent or expired.
    ///
    /// An expired lease is removed as a side effect.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` when the lease cannot be read.
    pub async fn status(&self, account: &AccountId) -> Result<Option<Lease>, Error> {
        let now = self.clock.utc();
        let lease = self.leases.find(account).await.map_err(map_lease_error)?;
        match lease {
            Some(lease) if lease.status_at(now) == LeaseStatus::Expired => {
                self.retire_expired(lease).await;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// End the lease held by `account`. Ending nothing is not an error.
    ///
    /// Returns whether a lease was removed.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` when the lease cannot be removed.
    pub async fn end(&self, account: &AccountId) -> Result<bool, Error> {
        let Some(lease) = self.leases.find(account).await.map_err(map_lease_error)? else {
            return Ok(false);
        };
        let terminal_status = terminal_status_at(&lease, self.clock.utc());
        self.record_history(lease, terminal_status).await;
        let removed = self.leases.delete(account).await.map_err(map_lease_error)?;
        if removed.is_none() {
            return Ok(false);
        }
        info!(account = %account, status = terminal_status.as_str(), "lease ended");
        Ok(true)
    }

    /// Terminal snapshots for `account`, most recent first.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` when the history cannot be read.
    pub async fn history(
        &self,
        account: &AccountId,
        limit: usize,
    ) -> Result<Vec<LeaseHistoryEntry>, Error> {
        self.history
            .list_for_account(account, limit)
            .await
            .map_err(|err| Error::storage_unavailable(err.to_string()))
    }

    async fn retire_expired(&self, lease: Lease) {
        let account = lease.account().clone();
        let vehicle_id = lease.vehicle_id();
        self.record_history(lease, LeaseStatus::Expired).await;
        let now = self.clock.utc();
        match self.leases.delete_if_expired(&account, now).await {
            Ok(Some(_)) => {
                info!(account = %account, vehicle_id = %vehicle_id, "lease expired");
            }
            Ok(None) => {}
            Err(error) => warn!(
                account = %account,
                error = %error,
                "failed to remove expired lease; next read will retry"
            ),
        }
    }

    async fn record_history(&self, lease: Lease, terminal_status: LeaseStatus) {
        let account = lease.account().clone();
        let entry = LeaseHistoryEntry {
            lease,
            terminal_status,
            recorded_at: self.clock.utc(),
        };
        if let Err(error) = self.history.append(&entry).await {
            log_history_failure(&account, &error);
        }
    }
}

fn terminal_status_at(lease: &Lease, now: DateTime<Utc>) -> LeaseStatus {
    match lease.status_at(now) {
        LeaseStatus::Expired => LeaseStatus::Expired,
        _ => LeaseStatus::Ended,
    }
}

fn log_history_failure(account: &AccountId, error: &LeaseHistoryRepositoryError) {
    warn!(account = %account, error = %error, "failed to record lease history");
}
