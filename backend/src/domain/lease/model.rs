//! Lease records and the policy that shapes new leases.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AccountId, CommandName, VehicleId};

/// Commands granted to every lease unless configuration says otherwise.
pub const DEFAULT_ALLOWED_COMMANDS: [&str; 3] = ["unlock", "lock", "honk_horn"];

/// Lifecycle status of a lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseStatus {
    /// Inside its window.
    Active,
    /// Terminated explicitly by the holder.
    Ended,
    /// Terminated by the clock passing `end_time`.
    Expired,
}

impl LeaseStatus {
    /// Storage and log identifier.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Ended => "ended",
            Self::Expired => "expired",
        }
    }

    /// Parse a stored identifier.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(Self::Active),
            "ended" => Some(Self::Ended),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// Validation errors raised when rebuilding a lease from its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseValidationError {
    /// `end_time` precedes `start_time`.
    EndBeforeStart,
    /// The allowed command set is empty.
    NoCommands,
}

impl fmt::Display for LeaseValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndBeforeStart => write!(f, "lease end_time must not precede start_time"),
            Self::NoCommands => write!(f, "lease must allow at least one command"),
        }
    }
}

impl std::error::Error for LeaseValidationError {}

/// Unvalidated lease parts, used by adapters rebuilding stored rows.
#[derive(Debug, Clone)]
pub struct LeaseDraft {
    /// Lease holder; also the lease identifier.
    pub account: AccountId,
    /// Leased vehicle.
    pub vehicle_id: VehicleId,
    /// When the lease row was written.
    pub created_at: DateTime<Utc>,
    /// Window start.
    pub start_time: DateTime<Utc>,
    /// Window end; the lease expires once `now > end_time`.
    pub end_time: DateTime<Utc>,
    /// Commands the holder may issue.
    pub allowed_commands: BTreeSet<CommandName>,
}

/// A time-boxed grant of a command set on one vehicle.
///
/// ## Invariants
/// - `start_time <= end_time`.
/// - `allowed_commands` is non-empty.
/// - The lease identifier is the holder's account identity, so an account
///   holds at most one lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    account: AccountId,
    vehicle_id: VehicleId,
    created_at: DateTime<Utc>,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    allowed_commands: BTreeSet<CommandName>,
}

impl Lease {
    /// Validate and construct a lease.
    pub fn new(draft: LeaseDraft) -> Result<Self, LeaseValidationError> {
        if draft.end_time < draft.start_time {
            return Err(LeaseValidationError::EndBeforeStart);
        }
        if draft.allowed_commands.is_empty() {
            return Err(LeaseValidationError::NoCommands);
        }
        Ok(Self {
            account: draft.account,
            vehicle_id: draft.vehicle_id,
            created_at: draft.created_at,
            start_time: draft.start_time,
            end_time: draft.end_time,
            allowed_commands: draft.allowed_commands,
        })
    }

    /// Lease identifier (the holder's account).
    pub fn lease_id(&self) -> &AccountId {
        &self.account
    }

    /// Lease holder.
    pub fn account(&self) -> &AccountId {
        &self.account
    }

    /// Leased vehicle.
    pub fn vehicle_id(&self) -> VehicleId {
        self.vehicle_id
    }

    /// When the lease was written.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Window start.
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Window end.
    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    /// Commands the holder may issue.
    pub fn allowed_commands(&self) -> &BTreeSet<CommandName> {
        &self.allowed_commands
    }

    /// Status at `now`: expired strictly after `end_time`.
    pub fn status_at(&self, now: DateTime<Utc>) -> LeaseStatus {
        if now > self.end_time {
            LeaseStatus::Expired
        } else {
            LeaseStatus::Active
        }
    }

    /// Whether `command` is in the allowed set.
    pub fn permits(&self, command: &CommandName) -> bool {
        self.allowed_commands.contains(command)
    }

    /// Time left at `now`, zero once expired.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> TimeDelta {
        (self.end_time - now).max(TimeDelta::zero())
    }
}

/// Snapshot of a lease at the moment it left the live table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseHistoryEntry {
    /// The lease as it was stored.
    pub lease: Lease,
    /// `Ended` or `Expired`.
    pub terminal_status: LeaseStatus,
    /// When the snapshot was taken.
    pub recorded_at: DateTime<Utc>,
}

/// What to do when an account starts a lease while holding an active one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwritePolicy {
    /// Last writer wins; the prior lease is reported and logged.
    #[default]
    Replace,
    /// Refuse with a conflict while the prior lease is still active.
    RejectActive,
}

impl OverwritePolicy {
    /// Parse a configuration value (`replace` or `reject_active`).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "replace" => Some(Self::Replace),
            "reject_active" | "reject-active" => Some(Self::RejectActive),
            _ => None,
        }
    }
}

/// Fixed rules applied to every new lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeasePolicy {
    /// Commands granted to every lease.
    pub allowed_commands: BTreeSet<CommandName>,
    /// Duration used when the caller does not supply one.
    pub default_duration: TimeDelta,
    /// Upper bound on any requested duration.
    pub max_duration: TimeDelta,
    /// Behaviour when a lease already exists for the account.
    pub overwrite: OverwritePolicy,
}

impl Default for LeasePolicy {
    fn default() -> Self {
        let allowed_commands = DEFAULT_ALLOWED_COMMANDS
            .iter()
            .filter_map(|raw| CommandName::new(raw).ok())
            .collect();
        Self {
            allowed_commands,
            default_duration: TimeDelta::minutes(30),
            max_duration: TimeDelta::hours(24),
            overwrite: OverwritePolicy::Replace,
        }
    }
}

/// Result of starting a lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseStart {
    /// The newly stored lease.
    pub lease: Lease,
    /// The lease it overwrote, if any.
    pub replaced: Option<Lease>,
}
