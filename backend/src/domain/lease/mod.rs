//! Rental leases: time-boxed, command-scoped access to one vehicle.

mod manager;
mod model;

pub use manager::LeaseManager;
pub use model::{
    DEFAULT_ALLOWED_COMMANDS, Lease, LeaseDraft, LeaseHistoryEntry, LeasePolicy, LeaseStart,
    LeaseStatus, LeaseValidationError, OverwritePolicy,
};
