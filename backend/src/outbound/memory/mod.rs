//! In-process adapters for every repository port.
//!
//! Used by tests and single-node deployments without PostgreSQL. Each adapter
//! guards its state with a `std::sync::Mutex`; no lock is held across an
//! `.await`.

use std::sync::{Mutex, MutexGuard, PoisonError};

mod credentials;
mod handshakes;
mod leases;
mod sync_runs;
mod vehicles;

pub use credentials::InMemoryCredentialRepository;
pub use handshakes::InMemoryHandshakeSessionRepository;
pub use leases::{InMemoryLeaseHistoryRepository, InMemoryLeaseRepository};
pub use sync_runs::InMemorySyncRunRepository;
pub use vehicles::{InMemoryUpdateLogRepository, InMemoryVehicleRepository};

/// Lock `mutex`, recovering the data if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
