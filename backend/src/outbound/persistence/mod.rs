//! PostgreSQL persistence adapters using Diesel ORM.
//!
//! Concrete implementations of the repository ports backed by PostgreSQL via
//! `diesel-async` with `bb8` connection pooling.
//!
//! # Architecture
//!
//! - **Thin adapters**: repositories only translate between Diesel rows and
//!   domain types. Lease, credential, and cache rules live in the domain.
//! - **Internal models**: row structs (`models.rs`) and table definitions
//!   (`schema.rs`) never leave this module.
//! - **Strongly typed errors**: every Diesel and pool error is mapped to the
//!   port's own error type.
//!
//! # Example
//!
//! ```ignore
//! use rental_core::outbound::persistence::{DbPool, DieselLeaseRepository, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/rental")).await?;
//! let leases = DieselLeaseRepository::new(pool);
//! ```

mod diesel_basic_error_mapping;
mod diesel_credential_repository;
mod diesel_handshake_session_repository;
mod diesel_lease_repository;
mod diesel_sync_run_repository;
mod diesel_update_log_repository;
mod diesel_vehicle_repository;
mod migrations;
mod models;
mod pool;
mod schema;

pub use diesel_credential_repository::DieselCredentialRepository;
pub use diesel_handshake_session_repository::DieselHandshakeSessionRepository;
pub use diesel_lease_repository::{DieselLeaseHistoryRepository, DieselLeaseRepository};
pub use diesel_sync_run_repository::DieselSyncRunRepository;
pub use diesel_update_log_repository::DieselUpdateLogRepository;
pub use diesel_vehicle_repository::DieselVehicleRepository;
pub use migrations::{MIGRATIONS, MigrationError, run_pending, run_pending_async};
pub use pool::{DbPool, PoolConfig, PoolError};
