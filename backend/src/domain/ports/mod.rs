//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod credential_repository;
mod handshake_session_repository;
mod identity_provider;
mod lease_repository;
mod sync_run_repository;
mod telemetry_relay;
mod update_log_repository;
mod vehicle_api;
mod vehicle_repository;

#[cfg(test)]
pub use credential_repository::MockCredentialRepository;
pub use credential_repository::{CredentialRepository, CredentialRepositoryError};
#[cfg(test)]
pub use handshake_session_repository::MockHandshakeSessionRepository;
pub use handshake_session_repository::{
    HandshakeSessionRepository, HandshakeSessionRepositoryError,
};
#[cfg(test)]
pub use identity_provider::MockIdentityProvider;
pub use identity_provider::{
    FixtureIdentityProvider, IdentityProvider, IdentityProviderError, VerifiedIdentity,
};
#[cfg(test)]
pub use lease_repository::{MockLeaseHistoryRepository, MockLeaseRepository};
pub use lease_repository::{
    LeaseHistoryRepository, LeaseHistoryRepositoryError, LeaseRepository, LeaseRepositoryError,
};
#[cfg(test)]
pub use sync_run_repository::MockSyncRunRepository;
pub use sync_run_repository::{SyncRunRepository, SyncRunRepositoryError};
#[cfg(test)]
pub use telemetry_relay::MockTelemetryRelay;
pub use telemetry_relay::{
    FixtureTelemetryRelay, RelayRefresh, TelemetryRelay, TelemetryRelayError,
};
#[cfg(test)]
pub use update_log_repository::MockUpdateLogRepository;
pub use update_log_repository::{
    FixtureUpdateLogRepository, UpdateLogRepository, UpdateLogRepositoryError,
};
#[cfg(test)]
pub use vehicle_api::MockVehicleApi;
pub use vehicle_api::{CommandAck, RemoteLocation, RemoteVehicle, VehicleApi, VehicleApiError};
#[cfg(test)]
pub use vehicle_repository::MockVehicleRepository;
pub use vehicle_repository::{VehicleRepository, VehicleRepositoryError};
