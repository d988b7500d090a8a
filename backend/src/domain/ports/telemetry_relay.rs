//! Port for the HTTP relay used by `via_http` syncs.

use async_trait::async_trait;

use crate::domain::VehicleId;

use super::define_port_error;

define_port_error! {
    /// Errors raised by telemetry relay adapters.
    pub enum TelemetryRelayError {
        /// Network or server failure.
        Transport { message: String } => "telemetry relay transport failed: {message}",
        /// The call did not complete in time.
        Timeout { message: String } => "telemetry relay timed out: {message}",
        /// The relay refused the request.
        Rejected { message: String } => "telemetry relay rejected request: {message}",
        /// The response body could not be decoded.
        Decode { message: String } => "telemetry relay response invalid: {message}",
    }
}

/// Result of one relay-driven location refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayRefresh {
    /// Whether the relay stored a new location sample.
    pub location_updated: bool,
}

/// Port for the service's own vehicle endpoints.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TelemetryRelay: Send + Sync {
    /// List vehicle ids known to the relay.
    async fn list_vehicles(&self) -> Result<Vec<VehicleId>, TelemetryRelayError>;

    /// Ask the relay to fetch and store a fresh location.
    async fn refresh_location(
        &self,
        vehicle_id: VehicleId,
    ) -> Result<RelayRefresh, TelemetryRelayError>;
}

/// Fixture relay with no vehicles.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureTelemetryRelay;

#[async_trait]
impl TelemetryRelay for FixtureTelemetryRelay {
    async fn list_vehicles(&self) -> Result<Vec<VehicleId>, TelemetryRelayError> {
        Ok(Vec::new())
    }

    async fn refresh_location(
        &self,
        _vehicle_id: VehicleId,
    ) -> Result<RelayRefresh, TelemetryRelayError> {
        Ok(RelayRefresh {
            location_updated: false,
        })
    }
}
