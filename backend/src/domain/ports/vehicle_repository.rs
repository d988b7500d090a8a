//! Port for cached vehicle metadata and latest locations.

use async_trait::async_trait;

use crate::domain::{LocationSample, VehicleId, VehicleRecord};

use super::define_port_error;

define_port_error! {
    /// Errors raised by vehicle repository adapters.
    pub enum VehicleRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "vehicle repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "vehicle repository query failed: {message}",
    }
}

/// Port for the vehicle and latest-location tables.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VehicleRepository: Send + Sync {
    /// Find a vehicle record.
    async fn find_vehicle(
        &self,
        vehicle_id: VehicleId,
    ) -> Result<Option<VehicleRecord>, VehicleRepositoryError>;

    /// Insert or replace a vehicle record.
    async fn upsert_vehicle(&self, record: &VehicleRecord) -> Result<(), VehicleRepositoryError>;

    /// List all vehicle records, most recently updated first.
    async fn list_vehicles(&self) -> Result<Vec<VehicleRecord>, VehicleRepositoryError>;

    /// Find the latest location sample for a vehicle.
    async fn find_latest_location(
        &self,
        vehicle_id: VehicleId,
    ) -> Result<Option<LocationSample>, VehicleRepositoryError>;

    /// Insert or replace the latest location sample for a vehicle.
    async fn upsert_latest_location(
        &self,
        sample: &LocationSample,
    ) -> Result<(), VehicleRepositoryError>;
}
