//! PostgreSQL-backed `VehicleRepository` implementation.
//!
//! Upserts never overwrite `created_at`: the conflict branch applies a
//! changeset without that column.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::ports::{VehicleRepository, VehicleRepositoryError};
use crate::domain::{AccountId, LocationSample, VehicleId, VehicleRecord, VehicleState};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::models::{LocationRow, LocationUpdate, VehicleRow, VehicleUpdate};
use super::pool::{DbPool, PoolError};
use super::schema::{vehicle_locations, vehicles};

/// Diesel-backed implementation of the `VehicleRepository` port.
#[derive(Clone)]
pub struct DieselVehicleRepository {
    pool: DbPool,
}

impl DieselVehicleRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> VehicleRepositoryError {
    map_basic_pool_error(error, VehicleRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> VehicleRepositoryError {
    map_basic_diesel_error(
        error,
        VehicleRepositoryError::query,
        VehicleRepositoryError::connection,
    )
}

fn record_to_row(record: &VehicleRecord) -> VehicleRow {
    VehicleRow {
        vehicle_id: record.vehicle_id.get(),
        display_name: record.display_name.clone(),
        vin: record.vin.clone(),
        state: record.state.as_str().to_owned(),
        color: record.color.clone(),
        option_codes: record.option_codes.clone(),
        api_version: record.api_version,
        in_service: record.in_service,
        owner_account: record.owner_account.as_ref().map(ToString::to_string),
        created_at: record.created_at,
        updated_at: record.updated_at,
    }
}

fn record_to_update(record: &VehicleRecord) -> VehicleUpdate<'_> {
    VehicleUpdate {
        display_name: record.display_name.as_deref(),
        vin: record.vin.as_deref(),
        state: record.state.as_str(),
        color: record.color.as_deref(),
        option_codes: record.option_codes.as_deref(),
        api_version: record.api_version,
        in_service: record.in_service,
        owner_account: record.owner_account.as_ref().map(|account| account.as_ref()),
        updated_at: record.updated_at,
    }
}

fn row_to_record(row: VehicleRow) -> Result<VehicleRecord, VehicleRepositoryError> {
    let owner_account = row
        .owner_account
        .as_deref()
        .map(AccountId::new)
        .transpose()
        .map_err(|err| VehicleRepositoryError::query(format!("invalid owner account: {err}")))?;
    Ok(VehicleRecord {
        vehicle_id: VehicleId::new(row.vehicle_id),
        display_name: row.display_name,
        vin: row.vin,
        state: VehicleState::parse(&row.state),
        color: row.color,
        option_codes: row.option_codes,
        api_version: row.api_version,
        in_service: row.in_service,
        owner_account,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn sample_to_row(sample: &LocationSample) -> LocationRow {
    LocationRow {
        vehicle_id: sample.vehicle_id.get(),
        latitude: sample.latitude,
        longitude: sample.longitude,
        heading: sample.heading,
        speed: sample.speed,
        power: sample.power,
        shift_state: sample.shift_state.clone(),
        gps_as_of: sample.gps_as_of,
        created_at: sample.created_at,
        updated_at: sample.updated_at,
    }
}

fn sample_to_update(sample: &LocationSample) -> LocationUpdate<'_> {
    LocationUpdate {
        latitude: sample.latitude,
        longitude: sample.longitude,
        heading: sample.heading,
        speed: sample.speed,
        power: sample.power,
        shift_state: sample.shift_state.as_deref(),
        gps_as_of: sample.gps_as_of,
        updated_at: sample.updated_at,
    }
}

fn row_to_sample(row: LocationRow) -> LocationSample {
    LocationSample {
        vehicle_id: VehicleId::new(row.vehicle_id),
        latitude: row.latitude,
        longitude: row.longitude,
        heading: row.heading,
        speed: row.speed,
        power: row.power,
        shift_state: row.shift_state,
        gps_as_of: row.gps_as_of,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

#[async_trait]
impl VehicleRepository for DieselVehicleRepository {
    async fn find_vehicle(
        &self,
        vehicle_id: VehicleId,
    ) -> Result<Option<VehicleRecord>, VehicleRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<VehicleRow> = vehicles::table
            .filter(vehicles::vehicle_id.eq(vehicle_id.get()))
            .select(VehicleRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_record).transpose()
    }

    async fn upsert_vehicle(&self, record: &VehicleRecord) -> Result<(), VehicleRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::insert_into(vehicles::table)
            .values(&record_to_row(record))
            .on_conflict(vehicles::vehicle_id)
            .do_update()
            .set(&record_to_update(record))
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn list_vehicles(&self) -> Result<Vec<VehicleRecord>, VehicleRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<VehicleRow> = vehicles::table
            .select(VehicleRow::as_select())
            .order_by((vehicles::updated_at.desc(), vehicles::vehicle_id))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(row_to_record).collect()
    }

    async fn find_latest_location(
        &self,
        vehicle_id: VehicleId,
    ) -> Result<Option<LocationSample>, VehicleRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<LocationRow> = vehicle_locations::table
            .filter(vehicle_locations::vehicle_id.eq(vehicle_id.get()))
            .select(LocationRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        Ok(row.map(row_to_sample))
    }

    async fn upsert_latest_location(
        &self,
        sample: &LocationSample,
    ) -> Result<(), VehicleRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::insert_into(vehicle_locations::table)
            .values(&sample_to_row(sample))
            .on_conflict(vehicle_locations::vehicle_id)
            .do_update()
            .set(&sample_to_update(sample))
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }
}

#[cfg(test)]
mod tests {
    //! Row mapping coverage; query behaviour runs against PostgreSQL.
    use super::*;
    use crate::test_support::{account, fixed_now};
    use rstest::rstest;

    fn record() -> VehicleRecord {
        VehicleRecord {
            vehicle_id: VehicleId::new(5),
            display_name: Some("Blue".to_owned()),
            vin: Some("5YJ3E1EA7KF000001".to_owned()),
            state: VehicleState::Asleep,
            color: None,
            option_codes: None,
            api_version: Some(67),
            in_service: false,
            owner_account: Some(account("fleet@b.com")),
            created_at: fixed_now(),
            updated_at: fixed_now(),
        }
    }

    #[rstest]
    fn vehicle_rows_round_trip() {
        let record = record();
        let row = record_to_row(&record);
        assert_eq!(row.state, "asleep");
        assert_eq!(row_to_record(row).expect("row converts"), record);
    }

    #[rstest]
    fn unknown_stored_state_is_lenient() {
        let mut row = record_to_row(&record());
        row.state = "driving".to_owned();
        let restored = row_to_record(row).expect("row converts");
        assert_eq!(restored.state, VehicleState::Unknown);
    }

    #[rstest]
    fn update_changeset_leaves_creation_time_alone() {
        let record = record();
        let update = record_to_update(&record);
        assert_eq!(update.state, "asleep");
        assert_eq!(update.owner_account, Some("fleet@b.com"));
        assert_eq!(update.updated_at, record.updated_at);
    }

    #[rstest]
    fn location_rows_round_trip() {
        let sample = LocationSample {
            vehicle_id: VehicleId::new(5),
            latitude: 37.49,
            longitude: -121.94,
            heading: Some(180),
            speed: None,
            power: Some(0.0),
            shift_state: Some("P".to_owned()),
            gps_as_of: Some(fixed_now()),
            created_at: fixed_now(),
            updated_at: fixed_now(),
        };
        assert_eq!(row_to_sample(sample_to_row(&sample)), sample);
    }
}
