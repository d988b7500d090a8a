//! Last-known vehicle metadata and locations with freshness and a change log.
//!
//! Writes go straight to the vehicle repository. Each successful write is
//! diffed against the row it replaced and the resulting entry is handed to
//! the [`UpdateLogDispatcher`]; diffing and logging never fail the write.

mod diff;
mod dispatcher;

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::ports::{
    UpdateLogRepository, UpdateLogRepositoryError, VehicleRepository, VehicleRepositoryError,
};
use crate::domain::{
    Error, LocationSample, UpdateKind, UpdateLogEntry, UpdateLogQuery, UpdateSummary, VehicleId,
    VehicleRecord,
};

use self::diff::{DiffInput, build_entry, snapshot};
pub use self::dispatcher::{DEFAULT_LOG_QUEUE_CAPACITY, LogDeliveryStats, UpdateLogDispatcher};

/// Vehicle cache configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VehicleCacheConfig {
    /// Age below which a cached value counts as fresh.
    pub ttl: TimeDelta,
    /// Change-log entries that may wait for delivery before new ones drop.
    pub log_queue_capacity: usize,
}

impl Default for VehicleCacheConfig {
    fn default() -> Self {
        Self {
            ttl: TimeDelta::minutes(5),
            log_queue_capacity: DEFAULT_LOG_QUEUE_CAPACITY,
        }
    }
}

/// A cached value together with its freshness.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheRead<T> {
    /// The stored value, fresh or not.
    pub value: T,
    /// Last write time of the value.
    pub updated_at: DateTime<Utc>,
    /// Whether the value is younger than the cache TTL.
    pub is_fresh: bool,
}

impl<T> CacheRead<T> {
    /// Transform the value, keeping its freshness.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheRead<U> {
        CacheRead {
            value: f(self.value),
            updated_at: self.updated_at,
            is_fresh: self.is_fresh,
        }
    }
}

/// Either cached projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CachedValue {
    /// Vehicle metadata.
    VehicleInfo(VehicleRecord),
    /// Latest location sample.
    Location(LocationSample),
}

impl CachedValue {
    /// Projection this value belongs to.
    pub const fn kind(&self) -> UpdateKind {
        match self {
            Self::VehicleInfo(_) => UpdateKind::VehicleInfo,
            Self::Location(_) => UpdateKind::Location,
        }
    }

    /// Vehicle the value describes.
    pub const fn vehicle_id(&self) -> VehicleId {
        match self {
            Self::VehicleInfo(record) => record.vehicle_id,
            Self::Location(sample) => sample.vehicle_id,
        }
    }
}

fn map_vehicle_error(error: VehicleRepositoryError) -> Error {
    Error::storage_unavailable(error.to_string())
}

fn map_log_error(error: UpdateLogRepositoryError) -> Error {
    Error::storage_unavailable(error.to_string())
}

/// Freshness-aware cache of vehicle state backed by the vehicle repository.
///
/// Cloning shares the change-log dispatcher.
#[derive(Clone)]
pub struct VehicleCache {
    vehicles: Arc<dyn VehicleRepository>,
    logs: Arc<dyn UpdateLogRepository>,
    dispatcher: UpdateLogDispatcher,
    clock: Arc<dyn Clock>,
    config: VehicleCacheConfig,
}

impl VehicleCache {
    /// Create a cache and start its change-log worker on the current Tokio
    /// runtime.
    pub fn new(
        vehicles: Arc<dyn VehicleRepository>,
        logs: Arc<dyn UpdateLogRepository>,
        clock: Arc<dyn Clock>,
        config: VehicleCacheConfig,
    ) -> Self {
        let dispatcher = UpdateLogDispatcher::spawn(Arc::clone(&logs), config.log_queue_capacity);
        Self {
            vehicles,
            logs,
            dispatcher,
            clock,
            config,
        }
    }

    /// Configured freshness TTL.
    pub fn ttl(&self) -> TimeDelta {
        self.config.ttl
    }

    /// Cached value of `kind` for `vehicle_id`.
    ///
    /// # Errors
    ///
    /// - `NotFound` when nothing is cached.
    /// - `StorageUnavailable` when the read fails.
    pub async fn get(
        &self,
        vehicle_id: VehicleId,
        kind: UpdateKind,
    ) -> Result<CacheRead<CachedValue>, Error> {
        match kind {
            UpdateKind::VehicleInfo => self
                .get_vehicle(vehicle_id)
                .await
                .map(|read| read.map(CachedValue::VehicleInfo)),
            UpdateKind::Location => self
                .get_location(vehicle_id)
                .await
                .map(|read| read.map(CachedValue::Location)),
        }
    }

    /// Cached metadata for `vehicle_id`.
    ///
    /// # Errors
    ///
    /// As for [`VehicleCache::get`].
    pub async fn get_vehicle(
        &self,
        vehicle_id: VehicleId,
    ) -> Result<CacheRead<VehicleRecord>, Error> {
        let record = self
            .vehicles
            .find_vehicle(vehicle_id)
            .await
            .map_err(map_vehicle_error)?
            .ok_or_else(|| Error::not_found(format!("vehicle {vehicle_id} is not cached")))?;
        let updated_at = record.updated_at;
        Ok(self.read(record, updated_at))
    }

    /// Cached latest location for `vehicle_id`.
    ///
    /// # Errors
    ///
    /// As for [`VehicleCache::get`].
    pub async fn get_location(
        &self,
        vehicle_id: VehicleId,
    ) -> Result<CacheRead<LocationSample>, Error> {
        let sample = self
            .vehicles
            .find_latest_location(vehicle_id)
            .await
            .map_err(map_vehicle_error)?
            .ok_or_else(|| {
                Error::not_found(format!("no location cached for vehicle {vehicle_id}"))
            })?;
        let updated_at = sample.updated_at;
        Ok(self.read(sample, updated_at))
    }

    /// Store `value`, logging the change against the previous value.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` when the write fails. Log failures never surface.
    pub async fn put(&self, value: CachedValue, actor: Option<&str>) -> Result<CachedValue, Error> {
        match value {
            CachedValue::VehicleInfo(record) => self
                .put_vehicle(record, actor)
                .await
                .map(CachedValue::VehicleInfo),
            CachedValue::Location(sample) => self
                .put_location(sample, actor)
                .await
                .map(CachedValue::Location),
        }
    }

    /// Upsert vehicle metadata, returning the stored record.
    ///
    /// `updated_at` is set to now and an existing `created_at` is preserved.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` when the write fails.
    pub async fn put_vehicle(
        &self,
        mut record: VehicleRecord,
        actor: Option<&str>,
    ) -> Result<VehicleRecord, Error> {
        let now = self.clock.utc();
        let previous = self.vehicles.find_vehicle(record.vehicle_id).await;
        if let Ok(Some(existing)) = &previous {
            record.created_at = existing.created_at;
        } else {
            record.created_at = now;
        }
        record.updated_at = now;

        self.vehicles
            .upsert_vehicle(&record)
            .await
            .map_err(map_vehicle_error)?;
        debug!(vehicle_id = %record.vehicle_id, "vehicle info cached");

        match previous {
            Ok(previous) => self.log_write(
                record.vehicle_id,
                UpdateKind::VehicleInfo,
                previous.as_ref(),
                &record,
                actor,
                now,
            ),
            Err(error) => warn!(
                vehicle_id = %record.vehicle_id,
                error = %error,
                "previous vehicle info unreadable; change not logged"
            ),
        }
        Ok(record)
    }

    /// Upsert the latest location, returning the stored sample.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` when the write fails.
    pub async fn put_location(
        &self,
        mut sample: LocationSample,
        actor: Option<&str>,
    ) -> Result<LocationSample, Error> {
        let now = self.clock.utc();
        let previous = self.vehicles.find_latest_location(sample.vehicle_id).await;
        if let Ok(Some(existing)) = &previous {
            sample.created_at = existing.created_at;
        } else {
            sample.created_at = now;
        }
        sample.updated_at = now;

        self.vehicles
            .upsert_latest_location(&sample)
            .await
            .map_err(map_vehicle_error)?;
        debug!(vehicle_id = %sample.vehicle_id, "location cached");

        match previous {
            Ok(previous) => self.log_write(
                sample.vehicle_id,
                UpdateKind::Location,
                previous.as_ref(),
                &sample,
                actor,
                now,
            ),
            Err(error) => warn!(
                vehicle_id = %sample.vehicle_id,
                error = %error,
                "previous location unreadable; change not logged"
            ),
        }
        Ok(sample)
    }

    /// Every cached vehicle, most recently updated first.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` when the read fails.
    pub async fn list_vehicles(&self) -> Result<Vec<VehicleRecord>, Error> {
        self.vehicles.list_vehicles().await.map_err(map_vehicle_error)
    }

    /// Change-log entries matching `query`, most recent first.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` when the read fails.
    pub async fn query_logs(&self, query: UpdateLogQuery) -> Result<Vec<UpdateLogEntry>, Error> {
        self.logs
            .query(&query.clamped())
            .await
            .map_err(map_log_error)
    }

    /// Per-projection change counts for `vehicle_id`.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` when the read fails.
    pub async fn update_summary(&self, vehicle_id: VehicleId) -> Result<Vec<UpdateSummary>, Error> {
        self.logs.summary(vehicle_id).await.map_err(map_log_error)
    }

    /// Change-log delivery counters.
    pub fn log_delivery(&self) -> LogDeliveryStats {
        self.dispatcher.stats()
    }

    /// Wait until every change-log entry queued so far has been attempted.
    pub async fn flush(&self) {
        self.dispatcher.flush().await;
    }

    fn read<T>(&self, value: T, updated_at: DateTime<Utc>) -> CacheRead<T> {
        CacheRead {
            value,
            updated_at,
            is_fresh: self.clock.utc() - updated_at < self.config.ttl,
        }
    }

    fn log_write<T: Serialize>(
        &self,
        vehicle_id: VehicleId,
        update_type: UpdateKind,
        previous: Option<&T>,
        current: &T,
        actor: Option<&str>,
        at: DateTime<Utc>,
    ) {
        let snapshots = previous
            .map(snapshot)
            .transpose()
            .and_then(|previous| Ok((previous, snapshot(current)?)));
        let (previous, current): (Option<Value>, Value) = match snapshots {
            Ok(pair) => pair,
            Err(error) => {
                warn!(
                    vehicle_id = %vehicle_id,
                    error = %error,
                    "cached value not serialisable; change not logged"
                );
                return;
            }
        };
        self.dispatcher.dispatch(build_entry(DiffInput {
            vehicle_id,
            update_type,
            previous,
            current,
            actor,
            at,
        }));
    }
}
