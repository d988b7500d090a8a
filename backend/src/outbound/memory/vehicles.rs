//! In-memory vehicle and update-log repositories.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::ports::{
    UpdateLogRepository, UpdateLogRepositoryError, VehicleRepository, VehicleRepositoryError,
};
use crate::domain::{
    LocationSample, UpdateKind, UpdateLogDraft, UpdateLogEntry, UpdateLogQuery, UpdateSummary,
    VehicleId, VehicleRecord,
};

use super::lock;

/// Vehicle records and latest locations keyed by vehicle id.
#[derive(Debug, Default)]
pub struct InMemoryVehicleRepository {
    vehicles: Mutex<HashMap<VehicleId, VehicleRecord>>,
    locations: Mutex<HashMap<VehicleId, LocationSample>>,
}

impl InMemoryVehicleRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VehicleRepository for InMemoryVehicleRepository {
    async fn find_vehicle(
        &self,
        vehicle_id: VehicleId,
    ) -> Result<Option<VehicleRecord>, VehicleRepositoryError> {
        Ok(lock(&self.vehicles).get(&vehicle_id).cloned())
    }

    async fn upsert_vehicle(&self, record: &VehicleRecord) -> Result<(), VehicleRepositoryError> {
        lock(&self.vehicles).insert(record.vehicle_id, record.clone());
        Ok(())
    }

    async fn list_vehicles(&self) -> Result<Vec<VehicleRecord>, VehicleRepositoryError> {
        let mut records: Vec<VehicleRecord> = lock(&self.vehicles).values().cloned().collect();
        records.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then(a.vehicle_id.cmp(&b.vehicle_id))
        });
        Ok(records)
    }

    async fn find_latest_location(
        &self,
        vehicle_id: VehicleId,
    ) -> Result<Option<LocationSample>, VehicleRepositoryError> {
        Ok(lock(&self.locations).get(&vehicle_id).cloned())
    }

    async fn upsert_latest_location(
        &self,
        sample: &LocationSample,
    ) -> Result<(), VehicleRepositoryError> {
        lock(&self.locations).insert(sample.vehicle_id, sample.clone());
        Ok(())
    }
}

/// Append-only change log.
#[derive(Debug, Default)]
pub struct InMemoryUpdateLogRepository {
    entries: Mutex<Vec<UpdateLogEntry>>,
}

impl InMemoryUpdateLogRepository {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entry in insertion order.
    pub fn entries(&self) -> Vec<UpdateLogEntry> {
        lock(&self.entries).clone()
    }
}

#[async_trait]
impl UpdateLogRepository for InMemoryUpdateLogRepository {
    async fn append(&self, entry: &UpdateLogDraft) -> Result<i64, UpdateLogRepositoryError> {
        let mut entries = lock(&self.entries);
        let id = i64::try_from(entries.len())
            .map_err(|err| UpdateLogRepositoryError::query(err.to_string()))?
            + 1;
        entries.push(UpdateLogEntry {
            id,
            entry: entry.clone(),
        });
        Ok(id)
    }

    async fn query(
        &self,
        query: &UpdateLogQuery,
    ) -> Result<Vec<UpdateLogEntry>, UpdateLogRepositoryError> {
        let mut matching: Vec<UpdateLogEntry> = lock(&self.entries)
            .iter()
            .filter(|stored| {
                query
                    .vehicle_id
                    .is_none_or(|vehicle_id| stored.entry.vehicle_id == vehicle_id)
            })
            .filter(|stored| {
                query
                    .update_type
                    .is_none_or(|kind| stored.entry.update_type == kind)
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.entry
                .created_at
                .cmp(&a.entry.created_at)
                .then(b.id.cmp(&a.id))
        });
        matching.truncate(query.limit);
        Ok(matching)
    }

    async fn summary(
        &self,
        vehicle_id: VehicleId,
    ) -> Result<Vec<UpdateSummary>, UpdateLogRepositoryError> {
        let mut by_kind: BTreeMap<UpdateKind, UpdateSummary> = BTreeMap::new();
        for stored in lock(&self.entries)
            .iter()
            .filter(|stored| stored.entry.vehicle_id == vehicle_id)
        {
            let summary = by_kind
                .entry(stored.entry.update_type)
                .or_insert_with(|| UpdateSummary {
                    update_type: stored.entry.update_type,
                    update_count: 0,
                    last_update: None,
                });
            summary.update_count += 1;
            summary.last_update = summary.last_update.max(Some(stored.entry.created_at));
        }
        Ok(by_kind.into_values().collect())
    }
}
