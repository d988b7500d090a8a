//! Background synchronisation of vehicle metadata and locations.
//!
//! A run lists the fleet, writes each vehicle into the [`VehicleCache`],
//! wakes sleeping vehicles and stores their latest location. Per-vehicle
//! failures are collected into the run report; only failures that stop the
//! whole run (no fleet credential, no vehicle list, a panic) mark the run
//! `failed`. At most one run is in flight per engine.

mod guard;
mod run;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use mockable::Clock;
use tracing::{debug, info, warn};

use crate::domain::ports::{
    RemoteLocation, RemoteVehicle, SyncRunRepository, SyncRunRepositoryError, TelemetryRelay,
    TelemetryRelayError, VehicleApi, VehicleApiError,
};
use crate::domain::runtime::{Sleeper, with_deadline};
use crate::domain::upstream::{map_relay_error, map_vehicle_api_error};
use crate::domain::{
    AccountId, Error, LocationSample, TokenStore, VehicleCache, VehicleId, VehicleRecord,
};

use self::guard::RunFlag;
pub use self::run::{
    SyncMethod, SyncOutcome, SyncReport, SyncRun, SyncRunId, SyncStatus, SyncTally,
};

/// Sync engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Account whose credential reads the fleet.
    pub fleet_account: AccountId,
    /// Pause between vehicles on direct runs.
    pub direct_delay: Duration,
    /// Pause between vehicles on relay runs.
    pub relay_delay: Duration,
    /// Wait after a successful wake before reading the location.
    pub wake_grace: Duration,
    /// Deadline for listing, waking and relay listing calls.
    pub call_timeout: Duration,
    /// Deadline for location reads.
    pub location_timeout: Duration,
}

impl SyncConfig {
    /// Defaults for syncing the fleet of `fleet_account`.
    pub fn for_account(fleet_account: AccountId) -> Self {
        Self {
            fleet_account,
            direct_delay: Duration::from_secs(2),
            relay_delay: Duration::from_secs(3),
            wake_grace: Duration::from_secs(10),
            call_timeout: Duration::from_secs(30),
            location_timeout: Duration::from_secs(60),
        }
    }
}

/// Driven ports used by the engine.
#[derive(Clone)]
pub struct SyncEnginePorts {
    /// Vehicle API used by direct runs.
    pub vehicle_api: Arc<dyn VehicleApi>,
    /// Relay used by `via_http` runs.
    pub relay: Arc<dyn TelemetryRelay>,
    /// Run bookkeeping.
    pub sync_runs: Arc<dyn SyncRunRepository>,
}

fn map_run_error(error: SyncRunRepositoryError) -> Error {
    Error::storage_unavailable(error.to_string())
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Pulls the fleet from upstream into the vehicle cache.
///
/// Clones share the re-entrancy flag.
#[derive(Clone)]
pub struct SyncEngine {
    ports: SyncEnginePorts,
    tokens: TokenStore,
    cache: VehicleCache,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    config: SyncConfig,
    running: RunFlag,
}

impl SyncEngine {
    /// Create an idle engine.
    pub fn new(
        ports: SyncEnginePorts,
        tokens: TokenStore,
        cache: VehicleCache,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
        config: SyncConfig,
    ) -> Self {
        Self {
            ports,
            tokens,
            cache,
            clock,
            sleeper,
            config,
            running: RunFlag::default(),
        }
    }

    /// Whether a run is in progress.
    pub fn is_running(&self) -> bool {
        self.running.is_set()
    }

    /// Run one sync unless another is in flight.
    ///
    /// Never fails: every failure ends up in the returned report.
    pub async fn run_once(&self, method: SyncMethod) -> SyncOutcome {
        let Some(_guard) = self.running.try_acquire() else {
            info!(method = method.kind(), "sync already running; request ignored");
            return SyncOutcome::AlreadyRunning;
        };

        let started_at = self.clock.utc();
        let run_id = match self.ports.sync_runs.open(method.kind(), started_at).await {
            Ok(id) => Some(id),
            Err(error) => {
                warn!(error = %error, "could not open sync run record; continuing unrecorded");
                None
            }
        };
        info!(run_id, method = method.kind(), "sync started");

        let mut tally = SyncTally::default();
        let body = AssertUnwindSafe(self.process(method, &mut tally))
            .catch_unwind()
            .await;
        let (status, message) = match body {
            Ok(Ok(())) => (tally.finished_status(), tally.summary_message()),
            Ok(Err(error)) => {
                let message = format!("Sync failed: {error}");
                tally.errors.push(message.clone());
                (SyncStatus::Failed, message)
            }
            Err(payload) => {
                let message = format!("Sync aborted: {}", panic_message(payload.as_ref()));
                tally.errors.push(message.clone());
                (SyncStatus::Failed, message)
            }
        };

        let report = SyncReport {
            run_id,
            method,
            status,
            tally,
            message,
            started_at,
            completed_at: self.clock.utc(),
        };
        self.finalize(&report).await;
        info!(
            run_id,
            status = status.as_str(),
            vehicles = report.tally.vehicles_processed,
            locations = report.tally.locations_updated,
            errors = report.tally.errors_count(),
            "sync finished"
        );
        SyncOutcome::Finished(report)
    }

    /// Most recent runs, newest first.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` when the run records cannot be read.
    pub async fn recent_runs(&self, limit: usize) -> Result<Vec<SyncRun>, Error> {
        self.ports
            .sync_runs
            .list_recent(limit)
            .await
            .map_err(map_run_error)
    }

    async fn finalize(&self, report: &SyncReport) {
        let Some(id) = report.run_id else {
            return;
        };
        let run = SyncRun {
            id,
            kind: report.method.kind().to_owned(),
            status: report.status,
            vehicles_processed: report.tally.vehicles_processed,
            locations_updated: report.tally.locations_updated,
            errors_count: report.tally.errors_count(),
            message: Some(report.message.clone()),
            started_at: report.started_at,
            completed_at: Some(report.completed_at),
        };
        if let Err(error) = self.ports.sync_runs.finalize(&run).await {
            warn!(run_id = id, error = %error, "could not finalize sync run record");
        }
    }

    async fn process(&self, method: SyncMethod, tally: &mut SyncTally) -> Result<(), Error> {
        match method {
            SyncMethod::Direct => self.sync_direct(tally).await,
            SyncMethod::ViaHttp => self.sync_via_relay(tally).await,
        }
    }

    async fn sync_direct(&self, tally: &mut SyncTally) -> Result<(), Error> {
        let credential = self.tokens.usable(&self.config.fleet_account).await?;
        let access_token = credential.access_token();

        let vehicles = with_deadline(
            self.config.call_timeout,
            self.ports.vehicle_api.list_vehicles(access_token),
            |limit| VehicleApiError::timeout(format!("vehicle list exceeded {}s", limit.as_secs())),
        )
        .await
        .map_err(map_vehicle_api_error)?;
        info!(count = vehicles.len(), "vehicles listed");

        let total = vehicles.len();
        for (index, remote) in vehicles.into_iter().enumerate() {
            tally.vehicles_processed += 1;
            let vehicle_id = remote.vehicle_id;
            if let Err(message) = self.sync_vehicle(access_token, remote, tally).await {
                warn!(vehicle_id = %vehicle_id, error = %message, "vehicle sync failed");
                tally.errors.push(message);
            }
            if index + 1 < total {
                self.sleeper.sleep(self.config.direct_delay).await;
            }
        }
        Ok(())
    }

    async fn sync_vehicle(
        &self,
        access_token: &str,
        remote: RemoteVehicle,
        tally: &mut SyncTally,
    ) -> Result<(), String> {
        let vehicle_id = remote.vehicle_id;
        let state = remote.state;
        let now = self.clock.utc();
        let actor = self.config.fleet_account.as_ref();

        let record = vehicle_record(remote, &self.config.fleet_account, now);
        self.cache
            .put_vehicle(record, Some(actor))
            .await
            .map_err(|error| format!("Failed to save vehicle {vehicle_id}: {error}"))?;
        debug!(vehicle_id = %vehicle_id, state = %state, "vehicle info saved");

        if state.needs_wake() {
            let woke = with_deadline(
                self.config.call_timeout,
                self.ports.vehicle_api.wake(access_token, vehicle_id),
                |limit| VehicleApiError::timeout(format!("wake exceeded {}s", limit.as_secs())),
            )
            .await;
            match woke {
                Ok(()) => {
                    debug!(vehicle_id = %vehicle_id, "wake requested; waiting for vehicle");
                    self.sleeper.sleep(self.config.wake_grace).await;
                }
                Err(error) => {
                    warn!(
                        vehicle_id = %vehicle_id,
                        error = %error,
                        "could not wake vehicle; skipping location"
                    );
                    tally.wake_failures += 1;
                    return Ok(());
                }
            }
        }

        let location = with_deadline(
            self.config.location_timeout,
            self.ports
                .vehicle_api
                .fetch_location(access_token, vehicle_id),
            |limit| {
                VehicleApiError::timeout(format!("location fetch exceeded {}s", limit.as_secs()))
            },
        )
        .await
        .map_err(|error| format!("Location fetch failed for vehicle {vehicle_id}: {error}"))?;

        let Some(location) = location else {
            info!(vehicle_id = %vehicle_id, "no location data available");
            return Ok(());
        };
        self.cache
            .put_location(location_sample(vehicle_id, location, now), Some(actor))
            .await
            .map_err(|error| format!("Failed to save location for vehicle {vehicle_id}: {error}"))?;
        tally.locations_updated += 1;
        debug!(vehicle_id = %vehicle_id, "location updated");
        Ok(())
    }

    async fn sync_via_relay(&self, tally: &mut SyncTally) -> Result<(), Error> {
        let vehicles = with_deadline(
            self.config.call_timeout,
            self.ports.relay.list_vehicles(),
            |limit| {
                TelemetryRelayError::timeout(format!("relay listing exceeded {}s", limit.as_secs()))
            },
        )
        .await
        .map_err(map_relay_error)?;
        info!(count = vehicles.len(), "vehicles listed via relay");

        let total = vehicles.len();
        for (index, vehicle_id) in vehicles.into_iter().enumerate() {
            tally.vehicles_processed += 1;
            if let Err(message) = self.refresh_via_relay(vehicle_id).await {
                warn!(vehicle_id = %vehicle_id, error = %message, "relay refresh failed");
                tally.errors.push(message);
            } else {
                tally.locations_updated += 1;
            }
            if index + 1 < total {
                self.sleeper.sleep(self.config.relay_delay).await;
            }
        }
        Ok(())
    }

    async fn refresh_via_relay(&self, vehicle_id: VehicleId) -> Result<(), String> {
        let refreshed = with_deadline(
            self.config.location_timeout,
            self.ports.relay.refresh_location(vehicle_id),
            |limit| {
                TelemetryRelayError::timeout(format!("relay refresh exceeded {}s", limit.as_secs()))
            },
        )
        .await
        .map_err(|error| {
            format!("Relay location request failed for vehicle {vehicle_id}: {error}")
        })?;
        if refreshed.location_updated {
            Ok(())
        } else {
            Err(format!("Relay location fetch failed for vehicle {vehicle_id}"))
        }
    }
}

fn vehicle_record(remote: RemoteVehicle, owner: &AccountId, now: DateTime<Utc>) -> VehicleRecord {
    VehicleRecord {
        vehicle_id: remote.vehicle_id,
        display_name: remote.display_name,
        vin: remote.vin,
        state: remote.state,
        color: remote.color,
        option_codes: remote.option_codes,
        api_version: remote.api_version,
        in_service: remote.in_service,
        owner_account: Some(owner.clone()),
        created_at: now,
        updated_at: now,
    }
}

fn location_sample(
    vehicle_id: VehicleId,
    location: RemoteLocation,
    now: DateTime<Utc>,
) -> LocationSample {
    LocationSample {
        vehicle_id,
        latitude: location.latitude,
        longitude: location.longitude,
        heading: location.heading,
        speed: location.speed,
        power: location.power,
        shift_state: location.shift_state,
        gps_as_of: location.gps_as_of,
        created_at: now,
        updated_at: now,
    }
}
