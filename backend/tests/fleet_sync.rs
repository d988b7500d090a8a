//! Fleet sync against the in-memory cache: direct vehicle-API runs, relay
//! runs, run bookkeeping, and the change log they leave behind.

use std::time::Duration;

use chrono::TimeDelta;
use rental_core::domain::ports::{RelayRefresh, TelemetryRelayError, VehicleApiError};
use rental_core::domain::{
    SyncMethod, SyncOutcome, SyncReport, SyncStatus, UpdateKind, UpdateLogQuery, VehicleId,
    VehicleState,
};
use rental_core::test_support::fakes::{
    FakeTelemetryRelay, FakeVehicleApi, remote_location, remote_vehicle,
};
use rstest::rstest;

mod support;

use support::{FLEET_ACCOUNT, Harness, HarnessOptions};

fn finished(outcome: SyncOutcome) -> SyncReport {
    match outcome {
        SyncOutcome::Finished(report) => report,
        SyncOutcome::AlreadyRunning => panic!("sync unexpectedly skipped"),
    }
}

async fn with_fleet(api: FakeVehicleApi) -> Harness {
    let harness = Harness::new(HarnessOptions {
        api,
        ..HarnessOptions::default()
    });
    harness.seed_fleet_credential(TimeDelta::hours(8)).await;
    harness
}

fn two_car_fleet() -> FakeVehicleApi {
    FakeVehicleApi::new()
        .with_vehicle(remote_vehicle(1, VehicleState::Online))
        .with_vehicle(remote_vehicle(2, VehicleState::Asleep))
        .with_location(VehicleId::new(1), remote_location(37.77, -122.42))
        .with_location(VehicleId::new(2), remote_location(40.71, -74.01))
}

#[tokio::test]
async fn direct_sync_caches_every_vehicle_and_location() {
    let harness = with_fleet(two_car_fleet()).await;

    let report = finished(harness.sync.run_once(SyncMethod::Direct).await);

    assert_eq!(report.status, SyncStatus::Completed);
    assert_eq!(report.tally.vehicles_processed, 2);
    assert_eq!(report.tally.locations_updated, 2);
    assert_eq!(report.message, "Processed 2 vehicles, updated 2 locations");
    assert_eq!(harness.api.wakes(), vec![VehicleId::new(2)]);
    assert_eq!(
        harness.sleeper.recorded(),
        vec![Duration::from_secs(2), Duration::from_secs(10)]
    );

    let location = harness
        .cache
        .get_location(VehicleId::new(2))
        .await
        .expect("location cached");
    assert!(location.is_fresh);
    assert!((location.value.latitude - 40.71).abs() < f64::EPSILON);
    let vehicle = harness
        .cache
        .get_vehicle(VehicleId::new(1))
        .await
        .expect("vehicle cached");
    assert_eq!(
        vehicle.value.owner_account.map(|owner| owner.to_string()),
        Some(FLEET_ACCOUNT.to_owned())
    );

    let runs = harness.sync_runs.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, SyncStatus::Completed);
    assert_eq!(runs[0].kind, "vehicle_location_sync");
}

#[tokio::test]
async fn sync_writes_are_change_logged() {
    let harness = with_fleet(two_car_fleet()).await;
    finished(harness.sync.run_once(SyncMethod::Direct).await);
    harness.clock.advance_minutes(5);
    finished(harness.sync.run_once(SyncMethod::Direct).await);
    harness.cache.flush().await;

    let entries = harness.update_logs.entries();
    assert_eq!(entries.len(), 8);
    assert!(
        entries
            .iter()
            .all(|entry| entry.entry.actor.as_deref() == Some(FLEET_ACCOUNT))
    );
    let (first_pass, second_pass) = entries.split_at(4);
    assert!(first_pass.iter().all(|entry| entry.entry.is_creation()));
    assert!(
        second_pass
            .iter()
            .all(|entry| !entry.entry.is_creation() && entry.entry.changes.is_empty())
    );

    let locations = harness
        .cache
        .query_logs(UpdateLogQuery {
            vehicle_id: Some(VehicleId::new(1)),
            update_type: Some(UpdateKind::Location),
            ..UpdateLogQuery::default()
        })
        .await
        .expect("log query");
    assert_eq!(locations.len(), 2);
    assert_eq!(harness.cache.log_delivery().delivered, 8);
}

#[tokio::test]
async fn location_failures_are_counted_per_vehicle() {
    let api = FakeVehicleApi::new()
        .with_vehicle(remote_vehicle(1, VehicleState::Online))
        .with_vehicle(remote_vehicle(2, VehicleState::Online))
        .with_location_failure(VehicleId::new(1), VehicleApiError::transport("status 502"))
        .with_location(VehicleId::new(2), remote_location(40.71, -74.01));
    let harness = with_fleet(api).await;

    let report = finished(harness.sync.run_once(SyncMethod::Direct).await);

    assert_eq!(report.status, SyncStatus::CompletedWithErrors);
    assert_eq!(report.tally.errors_count(), 1);
    assert_eq!(report.tally.locations_updated, 1);
    assert!(
        report
            .message
            .contains("Location fetch failed for vehicle 1")
    );
}

#[tokio::test]
async fn unwakeable_vehicle_is_skipped_without_error() {
    let api = FakeVehicleApi::new()
        .with_vehicle(remote_vehicle(4, VehicleState::Offline))
        .with_wake_failure(VehicleId::new(4))
        .with_location(VehicleId::new(4), remote_location(1.0, 2.0));
    let harness = with_fleet(api).await;

    let report = finished(harness.sync.run_once(SyncMethod::Direct).await);

    assert_eq!(report.status, SyncStatus::Completed);
    assert_eq!(report.tally.wake_failures, 1);
    assert_eq!(report.tally.locations_updated, 0);
    assert!(harness.cache.get_vehicle(VehicleId::new(4)).await.is_ok());
    assert!(harness.cache.get_location(VehicleId::new(4)).await.is_err());
}

#[rstest]
#[case::no_credential(false, None)]
#[case::listing_rejected(true, Some(VehicleApiError::rejected("status 401: unauthorized")))]
#[tokio::test]
async fn run_level_failures_fail_the_run(
    #[case] seed_credential: bool,
    #[case] list_failure: Option<VehicleApiError>,
) {
    let api = match list_failure {
        Some(error) => FakeVehicleApi::new().with_list_failure(error),
        None => FakeVehicleApi::new(),
    };
    let harness = Harness::new(HarnessOptions {
        api,
        ..HarnessOptions::default()
    });
    if seed_credential {
        harness.seed_fleet_credential(TimeDelta::hours(8)).await;
    }

    let report = finished(harness.sync.run_once(SyncMethod::Direct).await);

    assert_eq!(report.status, SyncStatus::Failed);
    assert!(report.message.starts_with("Sync failed: "));
    assert_eq!(report.tally.errors, vec![report.message.clone()]);
    assert_eq!(harness.sync_runs.runs()[0].status, SyncStatus::Failed);
}

#[tokio::test]
async fn relay_sync_refreshes_each_listed_vehicle() {
    let harness = Harness::new(HarnessOptions {
        relay: FakeTelemetryRelay::listing([10, 11, 12])
            .with_outcome(
                11,
                Ok(RelayRefresh {
                    location_updated: false,
                }),
            )
            .with_outcome(12, Err(TelemetryRelayError::rejected("status 404"))),
        ..HarnessOptions::default()
    });

    let report = finished(harness.sync.run_once(SyncMethod::ViaHttp).await);

    assert_eq!(report.status, SyncStatus::CompletedWithErrors);
    assert_eq!(report.tally.vehicles_processed, 3);
    assert_eq!(report.tally.locations_updated, 1);
    assert_eq!(report.tally.errors_count(), 2);
    assert_eq!(
        harness.relay.refreshed(),
        vec![VehicleId::new(10), VehicleId::new(11), VehicleId::new(12)]
    );
    assert_eq!(
        harness.sleeper.recorded(),
        vec![Duration::from_secs(3), Duration::from_secs(3)]
    );
    assert_eq!(harness.sync_runs.runs()[0].kind, "api_sync");
}

#[tokio::test]
async fn recent_runs_are_newest_first() {
    let harness = with_fleet(two_car_fleet()).await;
    finished(harness.sync.run_once(SyncMethod::Direct).await);
    harness.clock.advance_minutes(5);
    finished(harness.sync.run_once(SyncMethod::ViaHttp).await);

    let runs = harness.sync.recent_runs(10).await.expect("runs listed");

    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].kind, "api_sync");
    assert_eq!(runs[1].kind, "vehicle_location_sync");
}
