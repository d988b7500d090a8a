//! End-to-end rental flow through the command gateway: renting a vehicle,
//! issuing commands under the lease, and the lease running out.

use chrono::TimeDelta;
use rental_core::domain::{DenialReason, ErrorCode, LeaseStatus, VehicleId};
use rental_core::test_support::command;
use rental_core::test_support::fakes::FakeVehicleApi;
use rstest::rstest;

mod support;

use support::{Harness, HarnessOptions};

const DRIVER: &str = "driver@example.com";

async fn harness() -> Harness {
    let harness = Harness::new(HarnessOptions::default());
    harness.seed_fleet_credential(TimeDelta::hours(8)).await;
    harness
}

#[tokio::test]
async fn leased_command_reaches_the_vehicle() {
    let harness = harness().await;

    let started = harness
        .gateway
        .rent(DRIVER, VehicleId::new(7), None)
        .await
        .expect("lease starts");
    assert_eq!(started.lease.vehicle_id(), VehicleId::new(7));
    assert!(started.replaced.is_none());

    let outcome = harness
        .gateway
        .execute(DRIVER, "Unlock")
        .await
        .expect("command authorized");

    assert!(outcome.accepted);
    assert!(!outcome.simulated);
    assert_eq!(outcome.command, command("unlock"));
    assert_eq!(harness.api.wakes(), vec![VehicleId::new(7)]);
    assert_eq!(
        harness.api.commands(),
        vec![(VehicleId::new(7), command("unlock"))]
    );
    assert!(
        harness
            .api
            .bearer_tokens()
            .iter()
            .all(|token| token == "fleet-access")
    );
}

#[rstest]
#[case::trunk("open_trunk", DenialReason::CommandNotAllowed)]
#[case::climate("auto_conditioning_start", DenialReason::CommandNotAllowed)]
#[tokio::test]
async fn commands_outside_the_lease_are_denied(
    #[case] requested: &str,
    #[case] reason: DenialReason,
) {
    let harness = harness().await;
    harness
        .gateway
        .rent(DRIVER, VehicleId::new(7), None)
        .await
        .expect("lease starts");

    let error = harness
        .gateway
        .execute(DRIVER, requested)
        .await
        .expect_err("command denied");

    assert_eq!(error.code(), ErrorCode::Denied);
    assert_eq!(error.denial_reason(), Some(reason));
    assert!(harness.api.commands().is_empty());
}

#[tokio::test]
async fn commands_without_a_lease_are_denied() {
    let harness = harness().await;

    let error = harness
        .gateway
        .execute(DRIVER, "unlock")
        .await
        .expect_err("no lease");

    assert_eq!(error.denial_reason(), Some(DenialReason::NoLease));
}

#[tokio::test]
async fn expired_lease_is_denied_and_archived() {
    let harness = harness().await;
    harness
        .gateway
        .rent(DRIVER, VehicleId::new(3), Some(TimeDelta::minutes(10)))
        .await
        .expect("lease starts");
    harness.clock.advance_minutes(11);

    let error = harness
        .gateway
        .execute(DRIVER, "lock")
        .await
        .expect_err("lease expired");

    assert_eq!(error.denial_reason(), Some(DenialReason::Expired));
    assert!(harness.gateway.status(DRIVER).await.expect("status").is_none());
    let archived = harness.history.entries();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].terminal_status, LeaseStatus::Expired);
    assert_eq!(archived[0].lease.vehicle_id(), VehicleId::new(3));
}

#[tokio::test]
async fn releasing_ends_the_lease_once() {
    let harness = harness().await;
    harness
        .gateway
        .rent(DRIVER, VehicleId::new(3), None)
        .await
        .expect("lease starts");

    assert!(harness.gateway.release(DRIVER).await.expect("release"));
    assert!(!harness.gateway.release(DRIVER).await.expect("second release"));
    assert!(harness.gateway.status(DRIVER).await.expect("status").is_none());
    assert_eq!(
        harness.history.entries()[0].terminal_status,
        LeaseStatus::Ended
    );
}

#[tokio::test]
async fn renting_again_replaces_the_previous_lease() {
    let harness = harness().await;
    harness
        .gateway
        .rent(DRIVER, VehicleId::new(3), None)
        .await
        .expect("first lease");

    let second = harness
        .gateway
        .rent(DRIVER, VehicleId::new(4), None)
        .await
        .expect("second lease");

    let replaced = second.replaced.expect("previous lease reported");
    assert_eq!(replaced.vehicle_id(), VehicleId::new(3));
    let current = harness
        .gateway
        .status(DRIVER)
        .await
        .expect("status")
        .expect("lease held");
    assert_eq!(current.vehicle_id(), VehicleId::new(4));
    let archived = harness.history.entries();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].terminal_status, LeaseStatus::Ended);
    assert_eq!(archived[0].lease.vehicle_id(), VehicleId::new(3));
}

#[tokio::test]
async fn overlong_lease_is_rejected() {
    let harness = harness().await;

    let error = harness
        .gateway
        .rent(DRIVER, VehicleId::new(3), Some(TimeDelta::days(2)))
        .await
        .expect_err("duration rejected");

    assert_eq!(error.code(), ErrorCode::InvalidArgument);
}

#[tokio::test]
async fn blank_identity_token_is_unauthenticated() {
    let harness = harness().await;

    let error = harness
        .gateway
        .rent("  ", VehicleId::new(3), None)
        .await
        .expect_err("token required");

    assert_eq!(error.code(), ErrorCode::Unauthenticated);
}

#[tokio::test]
async fn vehicle_refusal_is_reported_not_raised() {
    let harness = Harness::new(HarnessOptions {
        api: FakeVehicleApi::new().refusing_commands("vehicle in motion"),
        ..HarnessOptions::default()
    });
    harness.seed_fleet_credential(TimeDelta::hours(8)).await;
    harness
        .gateway
        .rent(DRIVER, VehicleId::new(5), None)
        .await
        .expect("lease starts");

    let outcome = harness
        .gateway
        .execute(DRIVER, "honk_horn")
        .await
        .expect("command authorized");

    assert!(!outcome.accepted);
    assert_eq!(outcome.reason.as_deref(), Some("vehicle in motion"));
}

#[tokio::test]
async fn dry_run_authorizes_without_contacting_the_vehicle() {
    let harness = Harness::new(HarnessOptions {
        dry_run: true,
        ..HarnessOptions::default()
    });
    harness
        .gateway
        .rent(DRIVER, VehicleId::new(5), None)
        .await
        .expect("lease starts");

    let outcome = harness
        .gateway
        .execute(DRIVER, "unlock")
        .await
        .expect("command authorized");

    assert!(outcome.simulated);
    assert!(harness.api.commands().is_empty());
    assert!(harness.api.wakes().is_empty());
}
