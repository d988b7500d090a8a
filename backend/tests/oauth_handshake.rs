//! OAuth staged handshake and credential lifecycle: begin, callback
//! exchange, replay protection, expiry sweeps, and token refresh.

use chrono::TimeDelta;
use rental_core::domain::ports::VehicleApiError;
use rental_core::domain::{ErrorCode, pkce_challenge};
use rental_core::test_support::fakes::{FakeVehicleApi, grant};
use rental_core::test_support::{account, fixed_now};
use rstest::rstest;

mod support;

use support::{Harness, HarnessOptions, fleet};

const OWNER: &str = "owner@example.com";

fn callback(state: &str) -> String {
    format!("https://auth.example.com/void/callback?locale=en-US&code=NA_abc123&state={state}")
}

fn granting() -> Harness {
    Harness::new(HarnessOptions {
        api: FakeVehicleApi::new().with_token_response(Ok(grant(
            "owner-access",
            Some("owner-refresh"),
            TimeDelta::hours(8),
        ))),
        ..HarnessOptions::default()
    })
}

#[tokio::test]
async fn callback_stores_credential_for_the_initiating_account() {
    let harness = granting();
    let ticket = harness
        .handshakes
        .begin(&account(OWNER))
        .await
        .expect("handshake begins");
    assert_eq!(ticket.code_challenge, pkce_challenge(&ticket.code_verifier));

    let resolved = harness
        .exchange
        .exchange(&callback(&ticket.state))
        .await
        .expect("code exchanged");

    assert_eq!(resolved, account(OWNER));
    let credential = harness.tokens.get(&account(OWNER)).await.expect("stored");
    assert_eq!(credential.access_token(), "owner-access");
    assert_eq!(credential.refresh_token(), "owner-refresh");
    assert_eq!(credential.expires_at(), fixed_now() + TimeDelta::hours(8));

    let exchanged = harness.api.exchanged();
    assert_eq!(exchanged.len(), 1);
    assert_eq!(exchanged[0].1, ticket.code_verifier.as_str());
    assert!(harness.sessions.is_empty());
}

#[tokio::test]
async fn replayed_callback_is_not_found() {
    let harness = granting();
    let ticket = harness
        .handshakes
        .begin(&account(OWNER))
        .await
        .expect("handshake begins");
    harness
        .exchange
        .exchange(&callback(&ticket.state))
        .await
        .expect("first exchange");

    let error = harness
        .exchange
        .exchange(&callback(&ticket.state))
        .await
        .expect_err("state already used");

    assert_eq!(error.code(), ErrorCode::NotFound);
    assert_eq!(harness.api.exchanged().len(), 1);
}

#[tokio::test]
async fn failed_exchange_still_consumes_the_session() {
    let harness = Harness::new(HarnessOptions {
        api: FakeVehicleApi::new()
            .with_token_response(Err(VehicleApiError::rejected("invalid_grant"))),
        ..HarnessOptions::default()
    });
    let ticket = harness
        .handshakes
        .begin(&account(OWNER))
        .await
        .expect("handshake begins");

    let error = harness
        .exchange
        .exchange(&callback(&ticket.state))
        .await
        .expect_err("exchange rejected");

    assert_eq!(error.code(), ErrorCode::UpstreamRejected);
    assert!(harness.sessions.is_empty());
    assert!(harness.tokens.get(&account(OWNER)).await.is_err());
}

#[rstest]
#[case::no_state("https://auth.example.com/void/callback?code=abc")]
#[case::not_a_url("code=abc&state=xyz")]
#[tokio::test]
async fn malformed_callbacks_are_invalid(#[case] url: &str) {
    let harness = granting();

    let error = harness.exchange.exchange(url).await.expect_err("rejected");

    assert_eq!(error.code(), ErrorCode::InvalidArgument);
    assert!(harness.api.exchanged().is_empty());
}

#[tokio::test]
async fn expired_sessions_are_unknown_and_swept() {
    let harness = granting();
    let stale = harness
        .handshakes
        .begin(&account(OWNER))
        .await
        .expect("first handshake");
    harness
        .handshakes
        .begin(&account("second@example.com"))
        .await
        .expect("second handshake");
    harness.clock.advance_minutes(61);

    let error = harness
        .exchange
        .exchange(&callback(&stale.state))
        .await
        .expect_err("session expired");
    assert_eq!(error.code(), ErrorCode::NotFound);

    let swept = harness.handshakes.sweep_expired().await.expect("sweep");
    assert_eq!(swept, 1);
    assert!(harness.sessions.is_empty());
}

#[tokio::test]
async fn credential_close_to_expiry_is_refreshed_on_use() {
    let harness = Harness::new(HarnessOptions {
        api: FakeVehicleApi::new().with_token_response(Ok(grant(
            "rotated-access",
            None,
            TimeDelta::hours(8),
        ))),
        ..HarnessOptions::default()
    });
    harness.seed_fleet_credential(TimeDelta::minutes(2)).await;

    let credential = harness.tokens.usable(&fleet()).await.expect("usable");

    assert_eq!(credential.access_token(), "rotated-access");
    assert_eq!(credential.refresh_token(), "fleet-refresh");
    assert_eq!(harness.api.refresh_tokens(), vec!["fleet-refresh".to_owned()]);
}

#[tokio::test]
async fn refresh_sweep_counts_failures() {
    let harness = Harness::new(HarnessOptions {
        api: FakeVehicleApi::new()
            .with_token_response(Err(VehicleApiError::transport("status 503"))),
        ..HarnessOptions::default()
    });
    harness.seed_fleet_credential(TimeDelta::minutes(1)).await;

    let report = harness.tokens.refresh_due().await.expect("sweep runs");

    assert_eq!(report.examined, 1);
    assert_eq!(report.refreshed, 0);
    assert_eq!(report.failed, 1);
    let kept = harness.tokens.get(&fleet()).await.expect("still stored");
    assert_eq!(kept.access_token(), "fleet-access");
}
