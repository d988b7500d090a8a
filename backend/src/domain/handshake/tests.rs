//! Tests for handshake sessions and the callback exchange.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use rstest::{fixture, rstest};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::*;
use crate::domain::ports::{
    CredentialRepository, HandshakeSessionRepository, HandshakeSessionRepositoryError,
    MockHandshakeSessionRepository, MockVehicleApi, VehicleApiError,
};
use crate::domain::{ErrorCode, TokenGrant, TokenStore, TokenStoreConfig};
use crate::outbound::memory::{InMemoryCredentialRepository, InMemoryHandshakeSessionRepository};
use crate::test_support::{MutableClock, account, fixed_now};

struct Harness {
    clock: Arc<MutableClock>,
    sessions: Arc<InMemoryHandshakeSessionRepository>,
    store: AuthHandshakeStore,
}

#[fixture]
fn harness() -> Harness {
    let clock = Arc::new(MutableClock::new(fixed_now()));
    let sessions = Arc::new(InMemoryHandshakeSessionRepository::new());
    let store =
        AuthHandshakeStore::new(sessions.clone(), clock.clone(), HandshakeConfig::default());
    Harness {
        clock,
        sessions,
        store,
    }
}

/// Token source replaying a fixed list of states.
struct ScriptedTokens {
    states: Mutex<Vec<&'static str>>,
}

impl HandshakeTokenSource for ScriptedTokens {
    fn state(&self) -> String {
        let mut states = self.states.lock().expect("states mutex");
        let next = if states.len() > 1 {
            states.remove(0)
        } else {
            states[0]
        };
        next.to_owned()
    }

    fn code_verifier(&self) -> Zeroizing<String> {
        Zeroizing::new("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_owned())
    }
}

#[rstest]
#[tokio::test]
async fn begin_resolve_complete_round_trip(harness: Harness) {
    let ticket = harness
        .store
        .begin(&account("a@b.com"))
        .await
        .expect("begin succeeds");

    assert_eq!(ticket.expires_at, fixed_now() + TimeDelta::hours(1));
    assert_eq!(ticket.code_challenge, pkce_challenge(&ticket.code_verifier));

    let session = harness
        .store
        .resolve(&ticket.state)
        .await
        .expect("state resolves");
    assert_eq!(session.account, account("a@b.com"));
    assert_eq!(session.session_id, ticket.session_id);

    let err = harness
        .store
        .resolve("unknown")
        .await
        .expect_err("unknown state");
    assert_eq!(err.code(), ErrorCode::NotFound);

    harness
        .store
        .complete(&ticket.session_id)
        .await
        .expect("complete succeeds");
    let err = harness
        .store
        .resolve(&ticket.state)
        .await
        .expect_err("completed session is gone");
    assert_eq!(err.code(), ErrorCode::NotFound);

    harness
        .store
        .complete(&ticket.session_id)
        .await
        .expect("complete is idempotent");
}

#[rstest]
#[tokio::test]
async fn session_ids_are_independent_of_state(harness: Harness) {
    let ticket = harness
        .store
        .begin(&account("a@b.com"))
        .await
        .expect("begin succeeds");
    let session_id = ticket.session_id.to_string();
    assert!(!ticket.state.contains(&session_id));
    assert!(!ticket.code_verifier.contains(&session_id));
    assert_ne!(ticket.state, *ticket.code_verifier);
}

#[rstest]
#[tokio::test]
async fn expired_state_fails_closed_and_is_dropped(harness: Harness) {
    let ticket = harness
        .store
        .begin(&account("a@b.com"))
        .await
        .expect("begin succeeds");

    harness.clock.advance_minutes(61);
    let err = harness
        .store
        .resolve(&ticket.state)
        .await
        .expect_err("expired state");
    assert_eq!(err.code(), ErrorCode::NotFound);
    assert!(harness.sessions.is_empty(), "expired session removed on read");
}

#[rstest]
#[tokio::test]
async fn sweep_removes_only_expired_sessions(harness: Harness) {
    harness
        .store
        .begin(&account("old@b.com"))
        .await
        .expect("begin old");
    harness.clock.advance_minutes(45);
    let fresh = harness
        .store
        .begin(&account("new@b.com"))
        .await
        .expect("begin new");
    harness.clock.advance_minutes(20);

    let removed = harness.store.sweep_expired().await.expect("sweep runs");
    assert_eq!(removed, 1);
    harness
        .store
        .resolve(&fresh.state)
        .await
        .expect("fresh session survives");
}

#[rstest]
#[tokio::test]
async fn duplicate_state_is_regenerated() {
    let sessions = Arc::new(InMemoryHandshakeSessionRepository::new());
    let tokens = Arc::new(ScriptedTokens {
        states: Mutex::new(vec!["clash", "clash", "unique"]),
    });
    let store = AuthHandshakeStore::with_token_source(
        sessions.clone(),
        tokens,
        Arc::new(MutableClock::new(fixed_now())),
        HandshakeConfig::default(),
    );

    let first = store.begin(&account("a@b.com")).await.expect("first begin");
    let second = store.begin(&account("b@b.com")).await.expect("second begin");

    assert_eq!(first.state, "clash");
    assert_eq!(second.state, "unique");
    assert_eq!(sessions.len(), 2);
}

#[rstest]
#[tokio::test]
async fn persistent_state_clash_is_a_storage_error() {
    let mut sessions = MockHandshakeSessionRepository::new();
    sessions
        .expect_insert()
        .times(3)
        .returning(|_| Err(HandshakeSessionRepositoryError::duplicate_state()));
    let store = AuthHandshakeStore::new(
        Arc::new(sessions),
        Arc::new(MutableClock::new(fixed_now())),
        HandshakeConfig::default(),
    );

    let err = store
        .begin(&account("a@b.com"))
        .await
        .expect_err("every attempt clashes");
    assert_eq!(err.code(), ErrorCode::StorageUnavailable);
}

#[rstest]
#[tokio::test]
async fn storage_failure_on_begin_is_reported() {
    let mut sessions = MockHandshakeSessionRepository::new();
    sessions
        .expect_insert()
        .times(1)
        .return_once(|_| Err(HandshakeSessionRepositoryError::connection("refused")));
    let store = AuthHandshakeStore::new(
        Arc::new(sessions),
        Arc::new(MutableClock::new(fixed_now())),
        HandshakeConfig::default(),
    );

    let err = store
        .begin(&account("a@b.com"))
        .await
        .expect_err("insert fails");
    assert_eq!(err.code(), ErrorCode::StorageUnavailable);
}

fn exchange_with(
    harness: &Harness,
    api: MockVehicleApi,
) -> (CallbackExchange, TokenStore, Arc<InMemoryCredentialRepository>) {
    let api = Arc::new(api);
    let credentials = Arc::new(InMemoryCredentialRepository::new());
    let tokens = TokenStore::new(
        credentials.clone(),
        api.clone(),
        harness.clock.clone(),
        TokenStoreConfig::default(),
    );
    let exchange = CallbackExchange::new(
        harness.store.clone(),
        tokens.clone(),
        api,
        harness.clock.clone(),
        Duration::from_secs(30),
    );
    (exchange, tokens, credentials)
}

#[rstest]
#[tokio::test]
async fn callback_exchange_stores_credential_and_consumes_session(harness: Harness) {
    let ticket = harness
        .store
        .begin(&account("a@b.com"))
        .await
        .expect("begin succeeds");
    let verifier = ticket.code_verifier.to_string();

    let mut api = MockVehicleApi::new();
    api.expect_exchange_code()
        .withf(move |url, code_verifier| {
            url.query_pairs().any(|(k, v)| k == "code" && v == "auth-code")
                && code_verifier == verifier.as_str()
        })
        .times(1)
        .return_once(|_, _| {
            Ok(TokenGrant {
                access_token: Zeroizing::new("access".to_owned()),
                refresh_token: Some(Zeroizing::new("refresh".to_owned())),
                expires_in: TimeDelta::hours(8),
            })
        });
    let (exchange, tokens, _) = exchange_with(&harness, api);

    let callback = format!(
        "https://rental.example/callback?code=auth-code&state={}",
        ticket.state
    );
    let owner = exchange.exchange(&callback).await.expect("exchange succeeds");

    assert_eq!(owner, account("a@b.com"));
    let credential = tokens.get(&owner).await.expect("credential stored");
    assert_eq!(credential.access_token(), "access");
    assert_eq!(credential.expires_at(), fixed_now() + TimeDelta::hours(8));
    assert!(harness.sessions.is_empty(), "session consumed");
}

#[rstest]
#[tokio::test]
async fn failed_exchange_still_consumes_session(harness: Harness) {
    let ticket = harness
        .store
        .begin(&account("a@b.com"))
        .await
        .expect("begin succeeds");

    let mut api = MockVehicleApi::new();
    api.expect_exchange_code()
        .times(1)
        .return_once(|_, _| Err(VehicleApiError::rejected("invalid_grant")));
    let (exchange, _, credentials) = exchange_with(&harness, api);

    let callback = format!("https://rental.example/callback?code=x&state={}", ticket.state);
    let err = exchange.exchange(&callback).await.expect_err("exchange fails");

    assert_eq!(err.code(), ErrorCode::UpstreamRejected);
    assert!(harness.sessions.is_empty(), "session consumed on failure");
    assert!(
        credentials
            .list_all()
            .await
            .expect("list credentials")
            .is_empty()
    );
    let err = exchange
        .exchange(&callback)
        .await
        .expect_err("replay is refused");
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[rstest]
#[case::not_a_url("not a url")]
#[case::no_state("https://rental.example/callback?code=abc")]
#[tokio::test]
async fn malformed_callbacks_are_invalid(harness: Harness, #[case] callback: &str) {
    let (exchange, _, _) = exchange_with(&harness, MockVehicleApi::new());
    let err = exchange.exchange(callback).await.expect_err("malformed");
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
}

/// Session store whose targeted deletes always fail.
struct UndeletableSessions {
    inner: InMemoryHandshakeSessionRepository,
}

#[async_trait]
impl HandshakeSessionRepository for UndeletableSessions {
    async fn insert(
        &self,
        session: &HandshakeSession,
    ) -> Result<(), HandshakeSessionRepositoryError> {
        self.inner.insert(session).await
    }

    async fn find_by_state(
        &self,
        state: &str,
    ) -> Result<Option<HandshakeSession>, HandshakeSessionRepositoryError> {
        self.inner.find_by_state(state).await
    }

    async fn take_by_state(
        &self,
        state: &str,
    ) -> Result<Option<HandshakeSession>, HandshakeSessionRepositoryError> {
        self.inner.take_by_state(state).await
    }

    async fn delete(&self, _session_id: &Uuid) -> Result<bool, HandshakeSessionRepositoryError> {
        Err(HandshakeSessionRepositoryError::connection("down"))
    }

    async fn delete_expired(
        &self,
        now: DateTime<Utc>,
    ) -> Result<u64, HandshakeSessionRepositoryError> {
        self.inner.delete_expired(now).await
    }
}

fn grant() -> TokenGrant {
    TokenGrant {
        access_token: Zeroizing::new("access".to_owned()),
        refresh_token: Some(Zeroizing::new("refresh".to_owned())),
        expires_in: TimeDelta::hours(8),
    }
}

#[rstest]
#[tokio::test]
async fn callback_state_is_honoured_once_even_when_deletes_fail() {
    let clock = Arc::new(MutableClock::new(fixed_now()));
    let store = AuthHandshakeStore::new(
        Arc::new(UndeletableSessions {
            inner: InMemoryHandshakeSessionRepository::new(),
        }),
        clock.clone(),
        HandshakeConfig::default(),
    );
    let ticket = store.begin(&account("a@b.com")).await.expect("begin succeeds");

    let mut api = MockVehicleApi::new();
    api.expect_exchange_code()
        .times(1)
        .return_once(|_, _| Ok(grant()));
    let api = Arc::new(api);
    let tokens = TokenStore::new(
        Arc::new(InMemoryCredentialRepository::new()),
        api.clone(),
        clock.clone(),
        TokenStoreConfig::default(),
    );
    let exchange = CallbackExchange::new(store, tokens, api, clock, Duration::from_secs(30));

    let callback = format!("https://rental.example/callback?code=c1&state={}", ticket.state);
    exchange.exchange(&callback).await.expect("first callback succeeds");
    let err = exchange
        .exchange(&callback)
        .await
        .expect_err("second callback is refused");
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[rstest]
#[tokio::test]
async fn unremovable_session_fails_closed_before_exchange() {
    let mut sessions = MockHandshakeSessionRepository::new();
    sessions
        .expect_take_by_state()
        .times(1)
        .return_once(|_| Err(HandshakeSessionRepositoryError::connection("down")));
    let clock = Arc::new(MutableClock::new(fixed_now()));
    let store = AuthHandshakeStore::new(
        Arc::new(sessions),
        clock.clone(),
        HandshakeConfig::default(),
    );
    // No expectations: any code exchange would panic the mock.
    let api = Arc::new(MockVehicleApi::new());
    let credentials = Arc::new(InMemoryCredentialRepository::new());
    let tokens = TokenStore::new(
        credentials.clone(),
        api.clone(),
        clock.clone(),
        TokenStoreConfig::default(),
    );
    let exchange = CallbackExchange::new(store, tokens, api, clock, Duration::from_secs(30));

    let err = exchange
        .exchange("https://rental.example/callback?code=c1&state=s1")
        .await
        .expect_err("storage failure");

    assert_eq!(err.code(), ErrorCode::StorageUnavailable);
    assert!(
        credentials
            .list_all()
            .await
            .expect("list credentials")
            .is_empty()
    );
}

#[rstest]
#[tokio::test]
async fn expired_session_is_not_consumable(harness: Harness) {
    let ticket = harness
        .store
        .begin(&account("a@b.com"))
        .await
        .expect("begin succeeds");
    harness.clock.advance_minutes(61);

    let err = harness
        .store
        .consume(&ticket.state)
        .await
        .expect_err("expired state");
    assert_eq!(err.code(), ErrorCode::NotFound);
    assert!(harness.sessions.is_empty());
}
