//! Shared wiring for the rental integration tests.
//!
//! Integration tests compile as separate crates under `backend/tests/`. This
//! module builds the full service graph over the in-memory adapters and the
//! scriptable upstream fakes so each test file only scripts what it needs.

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use rental_core::domain::ports::FixtureIdentityProvider;
use rental_core::domain::{
    AccountId, AuthHandshakeStore, CallbackExchange, Credential, GatewayConfig, GatewayPorts,
    HandshakeConfig, LeaseManager, LeasePolicy, SyncConfig, SyncEngine, SyncEnginePorts,
    TokenStore, TokenStoreConfig, VehicleCache, VehicleCacheConfig, VehicleCommandGateway,
};
use rental_core::outbound::memory::{
    InMemoryCredentialRepository, InMemoryHandshakeSessionRepository,
    InMemoryLeaseHistoryRepository, InMemoryLeaseRepository, InMemorySyncRunRepository,
    InMemoryUpdateLogRepository, InMemoryVehicleRepository,
};
use rental_core::test_support::fakes::{FakeTelemetryRelay, FakeVehicleApi};
use rental_core::test_support::{MutableClock, RecordingSleeper, account, fixed_now};

/// Account whose credential drives the fleet in every scenario.
pub const FLEET_ACCOUNT: &str = "fleet@example.com";

/// Knobs that differ between scenarios.
#[derive(Default)]
pub struct HarnessOptions {
    /// Vehicle API script.
    pub api: FakeVehicleApi,
    /// Relay script.
    pub relay: FakeTelemetryRelay,
    /// Authorize commands without sending them.
    pub dry_run: bool,
}

/// Every service and adapter of one scenario.
pub struct Harness {
    pub clock: Arc<MutableClock>,
    pub api: Arc<FakeVehicleApi>,
    pub relay: Arc<FakeTelemetryRelay>,
    pub sleeper: Arc<RecordingSleeper>,
    pub history: Arc<InMemoryLeaseHistoryRepository>,
    pub sessions: Arc<InMemoryHandshakeSessionRepository>,
    pub update_logs: Arc<InMemoryUpdateLogRepository>,
    pub sync_runs: Arc<InMemorySyncRunRepository>,
    pub tokens: TokenStore,
    pub handshakes: AuthHandshakeStore,
    pub exchange: CallbackExchange,
    pub cache: VehicleCache,
    pub gateway: VehicleCommandGateway,
    pub sync: SyncEngine,
}

impl Harness {
    /// Wire a scenario. Must run inside a Tokio runtime.
    pub fn new(options: HarnessOptions) -> Self {
        let clock = Arc::new(MutableClock::new(fixed_now()));
        let api = Arc::new(options.api);
        let relay = Arc::new(options.relay);
        let sleeper = Arc::new(RecordingSleeper::default());
        let history = Arc::new(InMemoryLeaseHistoryRepository::new());
        let sessions = Arc::new(InMemoryHandshakeSessionRepository::new());
        let update_logs = Arc::new(InMemoryUpdateLogRepository::new());
        let sync_runs = Arc::new(InMemorySyncRunRepository::new());

        let tokens = TokenStore::new(
            Arc::new(InMemoryCredentialRepository::new()),
            api.clone(),
            clock.clone(),
            TokenStoreConfig::default(),
        );
        let handshakes = AuthHandshakeStore::new(
            sessions.clone(),
            clock.clone(),
            HandshakeConfig::default(),
        );
        let exchange = CallbackExchange::new(
            handshakes.clone(),
            tokens.clone(),
            api.clone(),
            clock.clone(),
            Duration::from_secs(5),
        );
        let cache = VehicleCache::new(
            Arc::new(InMemoryVehicleRepository::new()),
            update_logs.clone(),
            clock.clone(),
            VehicleCacheConfig::default(),
        );
        let leases = LeaseManager::new(
            Arc::new(InMemoryLeaseRepository::new()),
            history.clone(),
            clock.clone(),
            LeasePolicy::default(),
        );
        let gateway = VehicleCommandGateway::new(
            GatewayPorts {
                identity: Arc::new(FixtureIdentityProvider),
                vehicle_api: api.clone(),
            },
            leases,
            tokens.clone(),
            GatewayConfig {
                dry_run: options.dry_run,
                ..GatewayConfig::for_account(fleet())
            },
        );
        let sync = SyncEngine::new(
            SyncEnginePorts {
                vehicle_api: api.clone(),
                relay: relay.clone(),
                sync_runs: sync_runs.clone(),
            },
            tokens.clone(),
            cache.clone(),
            clock.clone(),
            sleeper.clone(),
            SyncConfig::for_account(fleet()),
        );

        Self {
            clock,
            api,
            relay,
            sleeper,
            history,
            sessions,
            update_logs,
            sync_runs,
            tokens,
            handshakes,
            exchange,
            cache,
            gateway,
            sync,
        }
    }

    /// Store a fleet credential valid for `lifetime` from now.
    pub async fn seed_fleet_credential(&self, lifetime: TimeDelta) {
        let credential = Credential::new(
            "fleet-access",
            "fleet-refresh",
            fixed_now() + lifetime,
        );
        self.tokens
            .save(&fleet(), credential)
            .await
            .expect("fleet credential saved");
    }
}

/// The fleet account.
pub fn fleet() -> AccountId {
    account(FLEET_ACCOUNT)
}
