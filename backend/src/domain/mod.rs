//! Domain primitives, services, and ports.
//!
//! Purpose: hold the rental rules (leases, handshakes, credentials, vehicle
//! cache, sync) independent of storage and transport. Services depend only on
//! the traits in [`ports`]; adapters live in `crate::outbound`.
//!
//! Public surface:
//! - Error / ErrorCode / DenialReason: the error taxonomy every service
//!   returns.
//! - LeaseManager: lease lifecycle and command authorization.
//! - AuthHandshakeStore / CallbackExchange: OAuth staged authorization.
//! - TokenStore: per-account vehicle-API credentials.
//! - VehicleCache: last-known vehicle state with a change log.
//! - SyncEngine / Scheduler: background fleet synchronisation.
//! - VehicleCommandGateway: identity-checked, lease-checked commands.

pub mod command_gateway;
pub mod credentials;
pub mod error;
pub mod handshake;
pub mod identity;
pub mod lease;
pub mod ports;
pub mod runtime;
pub mod scheduler;
pub mod sync;
pub(crate) mod upstream;
pub mod vehicle;
pub mod vehicle_cache;

pub use self::command_gateway::{
    CommandOutcome, GatewayConfig, GatewayPorts, VehicleCommandGateway,
};
pub use self::credentials::{
    Credential, CredentialCache, RefreshSweepReport, StoredCredential, TokenGrant, TokenStore,
    TokenStoreConfig,
};
pub use self::error::{DenialReason, Error, ErrorCode};
pub use self::handshake::{
    AuthHandshakeStore, CallbackExchange, HandshakeConfig, HandshakeSession, HandshakeTicket,
    HandshakeTokenSource, OsRngTokenSource, pkce_challenge,
};
pub use self::identity::{AccountId, CommandName, IdentityValidationError, VehicleId};
pub use self::lease::{
    DEFAULT_ALLOWED_COMMANDS, Lease, LeaseDraft, LeaseHistoryEntry, LeaseManager, LeasePolicy,
    LeaseStart, LeaseStatus, LeaseValidationError, OverwritePolicy,
};
pub use self::runtime::{Sleeper, TokioSleeper};
pub use self::scheduler::{BackgroundJobs, ScheduleConfig, Scheduler};
pub use self::sync::{
    SyncConfig, SyncEngine, SyncEnginePorts, SyncMethod, SyncOutcome, SyncReport, SyncRun,
    SyncRunId, SyncStatus, SyncTally,
};
pub use self::vehicle::{
    DEFAULT_LOG_QUERY_LIMIT, FieldChange, LocationSample, MAX_LOG_QUERY_LIMIT, UpdateKind,
    UpdateLogDraft, UpdateLogEntry, UpdateLogQuery, UpdateSummary, VehicleRecord, VehicleState,
};
pub use self::vehicle_cache::{
    CacheRead, CachedValue, LogDeliveryStats, UpdateLogDispatcher, VehicleCache,
    VehicleCacheConfig,
};
