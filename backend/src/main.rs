//! Rental worker entry-point: applies migrations, wires the PostgreSQL and
//! HTTP adapters into the domain services, and runs the background jobs until
//! interrupted.

use std::sync::Arc;

use color_eyre::eyre::{Context, Result, eyre};
use mockable::{Clock, DefaultClock};
use ortho_config::OrthoConfig as _;
use tracing::info;

use rental_core::domain::{
    AuthHandshakeStore, BackgroundJobs, SyncEngine, SyncEnginePorts, TokenStore, TokioSleeper,
    VehicleCache,
};
use rental_core::outbound::fleet_api::HttpVehicleApi;
use rental_core::outbound::persistence::{
    DbPool, DieselCredentialRepository, DieselHandshakeSessionRepository,
    DieselSyncRunRepository, DieselUpdateLogRepository, DieselVehicleRepository,
    run_pending_async,
};
use rental_core::outbound::relay::HttpTelemetryRelay;
use rental_core::settings::RentalCoreSettings;
use rental_core::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let settings = RentalCoreSettings::load_from_iter(std::env::args_os())
        .map_err(|err| eyre!("failed to load settings: {err}"))?;
    let pool_config = settings.pool_config()?;
    let applied = run_pending_async(pool_config.database_url().to_owned())
        .await
        .wrap_err("failed to migrate database")?;
    info!(applied, "database ready");
    let pool = DbPool::new(pool_config)
        .await
        .wrap_err("failed to build database pool")?;

    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let call_timeout = settings.call_timeout();
    let vehicle_api = Arc::new(
        HttpVehicleApi::new(settings.vehicle_api_endpoints()?, call_timeout)
            .wrap_err("failed to build vehicle API client")?,
    );
    let relay = Arc::new(
        HttpTelemetryRelay::new(settings.relay_base()?, call_timeout)
            .wrap_err("failed to build relay client")?,
    );

    let tokens = TokenStore::new(
        Arc::new(DieselCredentialRepository::new(pool.clone())),
        vehicle_api.clone(),
        Arc::clone(&clock),
        settings.token_store_config()?,
    );
    let handshakes = AuthHandshakeStore::new(
        Arc::new(DieselHandshakeSessionRepository::new(pool.clone())),
        Arc::clone(&clock),
        settings.handshake_config()?,
    );
    let cache = VehicleCache::new(
        Arc::new(DieselVehicleRepository::new(pool.clone())),
        Arc::new(DieselUpdateLogRepository::new(pool.clone())),
        Arc::clone(&clock),
        settings.vehicle_cache_config()?,
    );
    let sync = SyncEngine::new(
        SyncEnginePorts {
            vehicle_api,
            relay,
            sync_runs: Arc::new(DieselSyncRunRepository::new(pool)),
        },
        tokens.clone(),
        cache.clone(),
        clock,
        Arc::new(TokioSleeper),
        settings.sync_config()?,
    );

    let scheduler = BackgroundJobs {
        sync,
        tokens,
        handshakes,
    }
    .spawn(settings.schedule_config()?);
    info!(tasks = scheduler.task_count(), "rental worker started");

    tokio::signal::ctrl_c()
        .await
        .wrap_err("failed to listen for shutdown signal")?;
    info!("shutdown requested");
    scheduler.shutdown().await;
    cache.flush().await;
    Ok(())
}
