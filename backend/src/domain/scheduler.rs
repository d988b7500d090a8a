//! Fixed-interval background jobs.
//!
//! Each job runs on its own Tokio task driven by an interval whose first tick
//! fires immediately. Missed ticks are skipped. Shutdown stops future ticks
//! and waits for any tick already running to finish.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use super::{AuthHandshakeStore, SyncEngine, SyncMethod, SyncOutcome, TokenStore};

/// Fallback period used when a zero period is configured.
const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Set of periodic tasks sharing one shutdown signal.
pub struct Scheduler {
    shutdown: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Create a scheduler with no tasks.
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            tasks: Vec::new(),
        }
    }

    /// Number of tasks started.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Run `job` now and then every `period` until shutdown.
    pub fn every<F, Fut>(&mut self, name: &'static str, period: Duration, mut job: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let period = if period.is_zero() {
            warn!(task = name, "zero period configured; using one second");
            MIN_PERIOD
        } else {
            period
        };
        let mut stop = self.shutdown.subscribe();
        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        debug!(task = name, "periodic task tick");
                        job().await;
                    }
                }
            }
            debug!(task = name, "periodic task stopped");
        });
        self.tasks.push((name, task));
    }

    /// Stop scheduling and wait for running ticks to finish.
    pub async fn shutdown(self) {
        // Send fails only when every task has already exited.
        let _ = self.shutdown.send(true);
        for (name, task) in self.tasks {
            if let Err(error) = task.await {
                warn!(task = name, error = %error, "periodic task ended abnormally");
            }
        }
        info!("background jobs stopped");
    }
}

/// Intervals of the background jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Period of fleet syncs.
    pub sync_interval: Duration,
    /// Method used by scheduled syncs.
    pub sync_method: SyncMethod,
    /// Period of the credential refresh sweep.
    pub refresh_sweep_interval: Duration,
    /// Period of the expired-handshake sweep.
    pub handshake_sweep_interval: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(5 * 60),
            sync_method: SyncMethod::Direct,
            refresh_sweep_interval: Duration::from_secs(60 * 60),
            handshake_sweep_interval: Duration::from_secs(15 * 60),
        }
    }
}

/// Components driven by the scheduler.
#[derive(Clone)]
pub struct BackgroundJobs {
    /// Fleet sync.
    pub sync: SyncEngine,
    /// Credential refresh sweep.
    pub tokens: TokenStore,
    /// Expired handshake cleanup.
    pub handshakes: AuthHandshakeStore,
}

impl BackgroundJobs {
    /// Start every job on the current Tokio runtime.
    pub fn spawn(self, config: ScheduleConfig) -> Scheduler {
        let mut scheduler = Scheduler::new();

        let sync = self.sync;
        let method = config.sync_method;
        scheduler.every("vehicle_sync", config.sync_interval, move || {
            let sync = sync.clone();
            async move {
                if let SyncOutcome::AlreadyRunning = sync.run_once(method).await {
                    debug!("scheduled sync skipped; previous run still in progress");
                }
            }
        });

        let tokens = self.tokens;
        scheduler.every(
            "credential_refresh",
            config.refresh_sweep_interval,
            move || {
                let tokens = tokens.clone();
                async move {
                    if let Err(error) = tokens.refresh_due().await {
                        warn!(error = %error, "credential refresh sweep failed");
                    }
                }
            },
        );

        let handshakes = self.handshakes;
        scheduler.every(
            "handshake_sweep",
            config.handshake_sweep_interval,
            move || {
                let handshakes = handshakes.clone();
                async move {
                    if let Err(error) = handshakes.sweep_expired().await {
                        warn!(error = %error, "handshake sweep failed");
                    }
                }
            },
        );

        info!(
            sync_interval_secs = config.sync_interval.as_secs(),
            refresh_interval_secs = config.refresh_sweep_interval.as_secs(),
            handshake_interval_secs = config.handshake_sweep_interval.as_secs(),
            "background jobs started"
        );
        scheduler
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
