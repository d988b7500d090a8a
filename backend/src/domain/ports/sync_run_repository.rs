//! Port for sync run bookkeeping.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{SyncRun, SyncRunId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by sync run adapters.
    pub enum SyncRunRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "sync run repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "sync run repository query failed: {message}",
    }
}

/// Port for opening, finalizing, and listing sync runs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SyncRunRepository: Send + Sync {
    /// Open a run in `running` state.
    async fn open(
        &self,
        kind: &str,
        started_at: DateTime<Utc>,
    ) -> Result<SyncRunId, SyncRunRepositoryError>;

    /// Write the final counters and status of a run.
    async fn finalize(&self, run: &SyncRun) -> Result<(), SyncRunRepositoryError>;

    /// List recent runs, most recent first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<SyncRun>, SyncRunRepositoryError>;
}
