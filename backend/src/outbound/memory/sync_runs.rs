//! In-memory sync run repository.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::ports::{SyncRunRepository, SyncRunRepositoryError};
use crate::domain::{SyncRun, SyncRunId, SyncStatus};

use super::lock;

/// Sync runs in open order.
#[derive(Debug, Default)]
pub struct InMemorySyncRunRepository {
    runs: Mutex<Vec<SyncRun>>,
}

impl InMemorySyncRunRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every run in open order.
    pub fn runs(&self) -> Vec<SyncRun> {
        lock(&self.runs).clone()
    }
}

#[async_trait]
impl SyncRunRepository for InMemorySyncRunRepository {
    async fn open(
        &self,
        kind: &str,
        started_at: DateTime<Utc>,
    ) -> Result<SyncRunId, SyncRunRepositoryError> {
        let mut runs = lock(&self.runs);
        let id = SyncRunId::try_from(runs.len())
            .map_err(|err| SyncRunRepositoryError::query(err.to_string()))?
            + 1;
        runs.push(SyncRun {
            id,
            kind: kind.to_owned(),
            status: SyncStatus::Running,
            vehicles_processed: 0,
            locations_updated: 0,
            errors_count: 0,
            message: None,
            started_at,
            completed_at: None,
        });
        Ok(id)
    }

    async fn finalize(&self, run: &SyncRun) -> Result<(), SyncRunRepositoryError> {
        let mut runs = lock(&self.runs);
        let Some(stored) = runs.iter_mut().find(|stored| stored.id == run.id) else {
            return Err(SyncRunRepositoryError::query(format!(
                "sync run {} does not exist",
                run.id
            )));
        };
        *stored = run.clone();
        Ok(())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<SyncRun>, SyncRunRepositoryError> {
        Ok(lock(&self.runs).iter().rev().take(limit).cloned().collect())
    }
}
