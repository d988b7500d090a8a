//! Port for the append-only vehicle change log.

use async_trait::async_trait;

use crate::domain::{UpdateLogDraft, UpdateLogEntry, UpdateLogQuery, UpdateSummary, VehicleId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by update log adapters.
    pub enum UpdateLogRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "update log connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "update log query failed: {message}",
    }
}

/// Port for appending and reading change-log entries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UpdateLogRepository: Send + Sync {
    /// Append an entry, returning its storage identifier.
    async fn append(&self, entry: &UpdateLogDraft) -> Result<i64, UpdateLogRepositoryError>;

    /// Read entries matching `query`, most recent first.
    async fn query(
        &self,
        query: &UpdateLogQuery,
    ) -> Result<Vec<UpdateLogEntry>, UpdateLogRepositoryError>;

    /// Per-projection counts for one vehicle.
    async fn summary(
        &self,
        vehicle_id: VehicleId,
    ) -> Result<Vec<UpdateSummary>, UpdateLogRepositoryError>;
}

/// Fixture log that accepts and forgets every entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureUpdateLogRepository;

#[async_trait]
impl UpdateLogRepository for FixtureUpdateLogRepository {
    async fn append(&self, _entry: &UpdateLogDraft) -> Result<i64, UpdateLogRepositoryError> {
        Ok(0)
    }

    async fn query(
        &self,
        _query: &UpdateLogQuery,
    ) -> Result<Vec<UpdateLogEntry>, UpdateLogRepositoryError> {
        Ok(Vec::new())
    }

    async fn summary(
        &self,
        _vehicle_id: VehicleId,
    ) -> Result<Vec<UpdateSummary>, UpdateLogRepositoryError> {
        Ok(Vec::new())
    }
}
