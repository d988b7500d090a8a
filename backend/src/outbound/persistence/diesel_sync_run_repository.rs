//! PostgreSQL-backed `SyncRunRepository` implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::ports::{SyncRunRepository, SyncRunRepositoryError};
use crate::domain::{SyncRun, SyncRunId, SyncStatus};

use super::diesel_basic_error_mapping::{
    counter_from_db, counter_to_db, map_basic_diesel_error, map_basic_pool_error,
};
use super::models::{NewSyncRunRow, SyncRunCompletion, SyncRunRow};
use super::pool::{DbPool, PoolError};
use super::schema::sync_runs;

/// Diesel-backed implementation of the `SyncRunRepository` port.
#[derive(Clone)]
pub struct DieselSyncRunRepository {
    pool: DbPool,
}

impl DieselSyncRunRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> SyncRunRepositoryError {
    map_basic_pool_error(error, SyncRunRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> SyncRunRepositoryError {
    map_basic_diesel_error(
        error,
        SyncRunRepositoryError::query,
        SyncRunRepositoryError::connection,
    )
}

fn run_to_completion(run: &SyncRun) -> SyncRunCompletion<'_> {
    SyncRunCompletion {
        status: run.status.as_str(),
        vehicles_processed: counter_to_db(run.vehicles_processed),
        locations_updated: counter_to_db(run.locations_updated),
        errors_count: counter_to_db(run.errors_count),
        message: run.message.as_deref(),
        completed_at: run.completed_at,
    }
}

fn row_to_run(row: SyncRunRow) -> Result<SyncRun, SyncRunRepositoryError> {
    let status = SyncStatus::parse(&row.status).ok_or_else(|| {
        SyncRunRepositoryError::query(format!("invalid sync status: {}", row.status))
    })?;
    Ok(SyncRun {
        id: row.id,
        kind: row.kind,
        status,
        vehicles_processed: counter_from_db(row.vehicles_processed),
        locations_updated: counter_from_db(row.locations_updated),
        errors_count: counter_from_db(row.errors_count),
        message: row.message,
        started_at: row.started_at,
        completed_at: row.completed_at,
    })
}

#[async_trait]
impl SyncRunRepository for DieselSyncRunRepository {
    async fn open(
        &self,
        kind: &str,
        started_at: DateTime<Utc>,
    ) -> Result<SyncRunId, SyncRunRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::insert_into(sync_runs::table)
            .values(&NewSyncRunRow {
                kind,
                status: SyncStatus::Running.as_str(),
                started_at,
            })
            .returning(sync_runs::id)
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)
    }

    async fn finalize(&self, run: &SyncRun) -> Result<(), SyncRunRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let updated = diesel::update(sync_runs::table.filter(sync_runs::id.eq(run.id)))
            .set(&run_to_completion(run))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        if updated == 0 {
            return Err(SyncRunRepositoryError::query(format!(
                "sync run {} not found",
                run.id
            )));
        }
        Ok(())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<SyncRun>, SyncRunRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<SyncRunRow> = sync_runs::table
            .select(SyncRunRow::as_select())
            .order_by((sync_runs::started_at.desc(), sync_runs::id.desc()))
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(row_to_run).collect()
    }
}

#[cfg(test)]
mod tests {
    //! Row mapping coverage; query behaviour runs against PostgreSQL.
    use super::*;
    use crate::test_support::fixed_now;
    use rstest::rstest;

    fn row(status: &str) -> SyncRunRow {
        SyncRunRow {
            id: 3,
            kind: "vehicle_location_sync".to_owned(),
            status: status.to_owned(),
            vehicles_processed: 2,
            locations_updated: 1,
            errors_count: 1,
            message: Some("Processed 2 vehicles, updated 1 locations".to_owned()),
            started_at: fixed_now(),
            completed_at: Some(fixed_now()),
        }
    }

    #[rstest]
    fn rows_become_runs() {
        let run = row_to_run(row("completed_with_errors")).expect("row converts");
        assert_eq!(run.status, SyncStatus::CompletedWithErrors);
        assert_eq!(run.vehicles_processed, 2);
        assert_eq!(run.errors_count, 1);
    }

    #[rstest]
    fn unknown_status_is_rejected() {
        assert!(matches!(
            row_to_run(row("paused")),
            Err(SyncRunRepositoryError::Query { .. })
        ));
    }

    #[rstest]
    fn completion_carries_final_counters() {
        let run = row_to_run(row("failed")).expect("row converts");
        let completion = run_to_completion(&run);
        assert_eq!(completion.status, "failed");
        assert_eq!(completion.locations_updated, 1);
        assert_eq!(completion.completed_at, Some(fixed_now()));
    }
}
