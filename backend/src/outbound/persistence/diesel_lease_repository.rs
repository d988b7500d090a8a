//! PostgreSQL-backed lease and lease-history adapters.
//!
//! `replace` reads and overwrites the account's row inside one transaction
//! so the returned previous lease is the one actually overwritten.
//! `delete_if_expired` carries the expiry check in its `WHERE` clause; a
//! lease rewritten concurrently with a fresh window is left alone.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::AsyncConnection as _;
use diesel_async::RunQueryDsl;
use diesel_async::scoped_futures::ScopedFutureExt as _;

use crate::domain::ports::{
    LeaseHistoryRepository, LeaseHistoryRepositoryError, LeaseRepository, LeaseRepositoryError,
};
use crate::domain::{
    AccountId, CommandName, Lease, LeaseDraft, LeaseHistoryEntry, LeaseStatus, VehicleId,
};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::models::{LeaseHistoryRow, LeaseRow, NewLeaseHistoryRow};
use super::pool::{DbPool, PoolError};
use super::schema::{lease_history, leases};

/// Diesel-backed implementation of the `LeaseRepository` port.
#[derive(Clone)]
pub struct DieselLeaseRepository {
    pool: DbPool,
}

impl DieselLeaseRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> LeaseRepositoryError {
    map_basic_pool_error(error, LeaseRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> LeaseRepositoryError {
    map_basic_diesel_error(
        error,
        LeaseRepositoryError::query,
        LeaseRepositoryError::connection,
    )
}

fn lease_to_row(lease: &Lease) -> LeaseRow {
    LeaseRow {
        account: lease.account().to_string(),
        vehicle_id: lease.vehicle_id().get(),
        created_at: lease.created_at(),
        start_time: lease.start_time(),
        end_time: lease.end_time(),
        allowed_commands: lease
            .allowed_commands()
            .iter()
            .map(ToString::to_string)
            .collect(),
    }
}

fn lease_from_row(row: LeaseRow) -> Result<Lease, String> {
    let account = AccountId::new(&row.account)
        .map_err(|err| format!("invalid lease account in database: {err}"))?;
    let allowed_commands = row
        .allowed_commands
        .iter()
        .map(CommandName::new)
        .collect::<Result<_, _>>()
        .map_err(|err| format!("invalid lease command in database: {err}"))?;
    Lease::new(LeaseDraft {
        account,
        vehicle_id: VehicleId::new(row.vehicle_id),
        created_at: row.created_at,
        start_time: row.start_time,
        end_time: row.end_time,
        allowed_commands,
    })
    .map_err(|err| format!("invalid lease row in database: {err}"))
}

fn row_to_lease(row: LeaseRow) -> Result<Lease, LeaseRepositoryError> {
    lease_from_row(row).map_err(LeaseRepositoryError::query)
}

fn optional_lease(row: Option<LeaseRow>) -> Result<Option<Lease>, LeaseRepositoryError> {
    row.map(row_to_lease).transpose()
}

#[async_trait]
impl LeaseRepository for DieselLeaseRepository {
    async fn find(&self, account: &AccountId) -> Result<Option<Lease>, LeaseRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<LeaseRow> = leases::table
            .filter(leases::account.eq(account.as_ref()))
            .select(LeaseRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        optional_lease(row)
    }

    async fn replace(&self, lease: &Lease) -> Result<Option<Lease>, LeaseRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = lease_to_row(lease);
        let previous: Option<LeaseRow> = conn
            .transaction(|conn| {
                async move {
                    let previous = leases::table
                        .filter(leases::account.eq(&row.account))
                        .select(LeaseRow::as_select())
                        .for_update()
                        .first(conn)
                        .await
                        .optional()?;
                    diesel::insert_into(leases::table)
                        .values(&row)
                        .on_conflict(leases::account)
                        .do_update()
                        .set(&row)
                        .execute(conn)
                        .await?;
                    Ok(previous)
                }
                .scope_boxed()
            })
            .await
            .map_err(map_diesel_error)?;
        optional_lease(previous)
    }

    async fn delete(&self, account: &AccountId) -> Result<Option<Lease>, LeaseRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<LeaseRow> =
            diesel::delete(leases::table.filter(leases::account.eq(account.as_ref())))
                .returning(LeaseRow::as_returning())
                .get_result(&mut conn)
                .await
                .optional()
                .map_err(map_diesel_error)?;
        optional_lease(row)
    }

    async fn delete_if_expired(
        &self,
        account: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<Option<Lease>, LeaseRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<LeaseRow> = diesel::delete(
            leases::table
                .filter(leases::account.eq(account.as_ref()))
                .filter(leases::end_time.lt(now)),
        )
        .returning(LeaseRow::as_returning())
        .get_result(&mut conn)
        .await
        .optional()
        .map_err(map_diesel_error)?;
        optional_lease(row)
    }
}

/// Diesel-backed implementation of the `LeaseHistoryRepository` port.
#[derive(Clone)]
pub struct DieselLeaseHistoryRepository {
    pool: DbPool,
}

impl DieselLeaseHistoryRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_history_pool_error(error: PoolError) -> LeaseHistoryRepositoryError {
    map_basic_pool_error(error, LeaseHistoryRepositoryError::connection)
}

fn map_history_diesel_error(error: diesel::result::Error) -> LeaseHistoryRepositoryError {
    map_basic_diesel_error(
        error,
        LeaseHistoryRepositoryError::query,
        LeaseHistoryRepositoryError::connection,
    )
}

fn row_to_history(row: LeaseHistoryRow) -> Result<LeaseHistoryEntry, LeaseHistoryRepositoryError> {
    let terminal_status = LeaseStatus::parse(&row.terminal_status).ok_or_else(|| {
        LeaseHistoryRepositoryError::query(format!(
            "invalid terminal status in database: {}",
            row.terminal_status
        ))
    })?;
    let recorded_at = row.recorded_at;
    let lease = lease_from_row(LeaseRow {
        account: row.account,
        vehicle_id: row.vehicle_id,
        created_at: row.created_at,
        start_time: row.start_time,
        end_time: row.end_time,
        allowed_commands: row.allowed_commands,
    })
    .map_err(LeaseHistoryRepositoryError::query)?;
    Ok(LeaseHistoryEntry {
        lease,
        terminal_status,
        recorded_at,
    })
}

#[async_trait]
impl LeaseHistoryRepository for DieselLeaseHistoryRepository {
    async fn append(&self, entry: &LeaseHistoryEntry) -> Result<(), LeaseHistoryRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_history_pool_error)?;
        let lease = lease_to_row(&entry.lease);
        let row = NewLeaseHistoryRow {
            account: &lease.account,
            vehicle_id: lease.vehicle_id,
            created_at: lease.created_at,
            start_time: lease.start_time,
            end_time: lease.end_time,
            allowed_commands: lease.allowed_commands.clone(),
            terminal_status: entry.terminal_status.as_str(),
            recorded_at: entry.recorded_at,
        };
        diesel::insert_into(lease_history::table)
            .values(&row)
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_history_diesel_error)
    }

    async fn list_for_account(
        &self,
        account: &AccountId,
        limit: usize,
    ) -> Result<Vec<LeaseHistoryEntry>, LeaseHistoryRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_history_pool_error)?;
        let rows: Vec<LeaseHistoryRow> = lease_history::table
            .filter(lease_history::account.eq(account.as_ref()))
            .select(LeaseHistoryRow::as_select())
            .order_by((lease_history::recorded_at.desc(), lease_history::id.desc()))
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .load(&mut conn)
            .await
            .map_err(map_history_diesel_error)?;
        rows.into_iter().map(row_to_history).collect()
    }
}
