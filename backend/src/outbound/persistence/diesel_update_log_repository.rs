//! PostgreSQL-backed `UpdateLogRepository` implementation.
//!
//! Field changes are stored as one JSONB object keyed by field name.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::dsl::{count_star, max};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::ports::{UpdateLogRepository, UpdateLogRepositoryError};
use crate::domain::{
    UpdateKind, UpdateLogDraft, UpdateLogEntry, UpdateLogQuery, UpdateSummary, VehicleId,
};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::models::{NewUpdateLogRow, UpdateLogRow};
use super::pool::{DbPool, PoolError};
use super::schema::vehicle_update_logs;

/// Diesel-backed implementation of the `UpdateLogRepository` port.
#[derive(Clone)]
pub struct DieselUpdateLogRepository {
    pool: DbPool,
}

impl DieselUpdateLogRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> UpdateLogRepositoryError {
    map_basic_pool_error(error, UpdateLogRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> UpdateLogRepositoryError {
    map_basic_diesel_error(
        error,
        UpdateLogRepositoryError::query,
        UpdateLogRepositoryError::connection,
    )
}

fn parse_kind(raw: &str) -> Result<UpdateKind, UpdateLogRepositoryError> {
    UpdateKind::parse(raw)
        .ok_or_else(|| UpdateLogRepositoryError::query(format!("invalid update type: {raw}")))
}

fn row_to_entry(row: UpdateLogRow) -> Result<UpdateLogEntry, UpdateLogRepositoryError> {
    let update_type = parse_kind(&row.update_type)?;
    let changes = serde_json::from_value(row.changes)
        .map_err(|err| UpdateLogRepositoryError::query(format!("invalid change set: {err}")))?;
    Ok(UpdateLogEntry {
        id: row.id,
        entry: UpdateLogDraft {
            vehicle_id: VehicleId::new(row.vehicle_id),
            update_type,
            old_value: row.old_value,
            new_value: row.new_value,
            changes,
            actor: row.actor,
            created_at: row.created_at,
        },
    })
}

fn summary_from_counts(
    raw_kind: &str,
    count: i64,
    last_update: Option<DateTime<Utc>>,
) -> Result<UpdateSummary, UpdateLogRepositoryError> {
    Ok(UpdateSummary {
        update_type: parse_kind(raw_kind)?,
        update_count: u64::try_from(count).unwrap_or(0),
        last_update,
    })
}

#[async_trait]
impl UpdateLogRepository for DieselUpdateLogRepository {
    async fn append(&self, entry: &UpdateLogDraft) -> Result<i64, UpdateLogRepositoryError> {
        let changes = serde_json::to_value(&entry.changes)
            .map_err(|err| UpdateLogRepositoryError::query(format!("encode change set: {err}")))?;
        let row = NewUpdateLogRow {
            vehicle_id: entry.vehicle_id.get(),
            update_type: entry.update_type.as_str(),
            old_value: entry.old_value.as_ref(),
            new_value: &entry.new_value,
            changes,
            actor: entry.actor.as_deref(),
            created_at: entry.created_at,
        };
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::insert_into(vehicle_update_logs::table)
            .values(&row)
            .returning(vehicle_update_logs::id)
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)
    }

    async fn query(
        &self,
        query: &UpdateLogQuery,
    ) -> Result<Vec<UpdateLogEntry>, UpdateLogRepositoryError> {
        let query = query.clamped();
        let mut statement = vehicle_update_logs::table
            .select(UpdateLogRow::as_select())
            .into_boxed();
        if let Some(vehicle_id) = query.vehicle_id {
            statement = statement.filter(vehicle_update_logs::vehicle_id.eq(vehicle_id.get()));
        }
        if let Some(kind) = query.update_type {
            statement = statement.filter(vehicle_update_logs::update_type.eq(kind.as_str()));
        }
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<UpdateLogRow> = statement
            .order_by(vehicle_update_logs::id.desc())
            .limit(i64::try_from(query.limit).unwrap_or(i64::MAX))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(row_to_entry).collect()
    }

    async fn summary(
        &self,
        vehicle_id: VehicleId,
    ) -> Result<Vec<UpdateSummary>, UpdateLogRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<(String, i64, Option<DateTime<Utc>>)> = vehicle_update_logs::table
            .filter(vehicle_update_logs::vehicle_id.eq(vehicle_id.get()))
            .group_by(vehicle_update_logs::update_type)
            .select((
                vehicle_update_logs::update_type,
                count_star(),
                max(vehicle_update_logs::created_at),
            ))
            .order_by(vehicle_update_logs::update_type)
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.iter()
            .map(|(kind, count, last)| summary_from_counts(kind, *count, *last))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    //! Row mapping coverage; query behaviour runs against PostgreSQL.
    use super::*;
    use crate::test_support::fixed_now;
    use rstest::rstest;
    use serde_json::json;

    fn row(update_type: &str, changes: serde_json::Value) -> UpdateLogRow {
        UpdateLogRow {
            id: 12,
            vehicle_id: 3,
            update_type: update_type.to_owned(),
            old_value: Some(json!({"state": "asleep"})),
            new_value: json!({"state": "online"}),
            changes,
            actor: Some("fleet@b.com".to_owned()),
            created_at: fixed_now(),
        }
    }

    #[rstest]
    fn rows_decode_field_changes() {
        let entry = row_to_entry(row(
            "vehicle_info",
            json!({"state": {"old": "asleep", "new": "online"}}),
        ))
        .expect("row converts");
        assert_eq!(entry.id, 12);
        assert_eq!(entry.entry.update_type, UpdateKind::VehicleInfo);
        assert_eq!(entry.entry.changed_fields(), vec!["state".to_owned()]);
        assert!(!entry.entry.is_creation());
    }

    #[rstest]
    #[case::kind("odometer", json!({}))]
    #[case::changes("location", json!(["not", "a", "map"]))]
    fn malformed_rows_are_query_errors(
        #[case] update_type: &str,
        #[case] changes: serde_json::Value,
    ) {
        assert!(matches!(
            row_to_entry(row(update_type, changes)),
            Err(UpdateLogRepositoryError::Query { .. })
        ));
    }

    #[rstest]
    fn summaries_keep_counts_and_last_update() {
        let summary =
            summary_from_counts("location", 4, Some(fixed_now())).expect("summary converts");
        assert_eq!(summary.update_type, UpdateKind::Location);
        assert_eq!(summary.update_count, 4);
        assert_eq!(summary.last_update, Some(fixed_now()));
    }
}
