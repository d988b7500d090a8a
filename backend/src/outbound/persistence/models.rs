//! Internal Diesel row structs for database operations.
//!
//! These types are implementation details of the persistence layer and must
//! never be exposed to the domain. Conversions to and from domain types live
//! beside the repository that uses them.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use super::schema::{
    auth_handshake_sessions, credentials, lease_history, leases, sync_runs, vehicle_locations,
    vehicle_update_logs, vehicles,
};

// ---------------------------------------------------------------------------
// Lease models
// ---------------------------------------------------------------------------

/// Row struct for the leases table; also used for inserts.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = leases)]
#[diesel(primary_key(account))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct LeaseRow {
    pub account: String,
    pub vehicle_id: i64,
    pub created_at: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub allowed_commands: Vec<String>,
}

/// Row struct for reading from the lease_history table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = lease_history)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct LeaseHistoryRow {
    #[expect(dead_code, reason = "surrogate key; ordering uses recorded_at")]
    pub id: i64,
    pub account: String,
    pub vehicle_id: i64,
    pub created_at: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub allowed_commands: Vec<String>,
    pub terminal_status: String,
    pub recorded_at: DateTime<Utc>,
}

/// Insertable struct for lease history snapshots.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = lease_history)]
pub(crate) struct NewLeaseHistoryRow<'a> {
    pub account: &'a str,
    pub vehicle_id: i64,
    pub created_at: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub allowed_commands: Vec<String>,
    pub terminal_status: &'a str,
    pub recorded_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Handshake models
// ---------------------------------------------------------------------------

/// Row struct for the auth_handshake_sessions table; also used for inserts.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = auth_handshake_sessions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct HandshakeSessionRow {
    pub session_id: Uuid,
    pub state: String,
    pub code_verifier: String,
    pub account: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Credential models
// ---------------------------------------------------------------------------

/// Row struct for reading from the credentials table.
#[derive(Clone, Queryable, Selectable)]
#[diesel(table_name = credentials)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct CredentialRow {
    pub account: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Insertable and changeset struct for credential upserts.
#[derive(Clone, Insertable, AsChangeset)]
#[diesel(table_name = credentials)]
#[diesel(primary_key(account))]
pub(crate) struct NewCredentialRow<'a> {
    pub account: &'a str,
    pub access_token: &'a str,
    pub refresh_token: &'a str,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Vehicle models
// ---------------------------------------------------------------------------

/// Row struct for the vehicles table; also used for inserts.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = vehicles)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct VehicleRow {
    pub vehicle_id: i64,
    pub display_name: Option<String>,
    pub vin: Option<String>,
    pub state: String,
    pub color: Option<String>,
    pub option_codes: Option<String>,
    pub api_version: Option<i32>,
    pub in_service: bool,
    pub owner_account: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Changeset applied when a vehicle row already exists; leaves `created_at`
/// untouched.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = vehicles)]
#[diesel(treat_none_as_null = true)]
pub(crate) struct VehicleUpdate<'a> {
    pub display_name: Option<&'a str>,
    pub vin: Option<&'a str>,
    pub state: &'a str,
    pub color: Option<&'a str>,
    pub option_codes: Option<&'a str>,
    pub api_version: Option<i32>,
    pub in_service: bool,
    pub owner_account: Option<&'a str>,
    pub updated_at: DateTime<Utc>,
}

/// Row struct for the vehicle_locations table; also used for inserts.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = vehicle_locations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct LocationRow {
    pub vehicle_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub heading: Option<i32>,
    pub speed: Option<f64>,
    pub power: Option<f64>,
    pub shift_state: Option<String>,
    pub gps_as_of: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Changeset applied when a location row already exists.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = vehicle_locations)]
#[diesel(treat_none_as_null = true)]
pub(crate) struct LocationUpdate<'a> {
    pub latitude: f64,
    pub longitude: f64,
    pub heading: Option<i32>,
    pub speed: Option<f64>,
    pub power: Option<f64>,
    pub shift_state: Option<&'a str>,
    pub gps_as_of: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Update log models
// ---------------------------------------------------------------------------

/// Row struct for reading from the vehicle_update_logs table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = vehicle_update_logs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct UpdateLogRow {
    pub id: i64,
    pub vehicle_id: i64,
    pub update_type: String,
    pub old_value: Option<serde_json::Value>,
    pub new_value: serde_json::Value,
    pub changes: serde_json::Value,
    pub actor: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insertable struct for change-log entries.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = vehicle_update_logs)]
pub(crate) struct NewUpdateLogRow<'a> {
    pub vehicle_id: i64,
    pub update_type: &'a str,
    pub old_value: Option<&'a serde_json::Value>,
    pub new_value: &'a serde_json::Value,
    pub changes: serde_json::Value,
    pub actor: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Sync run models
// ---------------------------------------------------------------------------

/// Row struct for reading from the sync_runs table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = sync_runs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct SyncRunRow {
    pub id: i64,
    pub kind: String,
    pub status: String,
    pub vehicles_processed: i32,
    pub locations_updated: i32,
    pub errors_count: i32,
    pub message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Insertable struct for opening a sync run.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = sync_runs)]
pub(crate) struct NewSyncRunRow<'a> {
    pub kind: &'a str,
    pub status: &'a str,
    pub started_at: DateTime<Utc>,
}

/// Changeset written when a sync run finishes.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = sync_runs)]
pub(crate) struct SyncRunCompletion<'a> {
    pub status: &'a str,
    pub vehicles_processed: i32,
    pub locations_updated: i32,
    pub errors_count: i32,
    pub message: Option<&'a str>,
    pub completed_at: Option<DateTime<Utc>>,
}
