//! Diesel table definitions for the PostgreSQL schema.
//!
//! These definitions must match `backend/migrations` exactly. Regenerate with
//! `diesel print-schema` after changing a migration.

diesel::table! {
    /// Live leases, one row per account.
    leases (account) {
        /// Lease key: the renting account.
        account -> Varchar,
        /// Leased vehicle.
        vehicle_id -> Int8,
        created_at -> Timestamptz,
        start_time -> Timestamptz,
        end_time -> Timestamptz,
        /// Commands the lease permits, lowercase.
        allowed_commands -> Array<Text>,
    }
}

diesel::table! {
    /// Append-only snapshots of leases that left the live table.
    lease_history (id) {
        id -> Int8,
        account -> Varchar,
        vehicle_id -> Int8,
        created_at -> Timestamptz,
        start_time -> Timestamptz,
        end_time -> Timestamptz,
        allowed_commands -> Array<Text>,
        /// `ended` or `expired`.
        terminal_status -> Varchar,
        recorded_at -> Timestamptz,
    }
}

diesel::table! {
    /// Staged OAuth handshakes awaiting their callback.
    auth_handshake_sessions (session_id) {
        session_id -> Uuid,
        /// Anti-forgery state; unique across live sessions.
        state -> Varchar,
        code_verifier -> Text,
        account -> Varchar,
        created_at -> Timestamptz,
        expires_at -> Timestamptz,
    }
}

diesel::table! {
    /// Vehicle-API credentials, one row per account.
    credentials (account) {
        account -> Varchar,
        access_token -> Text,
        refresh_token -> Text,
        expires_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Last-known vehicle metadata.
    vehicles (vehicle_id) {
        vehicle_id -> Int8,
        display_name -> Nullable<Varchar>,
        vin -> Nullable<Varchar>,
        /// `online`, `asleep`, `offline`, or `unknown`.
        state -> Varchar,
        color -> Nullable<Varchar>,
        option_codes -> Nullable<Text>,
        api_version -> Nullable<Int4>,
        in_service -> Bool,
        owner_account -> Nullable<Varchar>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Latest location sample per vehicle.
    vehicle_locations (vehicle_id) {
        vehicle_id -> Int8,
        latitude -> Float8,
        longitude -> Float8,
        heading -> Nullable<Int4>,
        speed -> Nullable<Float8>,
        power -> Nullable<Float8>,
        shift_state -> Nullable<Varchar>,
        gps_as_of -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Field-level change log for `vehicles` and `vehicle_locations`.
    vehicle_update_logs (id) {
        id -> Int8,
        vehicle_id -> Int8,
        /// `vehicle_info` or `location`.
        update_type -> Varchar,
        old_value -> Nullable<Jsonb>,
        new_value -> Jsonb,
        changes -> Jsonb,
        actor -> Nullable<Varchar>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Bookkeeping for each sync run.
    sync_runs (id) {
        id -> Int8,
        kind -> Varchar,
        status -> Varchar,
        vehicles_processed -> Int4,
        locations_updated -> Int4,
        errors_count -> Int4,
        message -> Nullable<Text>,
        started_at -> Timestamptz,
        completed_at -> Nullable<Timestamptz>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(vehicles, vehicle_locations);
