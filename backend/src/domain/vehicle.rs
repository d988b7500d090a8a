//! Vehicle metadata, location samples, and the change log built from them.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AccountId, VehicleId};

/// Connectivity state reported by the vehicle API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleState {
    /// Reachable and awake.
    Online,
    /// Reachable only after a wake request.
    Asleep,
    /// Not reachable; a wake request may bring it back.
    Offline,
    /// Any state the API reports that is not modelled here.
    Unknown,
}

impl VehicleState {
    /// Lenient parse of the API's state string.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "online" => Self::Online,
            "asleep" => Self::Asleep,
            "offline" => Self::Offline,
            _ => Self::Unknown,
        }
    }

    /// Storage identifier.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Asleep => "asleep",
            Self::Offline => "offline",
            Self::Unknown => "unknown",
        }
    }

    /// Whether a wake request should precede telemetry reads.
    pub const fn needs_wake(self) -> bool {
        matches!(self, Self::Asleep | Self::Offline)
    }
}

impl fmt::Display for VehicleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last-known metadata for one vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleRecord {
    /// Vehicle identifier.
    pub vehicle_id: VehicleId,
    /// Name the owner gave the vehicle.
    pub display_name: Option<String>,
    /// Vehicle identification number.
    pub vin: Option<String>,
    /// Connectivity state.
    pub state: VehicleState,
    /// Paint colour, when reported.
    pub color: Option<String>,
    /// Option codes string, when reported.
    pub option_codes: Option<String>,
    /// API version the vehicle speaks.
    pub api_version: Option<i32>,
    /// Whether the vehicle is in service.
    pub in_service: bool,
    /// Account whose credential listed the vehicle.
    pub owner_account: Option<AccountId>,
    /// First time the record was stored.
    pub created_at: DateTime<Utc>,
    /// Last write time; drives freshness.
    pub updated_at: DateTime<Utc>,
}

/// Latest location sample for one vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    /// Vehicle identifier.
    pub vehicle_id: VehicleId,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Heading in degrees.
    pub heading: Option<i32>,
    /// Speed as reported.
    pub speed: Option<f64>,
    /// Power draw as reported.
    pub power: Option<f64>,
    /// Gear selector state.
    pub shift_state: Option<String>,
    /// GPS fix time reported by the vehicle.
    pub gps_as_of: Option<DateTime<Utc>>,
    /// First time a sample was stored for the vehicle.
    pub created_at: DateTime<Utc>,
    /// Last write time; drives freshness.
    pub updated_at: DateTime<Utc>,
}

/// Which cached projection an update touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    /// [`VehicleRecord`] writes.
    VehicleInfo,
    /// [`LocationSample`] writes.
    Location,
}

impl UpdateKind {
    /// Storage identifier.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VehicleInfo => "vehicle_info",
            Self::Location => "location",
        }
    }

    /// Parse a stored identifier.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "vehicle_info" => Some(Self::VehicleInfo),
            "location" => Some(Self::Location),
            _ => None,
        }
    }
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Old and new value of one changed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Value before the write.
    pub old: Value,
    /// Value after the write.
    pub new: Value,
}

/// A change-log entry before storage assigns its identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLogDraft {
    /// Vehicle the write touched.
    pub vehicle_id: VehicleId,
    /// Projection the write touched.
    pub update_type: UpdateKind,
    /// Value before the write; `None` marks a creation.
    pub old_value: Option<Value>,
    /// Value after the write.
    pub new_value: Value,
    /// Fields present on both sides whose values differ.
    pub changes: BTreeMap<String, FieldChange>,
    /// Who performed the write.
    pub actor: Option<String>,
    /// Write time.
    pub created_at: DateTime<Utc>,
}

impl UpdateLogDraft {
    /// Whether this entry records the first write for the vehicle.
    pub fn is_creation(&self) -> bool {
        self.old_value.is_none()
    }

    /// Names of changed fields, sorted.
    pub fn changed_fields(&self) -> Vec<String> {
        self.changes.keys().cloned().collect()
    }
}

/// A stored change-log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLogEntry {
    /// Storage-assigned identifier, increasing with insertion order.
    pub id: i64,
    /// Entry content.
    #[serde(flatten)]
    pub entry: UpdateLogDraft,
}

/// Default number of log entries returned by a query.
pub const DEFAULT_LOG_QUERY_LIMIT: usize = 50;
/// Upper bound on log entries returned by a query.
pub const MAX_LOG_QUERY_LIMIT: usize = 500;

/// Filter for change-log reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateLogQuery {
    /// Restrict to one vehicle.
    pub vehicle_id: Option<VehicleId>,
    /// Restrict to one projection.
    pub update_type: Option<UpdateKind>,
    /// Maximum entries returned, clamped to `1..=MAX_LOG_QUERY_LIMIT`.
    pub limit: usize,
}

impl Default for UpdateLogQuery {
    fn default() -> Self {
        Self {
            vehicle_id: None,
            update_type: None,
            limit: DEFAULT_LOG_QUERY_LIMIT,
        }
    }
}

impl UpdateLogQuery {
    /// Copy of the query with `limit` clamped into range.
    pub fn clamped(self) -> Self {
        Self {
            limit: self.limit.clamp(1, MAX_LOG_QUERY_LIMIT),
            ..self
        }
    }
}

/// Per-projection counts for one vehicle's change log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSummary {
    /// Projection.
    pub update_type: UpdateKind,
    /// Number of entries.
    pub update_count: u64,
    /// Most recent entry time.
    pub last_update: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("online", VehicleState::Online, false)]
    #[case("ASLEEP", VehicleState::Asleep, true)]
    #[case("offline", VehicleState::Offline, true)]
    #[case("driving", VehicleState::Unknown, false)]
    fn vehicle_state_parsing(
        #[case] raw: &str,
        #[case] expected: VehicleState,
        #[case] needs_wake: bool,
    ) {
        let state = VehicleState::parse(raw);
        assert_eq!(state, expected);
        assert_eq!(state.needs_wake(), needs_wake);
    }

    #[rstest]
    #[case(0, 1)]
    #[case(50, 50)]
    #[case(10_000, MAX_LOG_QUERY_LIMIT)]
    fn log_query_limit_is_clamped(#[case] requested: usize, #[case] expected: usize) {
        let query = UpdateLogQuery {
            limit: requested,
            ..UpdateLogQuery::default()
        }
        .clamped();
        assert_eq!(query.limit, expected);
    }
}
