//! Sync run records and the report returned to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a sync run reaches the vehicles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMethod {
    /// Call the vehicle API directly with the fleet credential.
    Direct,
    /// Go through the service's own HTTP surface.
    ViaHttp,
}

impl SyncMethod {
    /// Kind label stored on the run.
    pub const fn kind(self) -> &'static str {
        match self {
            Self::Direct => "vehicle_location_sync",
            Self::ViaHttp => "api_sync",
        }
    }

    /// Parse either the method name or the stored kind label.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "direct" | "vehicle_location_sync" => Some(Self::Direct),
            "via_http" | "via-http" | "api_sync" => Some(Self::ViaHttp),
            _ => None,
        }
    }
}

/// Lifecycle status of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Opened and still processing.
    Running,
    /// Finished with no per-vehicle errors.
    Completed,
    /// Finished with at least one per-vehicle error.
    CompletedWithErrors,
    /// Aborted by a failure that escaped per-vehicle handling.
    Failed,
}

impl SyncStatus {
    /// Storage identifier.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed_with_errors",
            Self::Failed => "failed",
        }
    }

    /// Parse a stored identifier.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "completed_with_errors" => Some(Self::CompletedWithErrors),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether the run has been finalized.
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Storage-assigned run identifier.
pub type SyncRunId = i64;

/// One sync invocation as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRun {
    /// Storage identifier.
    pub id: SyncRunId,
    /// Kind label, see [`SyncMethod::kind`].
    pub kind: String,
    /// Current status.
    pub status: SyncStatus,
    /// Vehicles the run attempted.
    pub vehicles_processed: u32,
    /// Location samples written.
    pub locations_updated: u32,
    /// Per-vehicle failures.
    pub errors_count: u32,
    /// Human-readable summary, set when finalized.
    pub message: Option<String>,
    /// Open time.
    pub started_at: DateTime<Utc>,
    /// Finalize time.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Counters accumulated while a run processes vehicles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncTally {
    /// Vehicles attempted.
    pub vehicles_processed: u32,
    /// Location samples written.
    pub locations_updated: u32,
    /// Vehicles whose wake request failed; not counted as errors.
    pub wake_failures: u32,
    /// Per-vehicle error messages in processing order.
    pub errors: Vec<String>,
}

impl SyncTally {
    /// Number of per-vehicle errors.
    pub fn errors_count(&self) -> u32 {
        u32::try_from(self.errors.len()).unwrap_or(u32::MAX)
    }

    /// Status for a run whose body returned normally.
    pub fn finished_status(&self) -> SyncStatus {
        if self.errors.is_empty() {
            SyncStatus::Completed
        } else {
            SyncStatus::CompletedWithErrors
        }
    }

    /// Summary message: counts followed by the first three errors.
    pub fn summary_message(&self) -> String {
        const ERROR_PREVIEW: usize = 3;

        let mut message = format!(
            "Processed {} vehicles, updated {} locations",
            self.vehicles_processed, self.locations_updated
        );
        if !self.errors.is_empty() {
            let preview = self
                .errors
                .iter()
                .take(ERROR_PREVIEW)
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join("; ");
            message.push_str(". Errors: ");
            message.push_str(&preview);
        }
        message
    }
}

/// Final report of a run, returned by `run_once`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Stored run id; `None` when the run row could not be opened.
    pub run_id: Option<SyncRunId>,
    /// Method used.
    pub method: SyncMethod,
    /// Final status.
    pub status: SyncStatus,
    /// Counters.
    pub tally: SyncTally,
    /// Summary message as stored.
    pub message: String,
    /// Open time.
    pub started_at: DateTime<Utc>,
    /// Finalize time.
    pub completed_at: DateTime<Utc>,
}

/// Result of asking the engine to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The run went ahead and finished.
    Finished(SyncReport),
    /// Another run was in progress; nothing was done.
    AlreadyRunning,
}
