//! Database record types (entities).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Done,
    Error,
    Cancelled,
    /// The manager stopped while the run was in flight
    Interrupted,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Done => "done",
            RunStatus::Error => "error",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Interrupted => "interrupted",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairRunRecord {
    pub run_id: String,
    pub cluster_id: String,
    pub task_id: String,
    pub status: String,
    pub total_ranges: i64,
    pub success_ranges: i64,
    pub failed_ranges: i64,
    pub skipped_ranges: i64,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeProgressRecord {
    pub cluster_id: String,
    pub task_id: String,
    pub keyspace: String,
    pub table_name: String,
    pub start_token: i64,
    pub end_token: i64,
    pub run_id: String,
    pub status: String,
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

pub const RANGE_STATUS_SUCCESS: &str = "success";
pub const RANGE_STATUS_FAILED: &str = "failed";
