use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// === REQUEST STRUCTURES ===

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRange {
    pub start_token: i64,
    pub end_token: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairStartRequest {
    pub keyspace: String,
    #[serde(default)]
    pub tables: Vec<String>,
    pub ranges: Vec<TokenRange>,
}

#[derive(Debug, Deserialize)]
pub struct TableSizeRequest {
    pub keyspace: String,
    pub table: String,
}

// === RESPONSE STRUCTURES ===

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_status: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success_with_data(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            output: None,
            error: None,
            job_id: None,
            job_status: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            output: None,
            error: Some(message),
            job_id: None,
            job_status: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn success() -> Self {
        Self {
            success: true,
            data: None,
            output: None,
            error: None,
            job_id: None,
            job_status: None,
        }
    }

    pub fn success_with_job(job_id: String) -> Self {
        Self {
            success: true,
            data: None,
            output: None,
            error: None,
            job_id: Some(job_id),
            job_status: Some(format!("{:?}", JobStatus::Running)),
        }
    }
}

/// One range of `nodetool describering` output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingRange {
    pub start_token: i64,
    pub end_token: i64,
    pub replicas: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RingInfo {
    pub ranges: Vec<RingRange>,
    pub host_dc: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub total_memory_bytes: u64,
    pub shard_count: u32,
    pub active_repairs: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSize {
    pub size_bytes: u64,
}

// === INTERNAL STRUCTURES ===

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub job_id: String,
    pub keyspace: String,
    pub tables: Vec<String>,
    pub range_count: usize,
    pub status: JobStatus,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub output: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}
