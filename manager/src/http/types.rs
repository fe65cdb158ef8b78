//! Wire payloads exchanged with the repair agent

use serde::{Deserialize, Serialize};

/// Response envelope returned by every agent endpoint
#[derive(Debug, Deserialize)]
pub struct AgentResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub job_status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRangePayload {
    pub start_token: i64,
    pub end_token: i64,
}

#[derive(Debug, Serialize)]
pub struct RepairStartRequest<'a> {
    pub keyspace: &'a str,
    pub tables: &'a [String],
    pub ranges: Vec<TokenRangePayload>,
}

#[derive(Debug, Serialize)]
pub struct TableSizeRequest<'a> {
    pub keyspace: &'a str,
    pub table: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableSize {
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeInfo {
    pub total_memory_bytes: u64,
    pub shard_count: u32,
    pub active_repairs: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Payload {
        value: u32,
    }

    #[test]
    fn test_envelope_with_and_without_data() {
        let with: AgentResponse<Payload> =
            serde_json::from_str(r#"{"success": true, "data": {"value": 7}}"#).unwrap();
        assert_eq!(with.data, Some(Payload { value: 7 }));

        let without: AgentResponse<Payload> =
            serde_json::from_str(r#"{"success": true, "job_id": "repair_1_0", "job_status": "Running"}"#)
                .unwrap();
        assert!(without.data.is_none());
        assert_eq!(without.job_id.as_deref(), Some("repair_1_0"));
    }
}
