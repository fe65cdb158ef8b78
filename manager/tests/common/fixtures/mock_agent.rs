//! Mock HTTP agent server for testing
//!
//! Answers the agent API with canned envelopes so the HTTP node client can
//! be tested without a running agent.

use serde_json::{json, Value};
use wiremock::{
    matchers::{header, method, path, path_regex},
    Mock, MockServer, ResponseTemplate,
};

pub struct MockAgentServer {
    pub server: MockServer,
    pub base_url: String,
}

impl MockAgentServer {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let base_url = server.uri();
        Self { server, base_url }
    }

    /// Port the mock listens on, to be used as the cluster agent port
    pub fn port(&self) -> u16 {
        self.server.address().port()
    }

    async fn mount_get(&self, endpoint: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_health(&self) {
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"success": true})),
            )
            .mount(&self.server)
            .await;
    }

    pub async fn mock_node_info(&self, memory: u64, shards: u32, active_repairs: usize) {
        self.mount_get(
            "/node/info",
            json!({
                "success": true,
                "data": {
                    "total_memory_bytes": memory,
                    "shard_count": shards,
                    "active_repairs": active_repairs
                }
            }),
        )
        .await;
    }

    pub async fn mock_ring(&self, keyspace: &str, ring: Value) {
        self.mount_get(
            &format!("/storage/ring/{}", keyspace),
            json!({ "success": true, "data": ring }),
        )
        .await;
    }

    pub async fn mock_tables(&self, keyspace: &str, tables: &[&str]) {
        self.mount_get(
            &format!("/storage/tables/{}", keyspace),
            json!({ "success": true, "data": tables }),
        )
        .await;
    }

    pub async fn mock_repair_start(&self, job_id: &str) {
        Mock::given(method("POST"))
            .and(path("/repair/start"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "job_id": job_id,
                "job_status": "Running"
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_repair_start_error(&self, message: &str) {
        Mock::given(method("POST"))
            .and(path("/repair/start"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "error": message
            })))
            .mount(&self.server)
            .await;
    }

    /// `status` is the agent's job status string, e.g. "Completed"
    pub async fn mock_repair_status(&self, job_id: &str, status: &str) {
        self.mount_get(
            &format!("/repair/status/{}", job_id),
            json!({
                "success": true,
                "job_id": job_id,
                "job_status": status
            }),
        )
        .await;
    }

    pub async fn mock_repair_kill(&self) {
        Mock::given(method("POST"))
            .and(path("/repair/kill"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "killed": 1 }
            })))
            .expect(1..)
            .mount(&self.server)
            .await;
    }

    pub async fn mock_table_size(&self, size_bytes: u64) {
        Mock::given(method("POST"))
            .and(path("/storage/table-size"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "size_bytes": size_bytes }
            })))
            .mount(&self.server)
            .await;
    }

    /// Any path answers 500
    pub async fn mock_server_error(&self) {
        Mock::given(path_regex(".*"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&self.server)
            .await;
    }
}
