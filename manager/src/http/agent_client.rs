use anyhow::{anyhow, Result};
use futures::future::join_all;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::types::{
    AgentResponse, NodeInfo, RepairStartRequest, TableSize, TableSizeRequest, TokenRangePayload,
};
use crate::config::{ClusterConfig, Config};
use crate::constants::http::CONNECT_TIMEOUT;
use crate::errors::RepairError;
use crate::repair::{
    CommandStatus, Host, HostState, NodeClient, NodeClientProvider, Ring,
};

/// [`NodeClient`] backed by the agents of one cluster
pub struct HttpAgentClient {
    cluster_id: String,
    cluster: ClusterConfig,
    client: Client,
    /// host -> datacenter, learned from the last ring description
    host_dc: RwLock<HashMap<Host, String>>,
}

impl HttpAgentClient {
    pub fn new(cluster_id: &str, cluster: ClusterConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cluster.cluster.request_timeout_seconds))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;

        let host_dc = cluster
            .hosts
            .values()
            .filter_map(|h| h.datacenter.clone().map(|dc| (h.address.clone(), dc)))
            .collect();

        Ok(Self {
            cluster_id: cluster_id.to_string(),
            cluster,
            client,
            host_dc: RwLock::new(host_dc),
        })
    }

    fn agent_url(&self, host: &str, path: &str) -> String {
        let port = match self.cluster.host_by_address(host) {
            Some(config) => self.cluster.agent_port_for(config),
            None => self.cluster.cluster.agent_port,
        };
        format!("http://{}:{}{}", host, port, path)
    }

    async fn get<T: DeserializeOwned>(&self, host: &str, path: &str) -> Result<AgentResponse<T>> {
        let url = self.agent_url(host, path);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.cluster.cluster.api_key))
            .send()
            .await
            .map_err(|e| anyhow!("HTTP request to {} failed: {}", host, e))?;
        Self::decode(host, response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        host: &str,
        path: &str,
        body: &B,
    ) -> Result<AgentResponse<T>> {
        let url = self.agent_url(host, path);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.cluster.cluster.api_key))
            .json(body)
            .send()
            .await
            .map_err(|e| anyhow!("HTTP request to {} failed: {}", host, e))?;
        Self::decode(host, response).await
    }

    async fn decode<T: DeserializeOwned>(
        host: &str,
        response: reqwest::Response,
    ) -> Result<AgentResponse<T>> {
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Agent {} responded with status {}: {}",
                host,
                status,
                error_text
            ));
        }

        let result: AgentResponse<T> = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse response from {}: {}", host, e))?;

        if !result.success {
            let message = result.error.as_deref().unwrap_or("Unknown error");
            return Err(anyhow!("Agent {} reported failure: {}", host, message));
        }
        Ok(result)
    }

    async fn get_data<T: DeserializeOwned>(&self, host: &str, path: &str) -> Result<T> {
        self.get::<T>(host, path)
            .await?
            .data
            .ok_or_else(|| anyhow!("Agent {} returned no data for {}", host, path))
    }

    /// Ask the hosts in address order until one answers
    async fn get_from_any<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let mut last_error = anyhow!("Cluster {} has no hosts", self.cluster_id);
        for host in self.cluster.addresses() {
            match self.get_data::<T>(&host, path).await {
                Ok(data) => return Ok(data),
                Err(e) => {
                    warn!("Host {} could not serve {}: {}", host, path, e);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    async fn node_info(&self, host: &str) -> Result<NodeInfo> {
        self.get_data(host, "/node/info").await
    }

    /// Round trip of an unauthenticated health check
    async fn ping(&self, host: &str) -> Option<Duration> {
        let started = Instant::now();
        match self.client.get(self.agent_url(host, "/health")).send().await {
            Ok(response) if response.status().is_success() => Some(started.elapsed()),
            _ => None,
        }
    }
}

impl NodeClient for HttpAgentClient {
    async fn ring(&self, keyspace: &str) -> Result<Ring> {
        let ring: Ring = self
            .get_from_any(&format!("/storage/ring/{}", keyspace))
            .await?;

        let mut host_dc = self.host_dc.write().unwrap_or_else(|e| e.into_inner());
        host_dc.extend(ring.host_dc.iter().map(|(h, dc)| (h.clone(), dc.clone())));
        Ok(ring)
    }

    async fn tables(&self, keyspace: &str) -> Result<Vec<String>> {
        self.get_from_any(&format!("/storage/tables/{}", keyspace))
            .await
    }

    async fn start_repair(
        &self,
        host: &str,
        keyspace: &str,
        tables: &[String],
        ranges: &[(i64, i64)],
    ) -> Result<String> {
        let request = RepairStartRequest {
            keyspace,
            tables,
            ranges: ranges
                .iter()
                .map(|(start_token, end_token)| TokenRangePayload {
                    start_token: *start_token,
                    end_token: *end_token,
                })
                .collect(),
        };

        let response: AgentResponse<serde_json::Value> =
            self.post(host, "/repair/start", &request).await?;
        let job_id = response
            .job_id
            .ok_or_else(|| anyhow!("Agent {} did not return a job id", host))?;

        info!(
            "Repair job {} started on {} for {} ranges of {}.{}",
            job_id,
            host,
            ranges.len(),
            keyspace,
            tables.join(",")
        );
        Ok(job_id)
    }

    async fn repair_status(&self, host: &str, command_id: &str) -> Result<CommandStatus> {
        let response: AgentResponse<serde_json::Value> = self
            .get(host, &format!("/repair/status/{}", command_id))
            .await?;

        let status = response.job_status.unwrap_or_default();
        debug!("Repair job {} on {}: {}", command_id, host, status);
        Ok(match status.as_str() {
            "Running" => CommandStatus::Running,
            "Completed" => CommandStatus::Successful,
            "Failed" => CommandStatus::Failed,
            _ => CommandStatus::Unknown(status),
        })
    }

    async fn kill_all_repairs(&self, hosts: &[Host]) -> Result<()> {
        let body = serde_json::json!({});
        let body = &body;
        let results = join_all(hosts.iter().map(|host| async move {
            let result: Result<AgentResponse<serde_json::Value>> =
                self.post(host, "/repair/kill", body).await;
            (host, result)
        }))
        .await;

        let mut failures = 0;
        for (host, result) in results {
            if let Err(e) = result {
                warn!("Failed to stop repairs on {}: {}", host, e);
                failures += 1;
            }
        }
        if failures > 0 && failures == hosts.len() {
            return Err(anyhow!("Failed to stop repairs on all {} hosts", failures));
        }
        Ok(())
    }

    async fn total_memory(&self, host: &str) -> Result<u64> {
        Ok(self.node_info(host).await?.total_memory_bytes)
    }

    async fn shard_count(&self, host: &str) -> Result<u32> {
        Ok(self.node_info(host).await?.shard_count)
    }

    async fn table_disk_size(&self, host: &str, keyspace: &str, table: &str) -> Result<u64> {
        let size: TableSize = self
            .post(host, "/storage/table-size", &TableSizeRequest { keyspace, table })
            .await?
            .data
            .ok_or_else(|| anyhow!("Agent {} returned no table size", host))?;
        Ok(size.size_bytes)
    }

    async fn status(&self) -> Result<Vec<HostState>> {
        let hosts = self.cluster.addresses();
        let states = join_all(hosts.iter().map(|host| async move {
            match self.node_info(host).await {
                Ok(info) => HostState {
                    host: host.clone(),
                    up: true,
                    active_repairs: info.active_repairs,
                    error: None,
                },
                Err(e) => HostState {
                    host: host.clone(),
                    up: false,
                    active_repairs: 0,
                    error: Some(e.to_string()),
                },
            }
        }))
        .await;
        Ok(states)
    }

    async fn closest_dc(&self, dcs: &[String]) -> Result<Vec<String>> {
        let dc_hosts: HashMap<String, Vec<Host>> = {
            let host_dc = self.host_dc.read().unwrap_or_else(|e| e.into_inner());
            let mut map: HashMap<String, Vec<Host>> = HashMap::new();
            for (host, dc) in host_dc.iter() {
                map.entry(dc.clone()).or_default().push(host.clone());
            }
            map
        };

        let mut latencies = Vec::with_capacity(dcs.len());
        for dc in dcs {
            let hosts = dc_hosts.get(dc).cloned().unwrap_or_default();
            let pings = join_all(hosts.iter().map(|h| self.ping(h))).await;
            let best = pings.into_iter().flatten().min().unwrap_or(Duration::MAX);
            debug!("Datacenter {} latency: {:?}", dc, best);
            latencies.push((best, dc.clone()));
        }

        latencies.sort();
        Ok(latencies.into_iter().map(|(_, dc)| dc).collect())
    }
}

/// Builds an [`HttpAgentClient`] per cluster from the loaded configuration
pub struct AgentClients {
    config: Arc<Config>,
}

impl AgentClients {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

impl NodeClientProvider for AgentClients {
    type Client = HttpAgentClient;

    fn client(&self, cluster_id: &str) -> Result<Arc<HttpAgentClient>, RepairError> {
        let cluster = self.config.cluster(cluster_id)?;
        let client = HttpAgentClient::new(cluster_id, cluster.clone())?;
        Ok(Arc::new(client))
    }
}
