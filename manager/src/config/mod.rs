pub mod manager;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
pub use manager::ConfigManager;

use crate::constants::{defaults, repair};
use crate::errors::ConfigError;
use crate::repair::RepairTarget;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub repair: RepairSettings,
    // Populated from individual cluster config files
    #[serde(skip)]
    pub clusters: HashMap<String, ClusterConfig>,
}

/// Engine-wide repair defaults from `main.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairSettings {
    #[serde(default = "default_graceful_shutdown_timeout")]
    pub graceful_shutdown_timeout_seconds: u64,
    #[serde(default = "default_small_table_threshold")]
    pub small_table_threshold_bytes: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_millis: u64,
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default)]
    pub default_intensity: f64,
    #[serde(default)]
    pub default_parallel: usize,
}

impl Default for RepairSettings {
    fn default() -> Self {
        Self {
            graceful_shutdown_timeout_seconds: default_graceful_shutdown_timeout(),
            small_table_threshold_bytes: default_small_table_threshold(),
            poll_interval_millis: default_poll_interval(),
            fail_fast: false,
            default_intensity: 0.0,
            default_parallel: 0,
        }
    }
}

impl RepairSettings {
    pub fn graceful_shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.graceful_shutdown_timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_millis.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSettings {
    #[serde(default = "default_agent_port")]
    pub agent_port: u16,
    pub api_key: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    pub address: String,
    pub datacenter: Option<String>,
    /// Overrides the cluster-wide agent port
    pub agent_port: Option<u16>,
}

/// Scheduled repair definition for a cluster
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterRepairConfig {
    pub schedule: Option<String>,
    #[serde(flatten)]
    pub target: RepairTarget,
}

/// Contents of `config/<cluster_id>.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub cluster: ClusterSettings,
    pub hosts: HashMap<String, HostConfig>,
    pub repair: Option<ClusterRepairConfig>,
}

impl ClusterConfig {
    pub fn host_by_address(&self, address: &str) -> Option<&HostConfig> {
        self.hosts.values().find(|h| h.address == address)
    }

    pub fn agent_port_for(&self, host: &HostConfig) -> u16 {
        host.agent_port.unwrap_or(self.cluster.agent_port)
    }

    /// Host addresses sorted for deterministic iteration
    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.hosts.values().map(|h| h.address.clone()).collect();
        addresses.sort();
        addresses
    }

    pub fn validate(&self, cluster_id: &str) -> Result<(), ConfigError> {
        if self.hosts.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("{}.hosts", cluster_id),
                reason: "at least one host is required".to_string(),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for (name, host) in &self.hosts {
            if host.address.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("{}.hosts.{}.address", cluster_id, name),
                    reason: "address must not be empty".to_string(),
                });
            }
            if !seen.insert(host.address.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: format!("{}.hosts.{}.address", cluster_id, name),
                    reason: format!("duplicate address {}", host.address),
                });
            }
        }

        if let Some(repair) = &self.repair {
            if let Some(intensity) = repair.target.intensity {
                if intensity.is_nan() || intensity < 0.0 {
                    return Err(ConfigError::InvalidValue {
                        field: format!("{}.repair.intensity", cluster_id),
                        reason: "must be >= 0".to_string(),
                    });
                }
            }
            if repair.target.parallel.is_some_and(|p| p < 0) {
                return Err(ConfigError::InvalidValue {
                    field: format!("{}.repair.parallel", cluster_id),
                    reason: "must be >= 0".to_string(),
                });
            }
        }

        Ok(())
    }
}

impl Config {
    pub fn cluster(&self, cluster_id: &str) -> Result<&ClusterConfig, ConfigError> {
        self.clusters
            .get(cluster_id)
            .ok_or_else(|| ConfigError::UnknownCluster {
                cluster_id: cluster_id.to_string(),
            })
    }
}

fn default_host() -> String {
    defaults::HOST.to_string()
}

fn default_port() -> u16 {
    defaults::PORT
}

fn default_database_path() -> String {
    defaults::DATABASE_PATH.to_string()
}

fn default_graceful_shutdown_timeout() -> u64 {
    repair::GRACEFUL_SHUTDOWN_TIMEOUT_SECONDS
}

fn default_small_table_threshold() -> u64 {
    repair::SMALL_TABLE_THRESHOLD_BYTES
}

fn default_poll_interval() -> u64 {
    crate::constants::http::JOB_POLL_INTERVAL.as_millis() as u64
}

fn default_agent_port() -> u16 {
    crate::constants::agent::DEFAULT_PORT
}

fn default_request_timeout() -> u64 {
    defaults::AGENT_REQUEST_TIMEOUT_SECONDS
}
