//! Test configuration builder for creating test configs programmatically

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

use repair_manager::config::{ClusterConfig, ClusterSettings, Config, HostConfig, RepairSettings};

/// Builder that writes `main.toml` and one file per cluster to a temp dir
pub struct TestConfigBuilder {
    temp_dir: TempDir,
    main_toml: String,
    clusters: HashMap<String, String>,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        Self {
            temp_dir,
            main_toml: "host = \"127.0.0.1\"\nport = 8095\n".to_string(),
            clusters: HashMap::new(),
        }
    }

    /// Replace the contents of `main.toml`
    pub fn with_main_toml(mut self, toml: &str) -> Self {
        self.main_toml = toml.to_string();
        self
    }

    /// Add a cluster with the raw TOML body
    pub fn with_cluster_toml(mut self, cluster_id: &str, toml: &str) -> Self {
        self.clusters.insert(cluster_id.to_string(), toml.to_string());
        self
    }

    /// Add a cluster with the given host addresses and no schedule
    pub fn with_cluster(self, cluster_id: &str, addresses: &[&str]) -> Self {
        let mut toml = String::from("[cluster]\napi_key = \"test-key\"\n\n");
        for (i, address) in addresses.iter().enumerate() {
            toml.push_str(&format!(
                "[hosts.node{}]\naddress = \"{}\"\ndatacenter = \"dc1\"\n\n",
                i + 1,
                address
            ));
        }
        self.with_cluster_toml(cluster_id, &toml)
    }

    pub fn build(self) -> TestConfig {
        let config_dir = self.temp_dir.path().join("config");
        fs::create_dir_all(&config_dir).expect("Failed to create config dir");

        fs::write(config_dir.join("main.toml"), &self.main_toml)
            .expect("Failed to write main.toml");
        for (cluster_id, toml) in &self.clusters {
            fs::write(config_dir.join(format!("{}.toml", cluster_id)), toml)
                .expect("Failed to write cluster config");
        }

        TestConfig {
            _temp_dir: self.temp_dir,
            config_dir,
        }
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Config files on disk; removed when dropped
pub struct TestConfig {
    _temp_dir: TempDir,
    pub config_dir: PathBuf,
}

impl TestConfig {
    pub fn dir(&self) -> String {
        self.config_dir.to_string_lossy().to_string()
    }
}

/// Cluster config with one host per address, agents on `agent_port`
pub fn cluster_config(addresses: &[&str], agent_port: u16) -> ClusterConfig {
    ClusterConfig {
        cluster: ClusterSettings {
            agent_port,
            api_key: "test-key".to_string(),
            request_timeout_seconds: 5,
        },
        hosts: addresses
            .iter()
            .enumerate()
            .map(|(i, address)| {
                (
                    format!("node{}", i + 1),
                    HostConfig {
                        address: address.to_string(),
                        datacenter: Some("dc1".to_string()),
                        agent_port: None,
                    },
                )
            })
            .collect(),
        repair: None,
    }
}

/// In-memory config holding a single cluster
pub fn config_with_cluster(cluster_id: &str, cluster: ClusterConfig, repair: RepairSettings) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_path: ":memory:".to_string(),
        repair,
        clusters: HashMap::from([(cluster_id.to_string(), cluster)]),
    }
}
