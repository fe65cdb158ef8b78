use super::{ClusterConfig, Config};
use crate::errors::ConfigError;
use anyhow::{anyhow, Result};
use glob::glob;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

pub struct ConfigManager {
    current_config: Arc<Config>,
}

impl ConfigManager {
    pub async fn new(config_dir: String) -> Result<Self> {
        let config = Self::load_configuration(&config_dir).await?;
        Ok(Self {
            current_config: Arc::new(config),
        })
    }

    pub fn get_current_config(&self) -> Arc<Config> {
        self.current_config.clone()
    }

    async fn load_configuration(config_dir: &str) -> Result<Config> {
        let main_config_path = format!("{}/main.toml", config_dir);
        let main_config_content = fs::read_to_string(&main_config_path)
            .await
            .map_err(|e| ConfigError::LoadFailed {
                path: main_config_path.clone(),
                reason: e.to_string(),
            })?;

        let mut config: Config = toml::from_str(&main_config_content)
            .map_err(|e| anyhow!("Failed to parse main config: {}", e))?;

        if config.repair.default_intensity.is_nan() || config.repair.default_intensity < 0.0 {
            return Err(anyhow!("repair.default_intensity must be >= 0"));
        }

        // Every other TOML file describes one cluster, named after the file
        let pattern = format!("{}/*.toml", config_dir);
        let mut clusters = HashMap::new();

        for entry in glob(&pattern).map_err(|e| anyhow!("Glob pattern error: {}", e))? {
            let path = entry.map_err(|e| anyhow!("Glob entry error: {}", e))?;
            let filename = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| anyhow!("Invalid filename"))?;

            if filename == "main.toml" {
                continue;
            }

            let cluster_id = filename
                .strip_suffix(".toml")
                .ok_or_else(|| anyhow!("Invalid config filename: {}", filename))?;

            debug!("Loading cluster config: {}", path.display());

            let content = fs::read_to_string(&path)
                .await
                .map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?;

            let cluster_config: ClusterConfig = toml::from_str(&content)
                .map_err(|e| anyhow!("Failed to parse {}: {}", path.display(), e))?;

            cluster_config
                .validate(cluster_id)
                .map_err(|e| anyhow!("Invalid cluster config {}: {}", path.display(), e))?;

            clusters.insert(cluster_id.to_string(), cluster_config);
        }

        config.clusters = clusters;

        info!(
            "Loaded {} clusters with {} hosts",
            config.clusters.len(),
            config
                .clusters
                .values()
                .map(|c| c.hosts.len())
                .sum::<usize>()
        );

        Ok(config)
    }
}
