pub mod config;
pub mod constants;
pub mod database;
pub mod errors;
pub mod http;
pub mod repair;
pub mod scheduler;
pub mod web;

// Re-export commonly used types
pub use config::{ClusterConfig, Config, ConfigManager};
pub use database::Database;
pub use errors::{ConfigError, HttpError, RepairError};
pub use http::{AgentClients, HttpAgentClient};
pub use repair::{IntensityController, NodeClient, RepairService, RepairTarget};
pub use scheduler::RepairScheduler;
