//! Custom error types for the repair manager
//!
//! Plumbing code (HTTP client, database, config loading) works with
//! `anyhow::Result`. The repair engine exposes the typed [`RepairError`] so
//! callers can tell validation problems, operator cancellation and failed
//! ranges apart.

use std::fmt;

/// Main error type returned by the repair engine
#[derive(Debug)]
pub enum RepairError {
    /// Bad intensity/parallel value or malformed target
    Validation { field: String, reason: String },

    /// Live control requested for a cluster with no run in flight
    NoActiveRun { cluster_id: String },

    /// A run is already active for this cluster
    AlreadyRunning { cluster_id: String, run_id: String },

    /// A host is down or already repairing, so the run cannot start
    HostUnavailable { host: String, reason: String },

    /// Remote call failure while executing a single job
    Remote(HttpError),

    /// The run was stopped by the operator
    Cancelled,

    /// Some ranges ended in failure state
    RangesFailed { failed: u64, total: u64 },

    /// Configuration problem detected while preparing a run
    Config(ConfigError),

    /// Other errors with context
    Other(String),
}

/// HTTP communication error variants
#[derive(Debug)]
pub enum HttpError {
    /// Connection to agent failed
    ConnectionFailed { host: String, reason: String },

    /// Agent returned error
    AgentError { host: String, message: String },

    /// Remote repair command finished in failure
    RepairFailed { host: String, command_id: String },

    /// Remote repair command reported a status we do not understand
    UnknownStatus {
        host: String,
        command_id: String,
        status: String,
    },

    /// The worker executing the job panicked
    WorkerPanicked { host: String, reason: String },
}

/// Configuration error variants
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to load configuration file
    LoadFailed { path: String, reason: String },

    /// Invalid configuration value
    InvalidValue { field: String, reason: String },

    /// Cluster id not present in configuration
    UnknownCluster { cluster_id: String },
}

impl RepairError {
    pub fn validation(field: &str, reason: impl Into<String>) -> Self {
        RepairError::Validation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// True when the error means "operator stopped this run"
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RepairError::Cancelled)
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, RepairError::Validation { .. })
    }
}

impl fmt::Display for RepairError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepairError::Validation { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
            RepairError::NoActiveRun { cluster_id } => {
                write!(f, "No active repair run for cluster '{}'", cluster_id)
            }
            RepairError::AlreadyRunning { cluster_id, run_id } => {
                write!(
                    f,
                    "Cluster '{}' is already being repaired by run {}",
                    cluster_id, run_id
                )
            }
            RepairError::HostUnavailable { host, reason } => {
                write!(f, "Host {} is not available for repair: {}", host, reason)
            }
            RepairError::Remote(e) => write!(f, "Remote error: {}", e),
            RepairError::Cancelled => write!(f, "Repair cancelled"),
            RepairError::RangesFailed { failed, total } => {
                write!(f, "{} of {} ranges failed", failed, total)
            }
            RepairError::Config(e) => write!(f, "Configuration error: {}", e),
            RepairError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpError::ConnectionFailed { host, reason } => {
                write!(f, "Connection to {} failed: {}", host, reason)
            }
            HttpError::AgentError { host, message } => {
                write!(f, "Agent error from {}: {}", host, message)
            }
            HttpError::RepairFailed { host, command_id } => {
                write!(f, "Repair command {} failed on {}", command_id, host)
            }
            HttpError::UnknownStatus {
                host,
                command_id,
                status,
            } => {
                write!(
                    f,
                    "Repair command {} on {} reported unknown status '{}'",
                    command_id, host, status
                )
            }
            HttpError::WorkerPanicked { host, reason } => {
                write!(f, "Worker repairing {} panicked: {}", host, reason)
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::LoadFailed { path, reason } => {
                write!(f, "Failed to load config from '{}': {}", path, reason)
            }
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
            ConfigError::UnknownCluster { cluster_id } => {
                write!(f, "Cluster '{}' not found in configuration", cluster_id)
            }
        }
    }
}

impl std::error::Error for RepairError {}
impl std::error::Error for HttpError {}
impl std::error::Error for ConfigError {}

impl From<anyhow::Error> for RepairError {
    fn from(err: anyhow::Error) -> Self {
        RepairError::Other(err.to_string())
    }
}

impl From<HttpError> for RepairError {
    fn from(err: HttpError) -> Self {
        RepairError::Remote(err)
    }
}

impl From<ConfigError> for RepairError {
    fn from(err: ConfigError) -> Self {
        RepairError::Config(err)
    }
}
