//! This module provides reusable test utilities:
//! - Fake cluster driving the repair engine in-process
//! - Mock agent HTTP server
//! - Recording (optionally failing) progress ledger
//! - Test configuration builders
//! - In-memory test databases
//! - Common rings and targets

// Each test binary uses a different subset of the fixtures
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod fake_cluster;
pub mod mock_agent;
pub mod recording_ledger;
pub mod test_config;
pub mod test_data;
pub mod test_database;

// Re-export commonly used items
pub use fake_cluster::{FakeNodeClient, FakeProvider, StartedRepair};
pub use mock_agent::MockAgentServer;
pub use recording_ledger::{RecordedResult, RecordingLedger};
pub use test_config::{cluster_config, config_with_cluster, TestConfigBuilder};
pub use test_data::*;
pub use test_database::TestDatabase;
