//! Contract between the repair engine and the remote nodes.
//!
//! [`crate::http::HttpAgentClient`] implements it over the agent HTTP API;
//! tests plug in in-memory fakes.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;

use super::types::Host;

/// One token range of the ring with the hosts replicating it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingRange {
    pub start_token: i64,
    pub end_token: i64,
    pub replicas: Vec<Host>,
}

/// Ring description of a single keyspace
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ring {
    pub ranges: Vec<RingRange>,
    /// host -> datacenter
    pub host_dc: HashMap<Host, String>,
}

impl Ring {
    /// Datacenters present in the ring, sorted
    pub fn datacenters(&self) -> Vec<String> {
        let mut dcs: Vec<String> = self.host_dc.values().cloned().collect();
        dcs.sort();
        dcs.dedup();
        dcs
    }
}

/// Status of a remote repair command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    Running,
    Successful,
    Failed,
    Unknown(String),
}

/// Liveness and activity of one host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostState {
    pub host: Host,
    pub up: bool,
    pub active_repairs: usize,
    pub error: Option<String>,
}

pub trait NodeClient: Send + Sync + 'static {
    /// Token ranges and replica placement of `keyspace`
    fn ring(&self, keyspace: &str) -> impl Future<Output = Result<Ring>> + Send;

    /// Tables of `keyspace`
    fn tables(&self, keyspace: &str) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Start repairing `ranges` of `keyspace.tables` coordinated by `host`;
    /// returns the remote command id.
    fn start_repair(
        &self,
        host: &str,
        keyspace: &str,
        tables: &[String],
        ranges: &[(i64, i64)],
    ) -> impl Future<Output = Result<String>> + Send;

    fn repair_status(
        &self,
        host: &str,
        command_id: &str,
    ) -> impl Future<Output = Result<CommandStatus>> + Send;

    /// Best-effort: stop every repair running on `hosts`
    fn kill_all_repairs(&self, hosts: &[Host]) -> impl Future<Output = Result<()>> + Send;

    fn total_memory(&self, host: &str) -> impl Future<Output = Result<u64>> + Send;

    fn shard_count(&self, host: &str) -> impl Future<Output = Result<u32>> + Send;

    fn table_disk_size(
        &self,
        host: &str,
        keyspace: &str,
        table: &str,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// State of every host of the cluster
    fn status(&self) -> impl Future<Output = Result<Vec<HostState>>> + Send;

    /// `dcs` ordered from the closest to the furthest datacenter
    fn closest_dc(&self, dcs: &[String]) -> impl Future<Output = Result<Vec<String>>> + Send;
}
