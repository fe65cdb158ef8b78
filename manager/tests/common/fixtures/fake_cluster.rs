//! In-process fake of a database cluster for driving the repair engine
//!
//! Repairs finish `repair_delay` after they start (tokio time, so tests can
//! run with a paused clock). Every started repair is recorded together with
//! the replica hosts it touches, and overlapping repairs on a replica are
//! counted as violations.

use anyhow::{anyhow, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use repair_manager::errors::RepairError;
use repair_manager::repair::{CommandStatus, Host, HostState, NodeClient, NodeClientProvider, Ring};

/// One `start_repair` call as seen by the fake
#[derive(Debug, Clone)]
pub struct StartedRepair {
    pub host: Host,
    pub keyspace: String,
    pub tables: Vec<String>,
    pub ranges: Vec<(i64, i64)>,
    pub replicas: Vec<Host>,
}

#[derive(Debug)]
struct Command {
    replicas: Vec<Host>,
    started_at: Instant,
    fail: bool,
    finished: bool,
}

#[derive(Debug, Default)]
struct FakeState {
    next_id: u64,
    commands: HashMap<String, Command>,
    active: HashMap<Host, usize>,
    outstanding: usize,
    peak_outstanding: usize,
    violations: usize,
    started: Vec<StartedRepair>,
    kill_calls: usize,
}

impl FakeState {
    fn release(&mut self, command_id: &str) {
        let Some(command) = self.commands.get_mut(command_id) else {
            return;
        };
        if command.finished {
            return;
        }
        command.finished = true;
        for host in &command.replicas {
            if let Some(count) = self.active.get_mut(host) {
                *count -= 1;
            }
        }
        self.outstanding -= 1;
    }
}

pub struct FakeNodeClient {
    rings: HashMap<String, Ring>,
    tables: HashMap<String, Vec<String>>,
    hosts: Vec<Host>,
    total_memory: u64,
    shard_count: u32,
    table_size: u64,
    repair_delay: Duration,
    down_hosts: HashSet<Host>,
    busy_hosts: HashSet<Host>,
    failing_hosts: HashSet<Host>,
    refused_hosts: HashSet<Host>,
    panicking_hosts: Mutex<HashSet<Host>>,
    dc_order: Option<Vec<String>>,
    state: Mutex<FakeState>,
}

impl FakeNodeClient {
    /// A healthy cluster serving `ring` for `keyspace` with `tables`
    pub fn new(keyspace: &str, tables: &[&str], ring: Ring) -> Self {
        let mut hosts: Vec<Host> = ring
            .ranges
            .iter()
            .flat_map(|r| r.replicas.iter().cloned())
            .collect();
        hosts.sort();
        hosts.dedup();

        Self {
            rings: HashMap::from([(keyspace.to_string(), ring)]),
            tables: HashMap::from([(
                keyspace.to_string(),
                tables.iter().map(|t| t.to_string()).collect(),
            )]),
            hosts,
            total_memory: 16 * 1024 * 1024 * 1024,
            shard_count: 4,
            table_size: 100 * 1024 * 1024 * 1024,
            repair_delay: Duration::from_millis(20),
            down_hosts: HashSet::new(),
            busy_hosts: HashSet::new(),
            failing_hosts: HashSet::new(),
            refused_hosts: HashSet::new(),
            panicking_hosts: Mutex::new(HashSet::new()),
            dc_order: None,
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn with_keyspace(mut self, keyspace: &str, tables: &[&str], ring: Ring) -> Self {
        self.rings.insert(keyspace.to_string(), ring);
        self.tables.insert(
            keyspace.to_string(),
            tables.iter().map(|t| t.to_string()).collect(),
        );
        self
    }

    pub fn with_memory(mut self, total_memory: u64, shard_count: u32) -> Self {
        self.total_memory = total_memory;
        self.shard_count = shard_count;
        self
    }

    /// Size reported by every host for every table
    pub fn with_table_size(mut self, bytes: u64) -> Self {
        self.table_size = bytes;
        self
    }

    pub fn with_repair_delay(mut self, delay: Duration) -> Self {
        self.repair_delay = delay;
        self
    }

    pub fn with_down_host(mut self, host: &str) -> Self {
        self.down_hosts.insert(host.to_string());
        self
    }

    pub fn with_busy_host(mut self, host: &str) -> Self {
        self.busy_hosts.insert(host.to_string());
        self
    }

    /// Repairs touching `host` as a replica finish in failure
    pub fn with_failing_host(mut self, host: &str) -> Self {
        self.failing_hosts.insert(host.to_string());
        self
    }

    /// `start_repair` coordinated by `host` is rejected
    pub fn with_refusing_host(mut self, host: &str) -> Self {
        self.refused_hosts.insert(host.to_string());
        self
    }

    /// The first `start_repair` coordinated by `host` panics
    pub fn with_panicking_host(mut self, host: &str) -> Self {
        self.panicking_hosts.get_mut().unwrap().insert(host.to_string());
        self
    }

    pub fn with_dc_order(mut self, dcs: &[&str]) -> Self {
        self.dc_order = Some(dcs.iter().map(|d| d.to_string()).collect());
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn started(&self) -> Vec<StartedRepair> {
        self.lock().started.clone()
    }

    pub fn start_count(&self) -> usize {
        self.lock().started.len()
    }

    /// Every (table, start, end) that a repair was started for
    pub fn repaired_ranges(&self) -> Vec<(String, i64, i64)> {
        let mut ranges: Vec<(String, i64, i64)> = self
            .lock()
            .started
            .iter()
            .flat_map(|s| {
                s.tables
                    .iter()
                    .flat_map(|t| s.ranges.iter().map(move |(a, b)| (t.clone(), *a, *b)))
                    .collect::<Vec<_>>()
            })
            .collect();
        ranges.sort();
        ranges
    }

    pub fn violations(&self) -> usize {
        self.lock().violations
    }

    pub fn peak_outstanding(&self) -> usize {
        self.lock().peak_outstanding
    }

    pub fn kill_calls(&self) -> usize {
        self.lock().kill_calls
    }

    fn replicas_of(&self, keyspace: &str, ranges: &[(i64, i64)]) -> Vec<Host> {
        let mut replicas: Vec<Host> = self
            .rings
            .get(keyspace)
            .map(|ring| {
                ring.ranges
                    .iter()
                    .filter(|r| ranges.contains(&(r.start_token, r.end_token)))
                    .flat_map(|r| r.replicas.iter().cloned())
                    .collect()
            })
            .unwrap_or_default();
        replicas.sort();
        replicas.dedup();
        replicas
    }
}

impl NodeClient for FakeNodeClient {
    async fn ring(&self, keyspace: &str) -> Result<Ring> {
        self.rings
            .get(keyspace)
            .cloned()
            .ok_or_else(|| anyhow!("unknown keyspace {}", keyspace))
    }

    async fn tables(&self, keyspace: &str) -> Result<Vec<String>> {
        Ok(self.tables.get(keyspace).cloned().unwrap_or_default())
    }

    async fn start_repair(
        &self,
        host: &str,
        keyspace: &str,
        tables: &[String],
        ranges: &[(i64, i64)],
    ) -> Result<String> {
        if self.refused_hosts.contains(host) {
            return Err(anyhow!("{} refused the repair", host));
        }
        let panics = self.panicking_hosts.lock().unwrap().remove(host);
        if panics {
            panic!("agent client for {} blew up", host);
        }

        let replicas = self.replicas_of(keyspace, ranges);
        let fail = replicas.iter().any(|h| self.failing_hosts.contains(h));

        let state = &mut *self.lock();
        for replica in &replicas {
            let count = state.active.entry(replica.clone()).or_insert(0);
            if *count > 0 {
                state.violations += 1;
            }
            *count += 1;
        }
        state.outstanding += 1;
        state.peak_outstanding = state.peak_outstanding.max(state.outstanding);

        state.next_id += 1;
        let command_id = format!("cmd-{}", state.next_id);
        state.commands.insert(
            command_id.clone(),
            Command {
                replicas: replicas.clone(),
                started_at: Instant::now(),
                fail,
                finished: false,
            },
        );
        state.started.push(StartedRepair {
            host: host.to_string(),
            keyspace: keyspace.to_string(),
            tables: tables.to_vec(),
            ranges: ranges.to_vec(),
            replicas,
        });
        Ok(command_id)
    }

    async fn repair_status(&self, _host: &str, command_id: &str) -> Result<CommandStatus> {
        let state = &mut *self.lock();
        let command = state
            .commands
            .get(command_id)
            .ok_or_else(|| anyhow!("unknown command {}", command_id))?;

        if command.finished {
            return Ok(CommandStatus::Failed);
        }
        if command.started_at.elapsed() < self.repair_delay {
            return Ok(CommandStatus::Running);
        }

        let status = if command.fail {
            CommandStatus::Failed
        } else {
            CommandStatus::Successful
        };
        state.release(command_id);
        Ok(status)
    }

    async fn kill_all_repairs(&self, _hosts: &[Host]) -> Result<()> {
        let state = &mut *self.lock();
        state.kill_calls += 1;
        let ids: Vec<String> = state.commands.keys().cloned().collect();
        for id in ids {
            state.release(&id);
        }
        Ok(())
    }

    async fn total_memory(&self, _host: &str) -> Result<u64> {
        Ok(self.total_memory)
    }

    async fn shard_count(&self, _host: &str) -> Result<u32> {
        Ok(self.shard_count)
    }

    async fn table_disk_size(&self, _host: &str, _keyspace: &str, _table: &str) -> Result<u64> {
        Ok(self.table_size)
    }

    async fn status(&self) -> Result<Vec<HostState>> {
        Ok(self
            .hosts
            .iter()
            .map(|host| HostState {
                host: host.clone(),
                up: !self.down_hosts.contains(host),
                active_repairs: usize::from(self.busy_hosts.contains(host)),
                error: None,
            })
            .collect())
    }

    async fn closest_dc(&self, dcs: &[String]) -> Result<Vec<String>> {
        match &self.dc_order {
            Some(order) => Ok(order
                .iter()
                .filter(|dc| dcs.contains(dc))
                .cloned()
                .collect()),
            None => Ok(dcs.to_vec()),
        }
    }
}

/// Hands out the same fake client for every cluster id it knows
pub struct FakeProvider {
    clients: HashMap<String, Arc<FakeNodeClient>>,
}

impl FakeProvider {
    pub fn new(cluster_id: &str, client: Arc<FakeNodeClient>) -> Self {
        Self {
            clients: HashMap::from([(cluster_id.to_string(), client)]),
        }
    }
}

impl NodeClientProvider for FakeProvider {
    type Client = FakeNodeClient;

    fn client(&self, cluster_id: &str) -> Result<Arc<FakeNodeClient>, RepairError> {
        self.clients
            .get(cluster_id)
            .cloned()
            .ok_or_else(|| RepairError::Other(format!("no client for {}", cluster_id)))
    }
}
