use serde::{Deserialize, Serialize};

use crate::errors::RepairError;

/// Host identity as reported by the ring (node address)
pub type Host = String;

/// One token range of one table, tagged with the replica set that owns it.
///
/// Built once per run by the range builder and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableTokenRange {
    pub keyspace: String,
    pub table: String,
    pub start_token: i64,
    pub end_token: i64,
    pub replicas: Vec<Host>,
    pub replica_set_hash: u64,
}

impl TableTokenRange {
    pub fn new(
        keyspace: &str,
        table: &str,
        start_token: i64,
        end_token: i64,
        replicas: &[Host],
    ) -> Self {
        let mut replicas = replicas.to_vec();
        replicas.sort();
        replicas.dedup();
        let replica_set_hash = replica_set_hash(&replicas);
        Self {
            keyspace: keyspace.to_string(),
            table: table.to_string(),
            start_token,
            end_token,
            replicas,
            replica_set_hash,
        }
    }

    /// True if both ranges belong to the same keyspace and table
    pub fn same_table(&self, other: &TableTokenRange) -> bool {
        self.keyspace == other.keyspace && self.table == other.table
    }
}

/// Stable 64-bit hash of a replica set. Order of `hosts` does not matter.
pub fn replica_set_hash(hosts: &[Host]) -> u64 {
    let mut sorted: Vec<&str> = hosts.iter().map(String::as_str).collect();
    sorted.sort_unstable();

    let mut hasher = blake3::Hasher::new();
    for host in sorted {
        hasher.update(host.as_bytes());
        hasher.update(&[0]);
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

/// A unit of remote work: a batch of same-table ranges repaired by one host.
#[derive(Debug, Clone)]
pub struct Job {
    pub host: Host,
    pub ranges: Vec<TableTokenRange>,
}

impl Job {
    pub fn keyspace(&self) -> &str {
        self.ranges.first().map(|r| r.keyspace.as_str()).unwrap_or("")
    }

    pub fn table(&self) -> &str {
        self.ranges.first().map(|r| r.table.as_str()).unwrap_or("")
    }

    /// Union of the replica sets of every range in the job
    pub fn replicas(&self) -> Vec<Host> {
        let mut hosts: Vec<Host> = self
            .ranges
            .iter()
            .flat_map(|r| r.replicas.iter().cloned())
            .collect();
        hosts.sort();
        hosts.dedup();
        hosts
    }

    pub fn token_ranges(&self) -> Vec<(i64, i64)> {
        self.ranges
            .iter()
            .map(|r| (r.start_token, r.end_token))
            .collect()
    }
}

/// Outcome of a single job; produced exactly once per job.
#[derive(Debug)]
pub struct JobResult {
    pub job: Job,
    pub error: Option<RepairError>,
}

impl JobResult {
    pub fn success(job: Job) -> Self {
        Self { job, error: None }
    }

    pub fn failure(job: Job, error: RepairError) -> Self {
        Self {
            job,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Keyspace selected for repair. An empty table list means every table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyspaceTarget {
    pub name: String,
    #[serde(default)]
    pub tables: Vec<String>,
}

/// What a run should repair and how hard it may push the cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepairTarget {
    /// Datacenters to repair; empty means every datacenter in the ring
    #[serde(default)]
    pub datacenters: Vec<String>,
    #[serde(default)]
    pub keyspaces: Vec<KeyspaceTarget>,
    pub intensity: Option<f64>,
    pub parallel: Option<i64>,
    pub fail_fast: Option<bool>,
}

impl RepairTarget {
    pub fn validate(&self) -> Result<(), RepairError> {
        if self.keyspaces.is_empty() {
            return Err(RepairError::validation(
                "keyspaces",
                "at least one keyspace must be selected",
            ));
        }
        for keyspace in &self.keyspaces {
            if keyspace.name.trim().is_empty() {
                return Err(RepairError::validation(
                    "keyspaces",
                    "keyspace name must not be empty",
                ));
            }
            if keyspace.tables.iter().any(|t| t.trim().is_empty()) {
                return Err(RepairError::validation(
                    "tables",
                    format!("empty table name in keyspace '{}'", keyspace.name),
                ));
            }
        }
        if let Some(intensity) = self.intensity {
            if intensity.is_nan() || intensity < 0.0 {
                return Err(RepairError::validation("intensity", "must be >= 0"));
            }
        }
        if let Some(parallel) = self.parallel {
            if parallel < 0 {
                return Err(RepairError::validation("parallel", "must be >= 0"));
            }
        }
        Ok(())
    }
}
