//! Central repository for timeouts, limits and repair defaults
//!
//! Constants are grouped by concern so the config layer and the repair
//! engine agree on the same defaults.

use std::time::Duration;

/// HTTP client timeout constants
pub mod http {
    use super::Duration;

    /// Timeout for establishing HTTP connections
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Interval between repair status polls
    pub const JOB_POLL_INTERVAL: Duration = Duration::from_secs(10);
}

/// Repair engine defaults
pub mod repair {
    /// How long the control loop keeps draining results after cancellation
    pub const GRACEFUL_SHUTDOWN_TIMEOUT_SECONDS: u64 = 30;

    /// Tables at or below this aggregated size are repaired in one job
    pub const SMALL_TABLE_THRESHOLD_BYTES: u64 = 1024 * 1024 * 1024;

    /// Fraction of host memory a repair may use for range buffers
    pub const MEMORY_FRACTION: f64 = 0.1;

    /// Memory budget of a single range on a single shard
    pub const RANGE_MEMORY_BYTES: u64 = 1024 * 1024;

    /// Upper bound for ranges sent to one host in a single job
    pub const MAX_RANGES_PER_JOB: usize = 256;

    /// Job queue capacity is this multiple of the worker count
    pub const JOB_QUEUE_FACTOR: usize = 2;

    /// Period of the control loop's scheduling tick, picks up live limit changes
    pub const CONTROL_TICK_MILLIS: u64 = 1000;

    /// Progress is logged every time this many percent complete
    pub const PROGRESS_LOG_STEP_PERCENT: u64 = 10;

    /// Keyspaces that are always repaired in a single job per replica set
    pub const SYSTEM_KEYSPACES: &[&str] = &[
        "system",
        "system_auth",
        "system_distributed",
        "system_distributed_everywhere",
        "system_schema",
        "system_traces",
    ];

    pub fn is_system_keyspace(keyspace: &str) -> bool {
        SYSTEM_KEYSPACES.contains(&keyspace)
    }
}

/// Default configuration values
pub mod defaults {
    /// Default bind host for the manager API
    pub const HOST: &str = "0.0.0.0";

    /// Default port for the manager API
    pub const PORT: u16 = 8095;

    /// Default SQLite ledger location
    pub const DATABASE_PATH: &str = "data/repair.db";

    /// Default agent request timeout in seconds
    pub const AGENT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

    /// Task id used for runs started from the API without one
    pub const MANUAL_TASK_ID: &str = "manual";

    /// Task id used for cron-triggered runs
    pub const SCHEDULED_TASK_ID: &str = "scheduled";
}

/// Limits and constraints
pub mod limits {
    /// Maximum number of repair runs returned by the runs listing
    pub const MAX_RUNS_LISTED: i64 = 100;
}

/// Agent server constants
pub mod agent {
    /// Default port for agent HTTP server
    pub const DEFAULT_PORT: u16 = 8746;
}
