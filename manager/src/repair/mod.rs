//! Cluster repair engine
//!
//! A repair run flows through these parts:
//!
//! ```text
//! ring ──► ranges ──► Generator ──► job queue ──► workers ──► NodeClient
//!                        ▲                           │
//!                        └──────── result queue ◄────┘
//!                        │
//!                  ProgressManager
//! ```
//!
//! - `ranges`: flattens a keyspace ring into table token ranges
//! - `generator`: busy-host exclusion and job batching
//! - `intensity`: live intensity/parallel knobs and the run registry
//! - `worker`: executes jobs against the remote nodes
//! - `progress`: resume ledger
//! - `service`: the `repair` entrypoint and the per-cluster service

pub mod client;
pub mod generator;
pub mod host_priority;
pub mod intensity;
pub mod progress;
pub mod ranges;
pub mod service;
pub mod types;
pub mod worker;

pub use client::{CommandStatus, HostState, NodeClient, Ring, RingRange};
pub use generator::{Generator, GeneratorSettings, JobQueues};
pub use host_priority::{host_range_limit, HostPriority};
pub use intensity::{ActiveRunInfo, IntensityController, RunGuard, RunHandle, RunRegistry};
pub use progress::{DbProgressManager, MemoryProgressManager, ProgressManager};
pub use ranges::build_table_token_ranges;
pub use service::{repair, NodeClientProvider, RepairService, RunReport};
pub use types::{Host, Job, JobResult, KeyspaceTarget, RepairTarget, TableTokenRange};
pub use worker::spawn_workers;
