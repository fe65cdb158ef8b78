//! Cron-based scheduling of cluster repairs
//!
//! Schedules are defined per cluster in `config/{cluster}.toml`:
//!
//! ```toml
//! [repair]
//! schedule = "0 0 2 * * 0"  # Weekly on Sunday at 2 AM
//! intensity = 0.5
//!
//! [[repair.keyspaces]]
//! name = "orders"
//! ```
//!
//! Expressions use the 6-field format of `tokio-cron-scheduler`
//! (sec min hour day month dow). A firing is skipped when the cluster
//! already has a run in flight.

pub mod repair;
pub use repair::{validate_6_field_cron, RepairScheduler};
