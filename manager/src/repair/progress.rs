//! Repair progress ledger.
//!
//! The generator consults the ledger before scheduling so an interrupted
//! task resumes where it stopped, and reports every job outcome back to it.

use anyhow::Result;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::types::{JobResult, TableTokenRange};
use crate::database::{Database, RangeProgressRecord};

pub trait ProgressManager: Send + Sync + 'static {
    /// Load prior state for the ranges of this run
    fn init(&self, ranges: &[TableTokenRange]) -> impl Future<Output = Result<()>> + Send;

    /// True if `range` was already repaired by an earlier run of the task
    fn check_repaired(&self, range: &TableTokenRange) -> bool;

    /// Record the outcome of every range of the job
    fn update(&self, result: &JobResult) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RangeKey {
    keyspace: String,
    table: String,
    start_token: i64,
    end_token: i64,
}

impl From<&TableTokenRange> for RangeKey {
    fn from(range: &TableTokenRange) -> Self {
        Self {
            keyspace: range.keyspace.clone(),
            table: range.table.clone(),
            start_token: range.start_token,
            end_token: range.end_token,
        }
    }
}

impl From<&RangeProgressRecord> for RangeKey {
    fn from(record: &RangeProgressRecord) -> Self {
        Self {
            keyspace: record.keyspace.clone(),
            table: record.table_name.clone(),
            start_token: record.start_token,
            end_token: record.end_token,
        }
    }
}

/// Ledger kept in memory only; state is shared between clones.
#[derive(Debug, Clone, Default)]
pub struct MemoryProgressManager {
    repaired: Arc<Mutex<HashSet<RangeKey>>>,
    failed: Arc<Mutex<HashSet<RangeKey>>>,
}

impl MemoryProgressManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn repaired_count(&self) -> usize {
        self.repaired.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl ProgressManager for MemoryProgressManager {
    async fn init(&self, _ranges: &[TableTokenRange]) -> Result<()> {
        Ok(())
    }

    fn check_repaired(&self, range: &TableTokenRange) -> bool {
        self.repaired
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&RangeKey::from(range))
    }

    async fn update(&self, result: &JobResult) -> Result<()> {
        let mut repaired = self.repaired.lock().unwrap_or_else(|e| e.into_inner());
        let mut failed = self.failed.lock().unwrap_or_else(|e| e.into_inner());
        for range in &result.job.ranges {
            let key = RangeKey::from(range);
            if result.is_success() {
                failed.remove(&key);
                repaired.insert(key);
            } else {
                failed.insert(key);
            }
        }
        Ok(())
    }
}

/// Ledger backed by the `repair_progress` table, scoped to one cluster and task
pub struct DbProgressManager {
    db: Arc<Database>,
    cluster_id: String,
    task_id: String,
    run_id: String,
    repaired: Mutex<HashSet<RangeKey>>,
}

impl DbProgressManager {
    pub fn new(db: Arc<Database>, cluster_id: &str, task_id: &str, run_id: &str) -> Self {
        Self {
            db,
            cluster_id: cluster_id.to_string(),
            task_id: task_id.to_string(),
            run_id: run_id.to_string(),
            repaired: Mutex::new(HashSet::new()),
        }
    }
}

impl ProgressManager for DbProgressManager {
    async fn init(&self, ranges: &[TableTokenRange]) -> Result<()> {
        let records = self
            .db
            .get_repaired_ranges(&self.cluster_id, &self.task_id)
            .await?;

        let wanted: HashSet<RangeKey> = ranges.iter().map(RangeKey::from).collect();
        let mut repaired = self.repaired.lock().unwrap_or_else(|e| e.into_inner());
        repaired.clear();
        repaired.extend(
            records
                .iter()
                .map(RangeKey::from)
                .filter(|key| wanted.contains(key)),
        );

        debug!(
            "Loaded {} repaired ranges for cluster {} task {}",
            repaired.len(),
            self.cluster_id,
            self.task_id
        );
        Ok(())
    }

    fn check_repaired(&self, range: &TableTokenRange) -> bool {
        self.repaired
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&RangeKey::from(range))
    }

    async fn update(&self, result: &JobResult) -> Result<()> {
        let error = result.error.as_ref().map(|e| e.to_string());
        self.db
            .record_range_progress(
                &self.cluster_id,
                &self.task_id,
                &self.run_id,
                &result.job.ranges,
                error.as_deref(),
            )
            .await?;

        if result.is_success() {
            let mut repaired = self.repaired.lock().unwrap_or_else(|e| e.into_inner());
            repaired.extend(result.job.ranges.iter().map(RangeKey::from));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RepairError;
    use crate::repair::types::Job;

    fn range(start: i64) -> TableTokenRange {
        TableTokenRange::new("ks", "t", start, start + 10, &["a".to_string()])
    }

    #[tokio::test]
    async fn test_memory_ledger_tracks_success_only() {
        let ledger = MemoryProgressManager::new();
        let ok = Job {
            host: "a".to_string(),
            ranges: vec![range(0)],
        };
        let bad = Job {
            host: "a".to_string(),
            ranges: vec![range(10)],
        };
        ledger.update(&JobResult::success(ok)).await.unwrap();
        ledger
            .update(&JobResult::failure(bad, RepairError::Cancelled))
            .await
            .unwrap();

        assert!(ledger.check_repaired(&range(0)));
        assert!(!ledger.check_repaired(&range(10)));
        assert_eq!(ledger.repaired_count(), 1);
        assert_eq!(ledger.failed_count(), 1);
    }

    #[tokio::test]
    async fn test_db_ledger_resumes_across_instances() {
        let db = Arc::new(Database::new(":memory:").await.unwrap());
        let first = DbProgressManager::new(db.clone(), "prod", "weekly", "run-1");
        first.init(&[range(0), range(10)]).await.unwrap();
        let job = Job {
            host: "a".to_string(),
            ranges: vec![range(0)],
        };
        first.update(&JobResult::success(job)).await.unwrap();

        let second = DbProgressManager::new(db.clone(), "prod", "weekly", "run-2");
        second.init(&[range(0), range(10)]).await.unwrap();
        assert!(second.check_repaired(&range(0)));
        assert!(!second.check_repaired(&range(10)));

        // Another task of the same cluster starts from scratch
        let other = DbProgressManager::new(db, "prod", "adhoc", "run-3");
        other.init(&[range(0)]).await.unwrap();
        assert!(!other.check_repaired(&range(0)));
    }
}
