//! Progress ledger that keeps every result it is handed
//!
//! Can be switched to fail every call, which the engine must survive.

use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex};

use repair_manager::repair::{Host, JobResult, ProgressManager, TableTokenRange};

#[derive(Debug, Clone)]
pub struct RecordedResult {
    pub host: Host,
    pub ranges: Vec<(i64, i64)>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingLedger {
    results: Arc<Mutex<Vec<RecordedResult>>>,
    failing: bool,
}

impl RecordingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// `init` and `update` return errors after recording
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn results(&self) -> Vec<RecordedResult> {
        self.results.lock().unwrap().clone()
    }

    /// Results whose job covered the range `(start, end)`
    pub fn results_for(&self, start: i64, end: i64) -> Vec<RecordedResult> {
        self.results()
            .into_iter()
            .filter(|r| r.ranges.contains(&(start, end)))
            .collect()
    }
}

impl ProgressManager for RecordingLedger {
    async fn init(&self, _ranges: &[TableTokenRange]) -> Result<()> {
        if self.failing {
            return Err(anyhow!("ledger unavailable"));
        }
        Ok(())
    }

    fn check_repaired(&self, _range: &TableTokenRange) -> bool {
        false
    }

    async fn update(&self, result: &JobResult) -> Result<()> {
        self.results.lock().unwrap().push(RecordedResult {
            host: result.job.host.clone(),
            ranges: result
                .job
                .ranges
                .iter()
                .map(|r| (r.start_token, r.end_token))
                .collect(),
            error: result.error.as_ref().map(|e| e.to_string()),
        });
        if self.failing {
            return Err(anyhow!("ledger unavailable"));
        }
        Ok(())
    }
}
