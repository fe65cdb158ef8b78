use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::services::nodetool;
use crate::types::{JobInfo, JobStatus, RepairStartRequest};

struct JobEntry {
    info: JobInfo,
    cancel: CancellationToken,
}

#[derive(Clone)]
pub struct JobManager {
    jobs: Arc<RwLock<HashMap<String, JobEntry>>>,
    sequence: Arc<AtomicU64>,
}

impl Default for JobManager {
    fn default() -> Self {
        Self::new()
    }
}

impl JobManager {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn create_job(&self, request: &RepairStartRequest) -> (String, CancellationToken) {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let job_id = format!("repair_{}_{}", Utc::now().timestamp(), seq);
        let cancel = CancellationToken::new();

        let info = JobInfo {
            job_id: job_id.clone(),
            keyspace: request.keyspace.clone(),
            tables: request.tables.clone(),
            range_count: request.ranges.len(),
            status: JobStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            output: None,
            error_message: None,
        };

        let mut jobs = self.jobs.write().await;
        jobs.insert(
            job_id.clone(),
            JobEntry {
                info,
                cancel: cancel.clone(),
            },
        );

        info!(
            "Created job {}: {} ranges of {}",
            job_id,
            request.ranges.len(),
            request.keyspace
        );
        (job_id, cancel)
    }

    /// Register a repair job and run it in the background
    pub async fn start_repair(&self, nodetool_path: String, request: RepairStartRequest) -> String {
        let (job_id, cancel) = self.create_job(&request).await;

        let manager = self.clone();
        let id = job_id.clone();
        tokio::spawn(async move {
            let result = nodetool::repair_ranges(
                &nodetool_path,
                &request.keyspace,
                &request.tables,
                &request.ranges,
                &cancel,
            )
            .await;
            match result {
                Ok(output) => manager.complete_job(&id, output).await,
                Err(e) => manager.fail_job(&id, e.to_string()).await,
            }
        });

        job_id
    }

    pub async fn complete_job(&self, job_id: &str, output: String) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(job_id) {
            job.info.status = JobStatus::Completed;
            job.info.completed_at = Some(Utc::now());
            job.info.output = Some(output);
            info!("Job {} completed successfully", job_id);
        }
    }

    pub async fn fail_job(&self, job_id: &str, error_message: String) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(job_id) {
            job.info.status = JobStatus::Failed;
            job.info.completed_at = Some(Utc::now());
            job.info.error_message = Some(error_message.clone());
            warn!("Job {} failed: {}", job_id, error_message);
        }
    }

    pub async fn get_job_status(&self, job_id: &str) -> Option<JobInfo> {
        let jobs = self.jobs.read().await;
        jobs.get(job_id).map(|job| job.info.clone())
    }

    pub async fn running_count(&self) -> usize {
        let jobs = self.jobs.read().await;
        jobs.values()
            .filter(|job| job.info.status == JobStatus::Running)
            .count()
    }

    /// Cancel every running job. Returns how many were signalled.
    pub async fn kill_all(&self) -> usize {
        let jobs = self.jobs.read().await;
        let mut killed = 0;
        for job in jobs.values() {
            if job.info.status == JobStatus::Running {
                job.cancel.cancel();
                killed += 1;
            }
        }
        if killed > 0 {
            warn!("Killing {} running repair jobs", killed);
        }
        killed
    }

    /// Drop finished jobs older than `max_hours`
    pub async fn cleanup_old_jobs(&self, max_hours: i64) -> u32 {
        let mut jobs = self.jobs.write().await;
        let cutoff = Utc::now() - chrono::Duration::hours(max_hours);
        let initial_count = jobs.len();

        jobs.retain(|_, job| job.info.status == JobStatus::Running || job.info.started_at > cutoff);

        let cleaned = initial_count - jobs.len();
        if cleaned > 0 {
            info!("Cleaned up {} jobs older than {}h", cleaned, max_hours);
        }
        cleaned as u32
    }
}
