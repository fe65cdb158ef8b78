use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::client::{CommandStatus, NodeClient};
use super::generator::JobQueues;
use super::types::{Job, JobResult};
use crate::errors::{HttpError, RepairError};

/// Spawn `count` workers pulling from `queues`.
///
/// Workers exit once the job stream is closed and drained, or when the
/// result stream is gone.
pub fn spawn_workers<C: NodeClient>(
    client: Arc<C>,
    count: usize,
    queues: JobQueues,
    ctx: CancellationToken,
    poll_interval: Duration,
) -> Vec<JoinHandle<()>> {
    (0..count.max(1))
        .map(|id| {
            let worker = Worker {
                id,
                client: client.clone(),
                jobs: queues.jobs.clone(),
                results: queues.results.clone(),
                ctx: ctx.clone(),
                stop: queues.stop.clone(),
                poll_interval,
            };
            tokio::spawn(worker.run())
        })
        .collect()
}

struct Worker<C: NodeClient> {
    id: usize,
    client: Arc<C>,
    jobs: Arc<tokio::sync::Mutex<tokio::sync::mpsc::Receiver<Job>>>,
    results: tokio::sync::mpsc::UnboundedSender<JobResult>,
    ctx: CancellationToken,
    stop: CancellationToken,
    poll_interval: Duration,
}

impl<C: NodeClient> Worker<C> {
    async fn run(self) {
        debug!("Repair worker {} started", self.id);
        loop {
            let job = {
                let mut jobs = self.jobs.lock().await;
                jobs.recv().await
            };
            let Some(job) = job else {
                break;
            };

            let result = if self.ctx.is_cancelled() || self.stop.is_cancelled() {
                JobResult::failure(job, RepairError::Cancelled)
            } else {
                self.execute(job).await
            };

            if self.results.send(result).is_err() {
                warn!("Repair worker {} dropping result, control loop is gone", self.id);
                break;
            }
        }
        debug!("Repair worker {} finished", self.id);
    }

    /// Run the job in its own task so a panic becomes that job's failure
    async fn execute(&self, job: Job) -> JobResult {
        let host = job.host.clone();
        let task = tokio::spawn(run_job(
            self.client.clone(),
            job.clone(),
            self.stop.clone(),
            self.poll_interval,
        ));

        match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                let reason = panic_message(e.into_panic());
                error!("Repair job on {} panicked: {}", host, reason);
                JobResult::failure(
                    job,
                    RepairError::Remote(HttpError::WorkerPanicked { host, reason }),
                )
            }
            Err(_) => JobResult::failure(job, RepairError::Cancelled),
        }
    }
}

async fn run_job<C: NodeClient>(
    client: Arc<C>,
    job: Job,
    stop: CancellationToken,
    poll_interval: Duration,
) -> JobResult {
    let host = job.host.clone();
    let tables = vec![job.table().to_string()];
    let ranges = job.token_ranges();

    let command_id = match client
        .start_repair(&host, job.keyspace(), &tables, &ranges)
        .await
    {
        Ok(id) => id,
        Err(e) => {
            return JobResult::failure(
                job,
                RepairError::Remote(HttpError::AgentError {
                    host,
                    message: e.to_string(),
                }),
            )
        }
    };

    debug!(
        "Repair command {} started on {} for {} ranges",
        command_id,
        host,
        ranges.len()
    );

    loop {
        tokio::select! {
            _ = stop.cancelled() => return JobResult::failure(job, RepairError::Cancelled),
            _ = tokio::time::sleep(poll_interval) => {}
        }

        let status = tokio::select! {
            _ = stop.cancelled() => return JobResult::failure(job, RepairError::Cancelled),
            status = client.repair_status(&host, &command_id) => status,
        };

        let error = match status {
            Ok(CommandStatus::Running) => continue,
            Ok(CommandStatus::Successful) => return JobResult::success(job),
            Ok(CommandStatus::Failed) => HttpError::RepairFailed {
                host,
                command_id,
            },
            Ok(CommandStatus::Unknown(status)) => HttpError::UnknownStatus {
                host,
                command_id,
                status,
            },
            Err(e) => HttpError::ConnectionFailed {
                host,
                reason: e.to_string(),
            },
        };
        return JobResult::failure(job, RepairError::Remote(error));
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
