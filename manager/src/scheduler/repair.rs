use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::constants::defaults::SCHEDULED_TASK_ID;
use crate::repair::{NodeClientProvider, RepairService, RepairTarget};

pub struct RepairScheduler<K: NodeClientProvider> {
    service: RepairService<K>,
    config: Arc<Config>,
    scheduler: JobScheduler,
    shutdown: CancellationToken,
}

impl<K: NodeClientProvider> RepairScheduler<K> {
    pub async fn new(service: RepairService<K>, config: Arc<Config>) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| anyhow!("Failed to create JobScheduler: {}", e))?;

        Ok(Self {
            service,
            config,
            scheduler,
            shutdown: CancellationToken::new(),
        })
    }

    /// Token that cancels every scheduled run when the manager shuts down
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Register one job per cluster with a repair schedule and start ticking.
    ///
    /// Returns the number of scheduled clusters.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<usize> {
        info!("Starting repair scheduler with 6-field cron format (sec min hour day month dow)");
        let mut scheduled_count = 0;

        let mut cluster_ids: Vec<&String> = self.config.clusters.keys().collect();
        cluster_ids.sort();

        for cluster_id in cluster_ids {
            let Some(repair) = self.config.clusters[cluster_id].repair.as_ref() else {
                continue;
            };
            let Some(schedule) = repair.schedule.as_ref() else {
                info!("No repair schedule configured for {}", cluster_id);
                continue;
            };

            match self
                .schedule_repair_job(cluster_id.clone(), schedule.clone(), repair.target.clone())
                .await
            {
                Ok(_) => {
                    scheduled_count += 1;
                    info!("Scheduled repair for {}: {}", cluster_id, schedule);
                }
                Err(e) => {
                    error!(
                        "Failed to schedule repair for {}: {} (schedule: {})",
                        cluster_id, e, schedule
                    );
                }
            }
        }

        if scheduled_count > 0 {
            self.scheduler
                .start()
                .await
                .map_err(|e| anyhow!("Failed to start scheduler: {}", e))?;
            info!("Repair scheduler started with {} jobs", scheduled_count);
        } else {
            warn!("No scheduled repairs configured - scheduler not started");
        }

        Ok(scheduled_count)
    }

    async fn schedule_repair_job(
        &self,
        cluster_id: String,
        schedule: String,
        target: RepairTarget,
    ) -> Result<()> {
        validate_6_field_cron(&schedule)
            .map_err(|e| anyhow!("Invalid 6-field cron schedule '{}': {}", schedule, e))?;
        target
            .validate()
            .map_err(|e| anyhow!("Invalid repair target: {}", e))?;

        let service = self.service.clone();
        let shutdown = self.shutdown.clone();

        let job = Job::new_async(schedule.as_str(), move |_uuid, _scheduler| {
            let service = service.clone();
            let shutdown = shutdown.clone();
            let cluster_id = cluster_id.clone();
            let target = target.clone();

            Box::pin(async move {
                if service.is_active(&cluster_id) {
                    warn!(
                        "Skipping scheduled repair of {}: a run is already active",
                        cluster_id
                    );
                    return;
                }

                let run_id = Uuid::new_v4().to_string();
                info!("Executing scheduled repair {} for {}", run_id, cluster_id);

                match service
                    .repair(&shutdown, &cluster_id, SCHEDULED_TASK_ID, &run_id, target)
                    .await
                {
                    Ok(()) => info!("Scheduled repair of {} completed", cluster_id),
                    Err(e) if e.is_cancelled() => {
                        info!("Scheduled repair of {} cancelled", cluster_id)
                    }
                    Err(e) => error!("Scheduled repair of {} failed: {}", cluster_id, e),
                }
            })
        })
        .map_err(|e| anyhow!("Failed to create repair job for '{}': {}", schedule, e))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| anyhow!("Failed to add repair job to scheduler: {}", e))?;

        Ok(())
    }
}

pub fn validate_6_field_cron(schedule: &str) -> Result<()> {
    let parts: Vec<&str> = schedule.split_whitespace().collect();

    if parts.len() != 6 {
        return Err(anyhow!(
            "tokio-cron-scheduler requires exactly 6 fields: second minute hour day month dayofweek. Got {} fields: '{}'",
            parts.len(),
            schedule
        ));
    }

    validate_cron_field(parts[0], "second", 0, 59)?;
    validate_cron_field(parts[1], "minute", 0, 59)?;
    validate_cron_field(parts[2], "hour", 0, 23)?;
    validate_cron_field(parts[3], "day", 1, 31)?;
    validate_cron_field(parts[4], "month", 1, 12)?;
    validate_cron_field(parts[5], "dayofweek", 0, 7)?;
    Ok(())
}

fn validate_cron_field(field: &str, name: &str, min: u32, max: u32) -> Result<()> {
    if field == "*" || field == "?" {
        return Ok(());
    }

    // Lists, ranges and steps: check every numeric component
    for part in field.split(|c| c == ',' || c == '-' || c == '/') {
        if part.is_empty() || part == "*" {
            continue;
        }
        // Named days and months (MON, JAN) are left to the cron parser
        if part.chars().all(|c| c.is_ascii_alphabetic()) {
            continue;
        }
        let value = part
            .parse::<u32>()
            .map_err(|_| anyhow!("Invalid {} value: {}", name, part))?;
        if field.contains('/') && field.ends_with(part) {
            // Step sizes are not bounded by the field range
            continue;
        }
        if value < min || value > max {
            return Err(anyhow!(
                "{} value {} out of range {}-{}",
                name,
                value,
                min,
                max
            ));
        }
    }
    Ok(())
}
