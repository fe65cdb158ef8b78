//! Repair orchestration.
//!
//! [`repair`] wires the range builder, the generator and the worker pool for
//! a single run against one cluster. [`RepairService`] adds what the API and
//! the scheduler need around it: one run per cluster, live intensity
//! control, cancellation and the run ledger.

use anyhow::Context;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use super::client::NodeClient;
use super::generator::{Generator, GeneratorSettings};
use super::host_priority::{host_range_limit, HostPriority};
use super::intensity::{ActiveRunInfo, IntensityController, RunGuard, RunHandle, RunRegistry};
use super::progress::{DbProgressManager, ProgressManager};
use super::ranges::build_table_token_ranges;
use super::types::{Host, RepairTarget};
use super::worker::spawn_workers;
use crate::config::{Config, RepairSettings};
use crate::constants::repair::is_system_keyspace;
use crate::database::{Database, RepairRunRecord, RunStatus};
use crate::errors::RepairError;

/// Outcome of one run with its range counters
#[derive(Debug)]
pub struct RunReport {
    /// Ranges scheduled by this run
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    /// Ranges skipped because an earlier run already repaired them
    pub skipped: u64,
    pub outcome: Result<(), RepairError>,
}

impl RunReport {
    fn empty(outcome: Result<(), RepairError>) -> Self {
        Self {
            total: 0,
            success: 0,
            failed: 0,
            skipped: 0,
            outcome,
        }
    }

    pub fn into_result(self) -> Result<(), RepairError> {
        self.outcome
    }
}

/// Repair `target` on the cluster behind `client`.
///
/// Fails with [`RepairError::HostUnavailable`] before touching anything if a
/// host is down or already repairing.
#[instrument(skip_all)]
pub async fn repair<C: NodeClient, P: ProgressManager>(
    ctx: &CancellationToken,
    client: Arc<C>,
    progress: P,
    intensity: Arc<IntensityController>,
    target: &RepairTarget,
    settings: &RepairSettings,
) -> RunReport {
    if let Err(e) = target.validate() {
        return RunReport::empty(Err(e));
    }
    if ctx.is_cancelled() {
        return RunReport::empty(Err(RepairError::Cancelled));
    }
    if let Err(e) = check_hosts(client.as_ref()).await {
        return RunReport::empty(Err(e));
    }

    let fail_fast = target.fail_fast.unwrap_or(settings.fail_fast);
    let mut generator = Generator::new(
        progress,
        intensity,
        GeneratorSettings {
            graceful_shutdown_timeout: settings.graceful_shutdown_timeout(),
            fail_fast,
        },
    );

    if let Err(e) = plan(client.as_ref(), &mut generator, target, settings).await {
        return RunReport::empty(Err(e));
    }

    // Nothing has been published yet, so no range is touched
    if ctx.is_cancelled() {
        return RunReport::empty(Err(RepairError::Cancelled));
    }

    if generator.hosts().is_empty() {
        info!("No token ranges selected for repair");
        return RunReport::empty(Ok(()));
    }

    let remaining = generator.init().await;
    let skipped = generator.already_repaired();
    if remaining == 0 {
        info!("All {} ranges already repaired, nothing to do", skipped);
        return RunReport {
            skipped,
            ..RunReport::empty(Ok(()))
        };
    }

    let hosts = generator.hosts();
    let worker_count = generator.estimate_worker_count();
    info!(
        "Repairing {} ranges on {} hosts with {} workers",
        remaining,
        hosts.len(),
        worker_count
    );

    let queues = generator.open_queues(worker_count);
    let workers = spawn_workers(
        client.clone(),
        worker_count,
        queues,
        ctx.clone(),
        settings.poll_interval(),
    );

    // Fail-fast and an expired grace period stop in-flight repairs right away
    let stop = generator.stop_token();
    let done = CancellationToken::new();
    let watcher = {
        let client = client.clone();
        let hosts = hosts.clone();
        let stop = stop.clone();
        let done = done.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = stop.cancelled() => {
                    kill_repairs(client.as_ref(), &hosts).await;
                    true
                }
                _ = done.cancelled() => false,
            }
        })
    };

    let outcome = generator.run(ctx).await;

    done.cancel();
    let killed = watcher.await.unwrap_or(false);
    for worker in workers {
        if let Err(e) = worker.await {
            warn!("Repair worker ended abnormally: {}", e);
        }
    }

    if (ctx.is_cancelled() || stop.is_cancelled()) && !killed {
        kill_repairs(client.as_ref(), &hosts).await;
    }

    match &outcome {
        Ok(()) => info!("Repair finished: {} ranges repaired", generator.success()),
        Err(e) => warn!("Repair finished with error: {}", e),
    }

    RunReport {
        total: generator.count(),
        success: generator.success(),
        failed: generator.failed(),
        skipped,
        outcome,
    }
}

async fn check_hosts<C: NodeClient>(client: &C) -> Result<(), RepairError> {
    let states = client
        .status()
        .await
        .context("Failed to fetch cluster status")?;

    for state in states {
        if !state.up {
            return Err(RepairError::HostUnavailable {
                host: state.host,
                reason: state.error.unwrap_or_else(|| "host is down".to_string()),
            });
        }
        if state.active_repairs > 0 {
            return Err(RepairError::HostUnavailable {
                host: state.host,
                reason: format!("{} repairs already running", state.active_repairs),
            });
        }
    }
    Ok(())
}

/// Build ranges, coordinator limits, host priority and small-table marks
async fn plan<C: NodeClient, P: ProgressManager>(
    client: &C,
    generator: &mut Generator<P>,
    target: &RepairTarget,
    settings: &RepairSettings,
) -> Result<(), RepairError> {
    let mut host_dc: HashMap<Host, String> = HashMap::new();
    let mut ring_dcs: BTreeSet<String> = BTreeSet::new();

    for keyspace in &target.keyspaces {
        let ring = client
            .ring(&keyspace.name)
            .await
            .with_context(|| format!("Failed to describe ring of keyspace {}", keyspace.name))?;

        let tables = if keyspace.tables.is_empty() {
            client
                .tables(&keyspace.name)
                .await
                .with_context(|| format!("Failed to list tables of keyspace {}", keyspace.name))?
        } else {
            keyspace.tables.clone()
        };
        if tables.is_empty() {
            warn!("Keyspace {} has no tables, skipping", keyspace.name);
            continue;
        }

        ring_dcs.extend(ring.datacenters());
        host_dc.extend(ring.host_dc.iter().map(|(h, dc)| (h.clone(), dc.clone())));

        for table in &tables {
            let ranges = build_table_token_ranges(
                &ring,
                &keyspace.name,
                std::slice::from_ref(table),
                &target.datacenters,
            );
            generator.add(ranges);
        }
    }

    let hosts = generator.hosts();

    let mut limits = HashMap::with_capacity(hosts.len());
    for host in &hosts {
        let memory = client
            .total_memory(host)
            .await
            .with_context(|| format!("Failed to read memory of {}", host))?;
        let shards = client
            .shard_count(host)
            .await
            .with_context(|| format!("Failed to read shard count of {}", host))?;
        limits.insert(host.clone(), host_range_limit(memory, shards));
    }
    generator.set_host_range_limits(limits);

    let dcs: Vec<String> = if target.datacenters.is_empty() {
        ring_dcs.into_iter().collect()
    } else {
        target.datacenters.clone()
    };
    if dcs.len() > 1 {
        match client.closest_dc(&dcs).await {
            Ok(closest) => {
                info!("Coordinator datacenter preference: {:?}", closest);
                generator.set_host_priority(HostPriority::from_dc_order(&closest, &host_dc));
            }
            Err(e) => warn!("Failed to rank datacenters, using any replica: {}", e),
        }
    }

    for (keyspace, table) in generator.tables() {
        if is_system_keyspace(&keyspace) {
            continue;
        }
        match table_size(client, &hosts, &keyspace, &table).await {
            Ok(size) if size <= settings.small_table_threshold_bytes => {
                info!(
                    "Table {}.{} is small ({} bytes), repairing it in one job per replica set",
                    keyspace, table, size
                );
                generator.mark_small_table(&keyspace, &table);
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to size table {}.{}: {}", keyspace, table, e),
        }
    }

    Ok(())
}

async fn table_size<C: NodeClient>(
    client: &C,
    hosts: &[Host],
    keyspace: &str,
    table: &str,
) -> anyhow::Result<u64> {
    let mut total = 0u64;
    for host in hosts {
        total = total.saturating_add(client.table_disk_size(host, keyspace, table).await?);
    }
    Ok(total)
}

async fn kill_repairs<C: NodeClient>(client: &C, hosts: &[Host]) {
    info!("Stopping repairs on {} hosts", hosts.len());
    if let Err(e) = client.kill_all_repairs(hosts).await {
        error!("Failed to stop repairs: {}", e);
    }
}

/// Resolves the node client of a cluster
pub trait NodeClientProvider: Send + Sync + 'static {
    type Client: NodeClient;

    fn client(&self, cluster_id: &str) -> Result<Arc<Self::Client>, RepairError>;
}

struct PreparedRun {
    cluster_id: String,
    task_id: String,
    run_id: String,
    target: RepairTarget,
    intensity: Arc<IntensityController>,
    token: CancellationToken,
    _guard: RunGuard,
}

pub struct RepairService<K: NodeClientProvider> {
    clients: Arc<K>,
    db: Arc<Database>,
    config: Arc<Config>,
    registry: Arc<RunRegistry>,
    // Serializes the active-run check with registration
    admission: Arc<Mutex<()>>,
}

impl<K: NodeClientProvider> Clone for RepairService<K> {
    fn clone(&self) -> Self {
        Self {
            clients: self.clients.clone(),
            db: self.db.clone(),
            config: self.config.clone(),
            registry: self.registry.clone(),
            admission: self.admission.clone(),
        }
    }
}

impl<K: NodeClientProvider> RepairService<K> {
    pub fn new(clients: Arc<K>, db: Arc<Database>, config: Arc<Config>) -> Self {
        Self {
            clients,
            db,
            config,
            registry: Arc::new(RunRegistry::new()),
            admission: Arc::new(Mutex::new(())),
        }
    }

    pub fn registry(&self) -> Arc<RunRegistry> {
        self.registry.clone()
    }

    pub fn is_active(&self, cluster_id: &str) -> bool {
        self.registry.is_active(cluster_id)
    }

    pub fn active_run(&self, cluster_id: &str) -> Option<ActiveRunInfo> {
        self.registry
            .active_runs()
            .into_iter()
            .find(|run| run.cluster_id == cluster_id)
    }

    pub fn set_intensity(&self, cluster_id: &str, value: f64) -> Result<(), RepairError> {
        self.registry.set_intensity(cluster_id, value)
    }

    pub fn set_parallel(&self, cluster_id: &str, value: i64) -> Result<(), RepairError> {
        self.registry.set_parallel(cluster_id, value)
    }

    /// Cancel the active run; outstanding jobs get the graceful shutdown window
    pub fn cancel(&self, cluster_id: &str) -> Result<String, RepairError> {
        let handle = self
            .registry
            .get(cluster_id)
            .ok_or_else(|| RepairError::NoActiveRun {
                cluster_id: cluster_id.to_string(),
            })?;
        info!("Cancelling repair run {} of cluster {}", handle.run_id, cluster_id);
        handle.cancel.cancel();
        Ok(handle.run_id)
    }

    /// Repair and wait for the run to finish
    pub async fn repair(
        &self,
        ctx: &CancellationToken,
        cluster_id: &str,
        task_id: &str,
        run_id: &str,
        target: RepairTarget,
    ) -> Result<(), RepairError> {
        let prepared = self.prepare(ctx, cluster_id, task_id, run_id, target)?;
        self.execute(prepared).await
    }

    /// Register a run and execute it in the background; returns the run id
    pub fn start(
        &self,
        cluster_id: &str,
        task_id: &str,
        target: RepairTarget,
    ) -> Result<String, RepairError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let prepared = self.prepare(
            &CancellationToken::new(),
            cluster_id,
            task_id,
            &run_id,
            target,
        )?;

        let service = self.clone();
        tokio::spawn(async move {
            let cluster_id = prepared.cluster_id.clone();
            if let Err(e) = service.execute(prepared).await {
                if e.is_cancelled() {
                    info!("Repair of cluster {} cancelled", cluster_id);
                } else {
                    error!("Repair of cluster {} failed: {}", cluster_id, e);
                }
            }
        });

        Ok(run_id)
    }

    fn prepare(
        &self,
        ctx: &CancellationToken,
        cluster_id: &str,
        task_id: &str,
        run_id: &str,
        target: RepairTarget,
    ) -> Result<PreparedRun, RepairError> {
        target.validate()?;
        self.config.cluster(cluster_id)?;

        let settings = &self.config.repair;
        let intensity = Arc::new(IntensityController::new(
            target.intensity.unwrap_or(settings.default_intensity),
            target
                .parallel
                .map(|p| p.max(0) as usize)
                .unwrap_or(settings.default_parallel),
        ));
        let token = ctx.child_token();

        let _admission = self.admission.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = self.registry.get(cluster_id) {
            return Err(RepairError::AlreadyRunning {
                cluster_id: cluster_id.to_string(),
                run_id: existing.run_id,
            });
        }
        let guard = self.registry.register(
            cluster_id,
            RunHandle {
                run_id: run_id.to_string(),
                task_id: task_id.to_string(),
                intensity: intensity.clone(),
                cancel: token.clone(),
            },
        );

        Ok(PreparedRun {
            cluster_id: cluster_id.to_string(),
            task_id: task_id.to_string(),
            run_id: run_id.to_string(),
            target,
            intensity,
            token,
            _guard: guard,
        })
    }

    #[instrument(skip(self, run), fields(cluster = %run.cluster_id, run_id = %run.run_id))]
    async fn execute(&self, run: PreparedRun) -> Result<(), RepairError> {
        info!("Starting repair task {}", run.task_id);

        let record = RepairRunRecord {
            run_id: run.run_id.clone(),
            cluster_id: run.cluster_id.clone(),
            task_id: run.task_id.clone(),
            status: RunStatus::Running.as_str().to_string(),
            total_ranges: 0,
            success_ranges: 0,
            failed_ranges: 0,
            skipped_ranges: 0,
            error_message: None,
            started_at: Utc::now(),
            completed_at: None,
        };
        if let Err(e) = self.db.store_repair_run(&record).await {
            warn!("Failed to record repair run start: {}", e);
        }

        let report = match self.clients.client(&run.cluster_id) {
            Ok(client) => {
                let progress =
                    DbProgressManager::new(self.db.clone(), &run.cluster_id, &run.task_id, &run.run_id);
                repair(
                    &run.token,
                    client,
                    progress,
                    run.intensity.clone(),
                    &run.target,
                    &self.config.repair,
                )
                .await
            }
            Err(e) => RunReport::empty(Err(e)),
        };

        let status = match &report.outcome {
            Ok(()) => RunStatus::Done,
            Err(e) if e.is_cancelled() => RunStatus::Cancelled,
            Err(_) => RunStatus::Error,
        };
        let finished = RepairRunRecord {
            status: status.as_str().to_string(),
            total_ranges: report.total as i64,
            success_ranges: report.success as i64,
            failed_ranges: report.failed as i64,
            skipped_ranges: report.skipped as i64,
            error_message: report.outcome.as_ref().err().map(|e| e.to_string()),
            completed_at: Some(Utc::now()),
            ..record
        };
        if let Err(e) = self.db.store_repair_run(&finished).await {
            warn!("Failed to record repair run result: {}", e);
        }

        // A complete task starts over next time; otherwise the next run resumes
        if report.outcome.is_ok() {
            if let Err(e) = self
                .db
                .clear_range_progress(&run.cluster_id, &run.task_id)
                .await
            {
                warn!("Failed to clear repair progress: {}", e);
            }
        }

        report.into_result()
    }
}
