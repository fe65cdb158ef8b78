//! Repair job generator.
//!
//! Pending ranges are pooled per replica set. The control loop owns all of
//! the generator state: it hands out jobs whose replica sets do not overlap
//! any busy host, consumes results, frees hosts and refills the queue until
//! nothing is left.

use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::host_priority::HostPriority;
use super::intensity::IntensityController;
use super::progress::ProgressManager;
use super::types::{Host, Job, JobResult, TableTokenRange};
use crate::constants::repair::{
    is_system_keyspace, CONTROL_TICK_MILLIS, JOB_QUEUE_FACTOR, PROGRESS_LOG_STEP_PERCENT,
};
use crate::errors::RepairError;

#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub graceful_shutdown_timeout: Duration,
    pub fail_fast: bool,
}

/// Worker side of the queues opened by [`Generator::open_queues`]
pub struct JobQueues {
    pub jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
    pub results: mpsc::UnboundedSender<JobResult>,
    /// Cancelled when in-flight jobs must stop immediately
    pub stop: CancellationToken,
}

pub struct Generator<P: ProgressManager> {
    progress: P,
    intensity: Arc<IntensityController>,
    settings: GeneratorSettings,

    replicas: HashMap<u64, Vec<Host>>,
    ranges: HashMap<u64, Vec<TableTokenRange>>,
    keys: Vec<u64>,
    pos: usize,
    busy: HashSet<Host>,
    host_count: usize,

    host_priority: HostPriority,
    host_range_limits: HashMap<Host, usize>,
    small_tables: HashSet<(String, String)>,

    count: u64,
    success: u64,
    failed: u64,
    done_baseline: u64,
    last_logged_step: u64,

    outstanding: usize,
    stopped: bool,
    next: Option<mpsc::Sender<Job>>,
    results: Option<mpsc::UnboundedReceiver<JobResult>>,
    stop: CancellationToken,
}

impl<P: ProgressManager> Generator<P> {
    pub fn new(progress: P, intensity: Arc<IntensityController>, settings: GeneratorSettings) -> Self {
        Self {
            progress,
            intensity,
            settings,
            replicas: HashMap::new(),
            ranges: HashMap::new(),
            keys: Vec::new(),
            pos: 0,
            busy: HashSet::new(),
            host_count: 0,
            host_priority: HostPriority::default(),
            host_range_limits: HashMap::new(),
            small_tables: HashSet::new(),
            count: 0,
            success: 0,
            failed: 0,
            done_baseline: 0,
            last_logged_step: 0,
            outstanding: 0,
            stopped: false,
            next: None,
            results: None,
            stop: CancellationToken::new(),
        }
    }

    /// Add the ranges of one keyspace/table unit
    pub fn add(&mut self, ranges: Vec<TableTokenRange>) {
        for range in ranges {
            let hash = range.replica_set_hash;
            self.replicas
                .entry(hash)
                .or_insert_with(|| range.replicas.clone());
            self.ranges.entry(hash).or_default().push(range);
        }
    }

    pub fn set_host_priority(&mut self, priority: HostPriority) {
        self.host_priority = priority;
    }

    pub fn set_host_range_limits(&mut self, limits: HashMap<Host, usize>) {
        self.host_range_limits = limits;
    }

    /// Repair every remaining range of `keyspace.table` in one job per replica set
    pub fn mark_small_table(&mut self, keyspace: &str, table: &str) {
        self.small_tables
            .insert((keyspace.to_string(), table.to_string()));
    }

    /// Every host owning at least one added range, sorted
    pub fn hosts(&self) -> Vec<Host> {
        let mut hosts: Vec<Host> = self
            .replicas
            .values()
            .flat_map(|r| r.iter().cloned())
            .collect();
        hosts.sort();
        hosts.dedup();
        hosts
    }

    /// Distinct `(keyspace, table)` pairs with added ranges, sorted
    pub fn tables(&self) -> Vec<(String, String)> {
        let mut tables: Vec<(String, String)> = self
            .ranges
            .values()
            .flatten()
            .map(|r| (r.keyspace.clone(), r.table.clone()))
            .collect();
        tables.sort();
        tables.dedup();
        tables
    }

    /// Load the ledger and drop ranges that are already repaired.
    ///
    /// Returns the number of ranges left to repair.
    ///
    /// # Panics
    /// If no ranges were added.
    pub async fn init(&mut self) -> u64 {
        assert!(
            !self.replicas.is_empty(),
            "repair generator initialised without any ranges"
        );

        let mut keys: Vec<u64> = self.replicas.keys().copied().collect();
        keys.sort_unstable();
        self.pos = rand::thread_rng().gen_range(0..keys.len());
        self.keys = keys;
        self.host_count = self.hosts().len();

        let all: Vec<TableTokenRange> = self.ranges.values().flatten().cloned().collect();
        let total = all.len() as u64;
        if let Err(e) = self.progress.init(&all).await {
            warn!("Failed to load repair progress, repairing everything: {}", e);
        }

        let progress = &self.progress;
        for pool in self.ranges.values_mut() {
            pool.retain(|r| !progress.check_repaired(r));
        }

        self.count = self.ranges.values().map(|p| p.len() as u64).sum();
        self.done_baseline = total - self.count;
        if self.done_baseline > 0 {
            info!(
                "Skipping {} of {} ranges already repaired",
                self.done_baseline, total
            );
        }
        self.count
    }

    /// Worker count estimate: one per replica set, bounded by how many
    /// disjoint replica sets the hosts can form.
    pub fn estimate_worker_count(&self) -> usize {
        let min_rf = self
            .replicas
            .values()
            .map(Vec::len)
            .filter(|n| *n > 0)
            .min()
            .unwrap_or(1);
        let by_hosts = self.hosts().len() / min_rf;
        self.replicas.len().min(by_hosts).max(1)
    }

    /// Create the job and result queues for `worker_count` workers
    pub fn open_queues(&mut self, worker_count: usize) -> JobQueues {
        let worker_count = worker_count.max(1);
        let (job_tx, job_rx) = mpsc::channel(JOB_QUEUE_FACTOR * worker_count);
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        self.next = Some(job_tx);
        self.results = Some(result_rx);
        self.intensity.set_max_parallel(worker_count);
        JobQueues {
            jobs: Arc::new(Mutex::new(job_rx)),
            results: result_tx,
            stop: self.stop.clone(),
        }
    }

    /// Token cancelled on fail-fast or when the grace period runs out
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn success(&self) -> u64 {
        self.success
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// Ranges dropped by `init` because the ledger had them as repaired
    pub fn already_repaired(&self) -> u64 {
        self.done_baseline
    }

    pub fn busy(&self) -> &HashSet<Host> {
        &self.busy
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn pending(&self) -> usize {
        self.ranges.values().map(Vec::len).sum()
    }

    /// Drive the run until every range is resolved or `ctx` is cancelled.
    pub async fn run(&mut self, ctx: &CancellationToken) -> Result<(), RepairError> {
        let Some(mut results) = self.results.take() else {
            panic!("repair generator run without open queues");
        };

        let mut tick = interval(Duration::from_millis(CONTROL_TICK_MILLIS));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut drain_deadline: Option<Instant> = None;
        if ctx.is_cancelled() {
            info!("Repair cancelled before the first job was scheduled");
            self.stop_scheduling();
        }
        self.fill_next();

        while !self.finished() {
            let deadline = drain_deadline;
            let grace = async move {
                match deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;
                _ = ctx.cancelled(), if drain_deadline.is_none() => {
                    info!(
                        "Repair cancelled, waiting up to {:?} for {} outstanding jobs",
                        self.settings.graceful_shutdown_timeout, self.outstanding
                    );
                    self.stop_scheduling();
                    drain_deadline = Some(Instant::now() + self.settings.graceful_shutdown_timeout);
                }
                _ = grace => {
                    warn!(
                        "Graceful shutdown timeout expired with {} jobs outstanding",
                        self.outstanding
                    );
                    self.stop.cancel();
                    break;
                }
                result = results.recv() => match result {
                    Some(result) => self.process_result(result).await,
                    None => {
                        error!("All repair workers exited with {} jobs outstanding", self.outstanding);
                        break;
                    }
                },
                _ = tick.tick() => self.fill_next(),
            }
        }

        self.next = None;

        if ctx.is_cancelled() {
            return Err(RepairError::Cancelled);
        }
        if self.failed > 0 {
            return Err(RepairError::RangesFailed {
                failed: self.failed,
                total: self.count,
            });
        }
        Ok(())
    }

    fn finished(&self) -> bool {
        self.outstanding == 0 && (self.stopped || self.pending() == 0)
    }

    /// Close the job stream; jobs already queued are still handed out
    fn stop_scheduling(&mut self) {
        self.stopped = true;
        self.next = None;
    }

    pub(crate) async fn process_result(&mut self, result: JobResult) {
        self.outstanding = self.outstanding.saturating_sub(1);
        let ranges = result.job.ranges.len() as u64;

        match &result.error {
            None => {
                self.success += ranges;
                debug!(
                    "Repaired {} ranges of {}.{} on {}",
                    ranges,
                    result.job.keyspace(),
                    result.job.table(),
                    result.job.host
                );
            }
            Some(e) => {
                self.failed += ranges;
                warn!(
                    "Repair of {} ranges of {}.{} on {} failed: {}",
                    ranges,
                    result.job.keyspace(),
                    result.job.table(),
                    result.job.host,
                    e
                );
            }
        }

        if let Err(e) = self.progress.update(&result).await {
            warn!("Failed to record repair progress: {}", e);
        }

        for host in result.job.replicas() {
            self.busy.remove(&host);
        }

        self.log_progress();

        if !result.is_success() && self.settings.fail_fast && !self.stopped {
            info!("Fail-fast: stopping repair after first failure");
            self.stop_scheduling();
            self.stop.cancel();
        }

        self.fill_next();
    }

    /// Schedule as many jobs as the busy set and the limits allow
    pub(crate) fn fill_next(&mut self) {
        if self.stopped || self.next.is_none() {
            return;
        }

        while self.outstanding < self.intensity.effective_parallel() {
            let Some(key) = self.pick_next_key() else {
                return;
            };
            let job = self.build_job(key);

            let Some(next) = &self.next else {
                return;
            };
            debug!(
                "Scheduling {} ranges of {}.{} on {}",
                job.ranges.len(),
                job.keyspace(),
                job.table(),
                job.host
            );
            if let Err(e) = next.try_send(job) {
                panic!("repair job queue rejected a job: {}", e);
            }
            self.outstanding += 1;
        }
    }

    fn pick_next_key(&mut self) -> Option<u64> {
        let len = self.keys.len();
        for i in 0..len {
            let idx = (self.pos + i) % len;
            let key = self.keys[idx];
            let has_pending = self.ranges.get(&key).is_some_and(|p| !p.is_empty());
            if !has_pending {
                continue;
            }
            if self.can_schedule_repair(&self.replicas[&key]) {
                self.pos = idx;
                return Some(key);
            }
        }
        None
    }

    /// True if `hosts` may start repairing given the current busy set
    pub fn can_schedule_repair(&self, hosts: &[Host]) -> bool {
        if self.busy.is_empty() {
            return true;
        }
        if hosts.iter().any(|h| self.busy.contains(h)) {
            return false;
        }
        let limit = self.intensity.active_host_limit(self.host_count);
        self.busy.len() + hosts.len() <= limit
    }

    fn build_job(&mut self, key: u64) -> Job {
        let replicas = self.replicas[&key].clone();
        for host in &replicas {
            self.busy.insert(host.clone());
        }

        let host = self
            .host_priority
            .pick_host(&replicas)
            .cloned()
            .expect("replica sets are never empty");

        let pool = self.ranges.entry(key).or_default();
        let (keyspace, table) = match pool.first() {
            Some(first) => (first.keyspace.clone(), first.table.clone()),
            None => (String::new(), String::new()),
        };
        let contiguous = pool
            .iter()
            .take_while(|r| r.keyspace == keyspace && r.table == table)
            .count();

        let batch_whole_table = is_system_keyspace(&keyspace)
            || self.small_tables.contains(&(keyspace.clone(), table.clone()));
        let limit = if batch_whole_table {
            contiguous
        } else {
            let host_limit = self.host_range_limits.get(&host).copied().unwrap_or(1);
            self.intensity.ranges_limit(host_limit).min(contiguous)
        };

        let take = limit.max(1).min(pool.len());
        let ranges: Vec<TableTokenRange> = pool.drain(..take).collect();
        Job { host, ranges }
    }

    fn log_progress(&mut self) {
        let total = self.done_baseline + self.count;
        if total == 0 {
            return;
        }
        let done = self.done_baseline + self.success + self.failed;
        let percent = done * 100 / total;
        let step = percent / PROGRESS_LOG_STEP_PERCENT;
        if step > self.last_logged_step {
            self.last_logged_step = step;
            info!(
                "Repair progress: {}% ({} repaired, {} failed, {} total)",
                percent,
                self.done_baseline + self.success,
                self.failed,
                total
            );
        }
    }
}
