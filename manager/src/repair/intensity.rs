//! Live concurrency knobs of a repair run and the per-cluster run registry.
//!
//! The control loop reads [`IntensityController`] on every scheduling step
//! while the API writes it; the two values are independently atomic.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::RepairError;

#[derive(Debug)]
pub struct IntensityController {
    intensity: AtomicU64,
    parallel: AtomicUsize,
    max_parallel: AtomicUsize,
}

impl IntensityController {
    pub fn new(intensity: f64, parallel: usize) -> Self {
        Self {
            intensity: AtomicU64::new(intensity.max(0.0).to_bits()),
            parallel: AtomicUsize::new(parallel),
            max_parallel: AtomicUsize::new(0),
        }
    }

    pub fn intensity(&self) -> f64 {
        f64::from_bits(self.intensity.load(Ordering::Relaxed))
    }

    pub fn parallel(&self) -> usize {
        self.parallel.load(Ordering::Relaxed)
    }

    pub fn set_intensity(&self, value: f64) -> Result<(), RepairError> {
        if value.is_nan() || value < 0.0 {
            return Err(RepairError::validation("intensity", "must be >= 0"));
        }
        self.intensity.store(value.to_bits(), Ordering::Relaxed);
        info!("Repair intensity set to {}", value);
        Ok(())
    }

    pub fn set_parallel(&self, value: i64) -> Result<(), RepairError> {
        if value < 0 {
            return Err(RepairError::validation("parallel", "must be >= 0"));
        }
        let value = value as usize;
        let max = self.max_parallel.load(Ordering::Relaxed);
        if max > 0 && value > max {
            warn!(
                "Requested parallel {} exceeds the maximum of {} workers, capping",
                value, max
            );
        }
        self.parallel.store(value, Ordering::Relaxed);
        info!("Repair parallel set to {}", value);
        Ok(())
    }

    /// Record the worker count once the run has estimated it
    pub fn set_max_parallel(&self, max: usize) {
        self.max_parallel.store(max, Ordering::Relaxed);
        let requested = self.parallel();
        if requested > max {
            warn!(
                "Requested parallel {} exceeds the maximum of {} workers, capping",
                requested, max
            );
        }
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel.load(Ordering::Relaxed)
    }

    /// Number of jobs that may be outstanding at once
    pub fn effective_parallel(&self) -> usize {
        let max = self.max_parallel().max(1);
        match self.parallel() {
            0 => max,
            p => p.min(max),
        }
    }

    /// Maximum number of hosts that may repair concurrently
    pub fn active_host_limit(&self, host_count: usize) -> usize {
        let intensity = self.intensity();
        if intensity > 0.0 && intensity < 1.0 {
            (intensity * host_count as f64).floor() as usize
        } else {
            host_count
        }
    }

    /// Ranges per job for a coordinator whose memory allows `host_limit`
    pub fn ranges_limit(&self, host_limit: usize) -> usize {
        let host_limit = host_limit.max(1);
        let intensity = self.intensity();
        let limit = if intensity == 0.0 {
            host_limit
        } else if intensity < 1.0 {
            1
        } else {
            (intensity.floor() as usize).min(host_limit)
        };
        limit.max(1)
    }
}

/// Handle of the run currently active for a cluster
#[derive(Debug, Clone)]
pub struct RunHandle {
    pub run_id: String,
    pub task_id: String,
    pub intensity: Arc<IntensityController>,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveRunInfo {
    pub cluster_id: String,
    pub run_id: String,
    pub task_id: String,
    pub intensity: f64,
    pub parallel: usize,
    pub max_parallel: usize,
}

/// Registry of in-flight runs keyed by cluster id.
///
/// At most one run per cluster. Registration hands back a [`RunGuard`] that
/// removes the entry when dropped, on every exit path of the run.
#[derive(Default)]
pub struct RunRegistry {
    runs: Mutex<HashMap<String, RunHandle>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` for `cluster_id`.
    ///
    /// Callers check [`RunRegistry::is_active`] first; a second registration
    /// for the same cluster is a caller bug and panics.
    pub fn register(self: &Arc<Self>, cluster_id: &str, handle: RunHandle) -> RunGuard {
        let mut runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = runs.get(cluster_id) {
            panic!(
                "cluster {} already has run {} registered",
                cluster_id, existing.run_id
            );
        }
        runs.insert(cluster_id.to_string(), handle);
        RunGuard {
            registry: self.clone(),
            cluster_id: cluster_id.to_string(),
        }
    }

    pub fn get(&self, cluster_id: &str) -> Option<RunHandle> {
        let runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        runs.get(cluster_id).cloned()
    }

    pub fn is_active(&self, cluster_id: &str) -> bool {
        self.get(cluster_id).is_some()
    }

    pub fn active_runs(&self) -> Vec<ActiveRunInfo> {
        let runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        runs.iter()
            .map(|(cluster_id, handle)| ActiveRunInfo {
                cluster_id: cluster_id.clone(),
                run_id: handle.run_id.clone(),
                task_id: handle.task_id.clone(),
                intensity: handle.intensity.intensity(),
                parallel: handle.intensity.parallel(),
                max_parallel: handle.intensity.max_parallel(),
            })
            .collect()
    }

    pub fn set_intensity(&self, cluster_id: &str, value: f64) -> Result<(), RepairError> {
        self.handle(cluster_id)?.intensity.set_intensity(value)
    }

    pub fn set_parallel(&self, cluster_id: &str, value: i64) -> Result<(), RepairError> {
        self.handle(cluster_id)?.intensity.set_parallel(value)
    }

    fn handle(&self, cluster_id: &str) -> Result<RunHandle, RepairError> {
        self.get(cluster_id).ok_or_else(|| RepairError::NoActiveRun {
            cluster_id: cluster_id.to_string(),
        })
    }

    fn unregister(&self, cluster_id: &str) {
        let mut runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        runs.remove(cluster_id);
    }
}

/// Removes the run from the registry on drop
pub struct RunGuard {
    registry: Arc<RunRegistry>,
    cluster_id: String,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.registry.unregister(&self.cluster_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn handle(run_id: &str) -> RunHandle {
        RunHandle {
            run_id: run_id.to_string(),
            task_id: "task".to_string(),
            intensity: Arc::new(IntensityController::new(0.0, 0)),
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn test_negative_intensity_rejected_and_value_kept() {
        let controller = IntensityController::new(0.5, 0);
        let err = controller.set_intensity(-1.0).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(controller.intensity(), 0.5);
    }

    #[test]
    fn test_negative_parallel_rejected() {
        let controller = IntensityController::new(0.0, 2);
        assert!(controller.set_parallel(-3).is_err());
        assert_eq!(controller.parallel(), 2);
        assert!(controller.set_parallel(7).is_ok());
        assert_eq!(controller.parallel(), 7);
    }

    #[test_case(0.0, 6 => 6; "unconstrained")]
    #[test_case(0.5, 6 => 3; "half of the hosts")]
    #[test_case(0.1, 6 => 0; "rounds down")]
    #[test_case(1.0, 6 => 6; "one")]
    #[test_case(4.0, 6 => 6; "integer intensity keeps all hosts")]
    fn test_active_host_limit(intensity: f64, hosts: usize) -> usize {
        IntensityController::new(intensity, 0).active_host_limit(hosts)
    }

    #[test_case(0.0, 16 => 16; "unconstrained uses memory limit")]
    #[test_case(0.5, 16 => 1; "fraction sends single ranges")]
    #[test_case(4.0, 16 => 4; "integer count")]
    #[test_case(64.0, 16 => 16; "clamped to memory limit")]
    #[test_case(0.0, 0 => 1; "at least one")]
    fn test_ranges_limit(intensity: f64, host_limit: usize) -> usize {
        IntensityController::new(intensity, 0).ranges_limit(host_limit)
    }

    #[test]
    fn test_effective_parallel() {
        let controller = IntensityController::new(0.0, 0);
        controller.set_max_parallel(4);
        assert_eq!(controller.effective_parallel(), 4);
        controller.set_parallel(2).unwrap();
        assert_eq!(controller.effective_parallel(), 2);
        controller.set_parallel(10).unwrap();
        assert_eq!(controller.effective_parallel(), 4);
    }

    #[test]
    fn test_registry_guard_unregisters() {
        let registry = Arc::new(RunRegistry::new());
        {
            let _guard = registry.register("prod", handle("run-1"));
            assert!(registry.is_active("prod"));
            registry.set_intensity("prod", 0.25).unwrap();
            assert_eq!(registry.get("prod").unwrap().intensity.intensity(), 0.25);
        }
        assert!(!registry.is_active("prod"));
        assert!(matches!(
            registry.set_parallel("prod", 1),
            Err(RepairError::NoActiveRun { .. })
        ));
    }

    #[test]
    #[should_panic(expected = "already has run run-1")]
    fn test_second_registration_panics() {
        let registry = Arc::new(RunRegistry::new());
        let _first = registry.register("prod", handle("run-1"));
        let _other = registry.register("staging", handle("run-2"));
        let _second = registry.register("prod", handle("run-3"));
    }
}
