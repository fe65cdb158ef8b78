// Repair control and run history endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

use super::common::{error_response, repair_error_response, ApiResponse, ApiResult};
use crate::constants::{defaults::MANUAL_TASK_ID, limits::MAX_RUNS_LISTED};
use crate::database::{RangeProgressRecord, RepairRunRecord};
use crate::errors::RepairError;
use crate::repair::{ActiveRunInfo, KeyspaceTarget, NodeClientProvider, RepairTarget};
use crate::web::AppState;

/// Overrides applied on top of the cluster's configured repair target
#[derive(Debug, Default, Deserialize)]
pub struct StartRepairRequest {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub datacenters: Option<Vec<String>>,
    #[serde(default)]
    pub keyspaces: Option<Vec<KeyspaceTarget>>,
    #[serde(default)]
    pub intensity: Option<f64>,
    #[serde(default)]
    pub parallel: Option<i64>,
    #[serde(default)]
    pub fail_fast: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct RepairStarted {
    pub cluster_id: String,
    pub task_id: String,
    pub run_id: String,
}

#[derive(Debug, Deserialize)]
pub struct IntensityRequest {
    pub intensity: f64,
}

#[derive(Debug, Deserialize)]
pub struct ParallelRequest {
    pub parallel: i64,
}

/// Start a repair run in the background
pub async fn start_repair<K: NodeClientProvider>(
    Path(cluster_id): Path<String>,
    State(state): State<AppState<K>>,
    Json(request): Json<StartRepairRequest>,
) -> ApiResult<RepairStarted> {
    info!("Repair requested for cluster {}", cluster_id);

    if let Some(run) = state.repair_service.active_run(&cluster_id) {
        return Err(repair_error_response(RepairError::AlreadyRunning {
            cluster_id,
            run_id: run.run_id,
        }));
    }

    let cluster = state
        .config
        .cluster(&cluster_id)
        .map_err(|e| repair_error_response(e.into()))?;

    let mut target: RepairTarget = cluster
        .repair
        .as_ref()
        .map(|r| r.target.clone())
        .unwrap_or_default();
    if let Some(datacenters) = request.datacenters {
        target.datacenters = datacenters;
    }
    if let Some(keyspaces) = request.keyspaces {
        target.keyspaces = keyspaces;
    }
    if request.intensity.is_some() {
        target.intensity = request.intensity;
    }
    if request.parallel.is_some() {
        target.parallel = request.parallel;
    }
    if request.fail_fast.is_some() {
        target.fail_fast = request.fail_fast;
    }

    let task_id = request
        .task_id
        .unwrap_or_else(|| MANUAL_TASK_ID.to_string());

    match state.repair_service.start(&cluster_id, &task_id, target) {
        Ok(run_id) => {
            info!("Repair run {} started for cluster {}", run_id, cluster_id);
            Ok(Json(ApiResponse::success(RepairStarted {
                cluster_id,
                task_id,
                run_id,
            })))
        }
        Err(e) => {
            error!("Failed to start repair for {}: {}", cluster_id, e);
            Err(repair_error_response(e))
        }
    }
}

/// Cancel the active run of a cluster
pub async fn cancel_repair<K: NodeClientProvider>(
    Path(cluster_id): Path<String>,
    State(state): State<AppState<K>>,
) -> ApiResult<Value> {
    info!("Repair cancellation requested for {}", cluster_id);

    let run_id = state
        .repair_service
        .cancel(&cluster_id)
        .map_err(repair_error_response)?;

    Ok(Json(ApiResponse::success(json!({
        "message": format!("Repair run {} cancelling", run_id),
        "run_id": run_id
    }))))
}

pub async fn set_repair_intensity<K: NodeClientProvider>(
    Path(cluster_id): Path<String>,
    State(state): State<AppState<K>>,
    Json(request): Json<IntensityRequest>,
) -> ApiResult<Value> {
    state
        .repair_service
        .set_intensity(&cluster_id, request.intensity)
        .map_err(repair_error_response)?;

    Ok(Json(ApiResponse::success(json!({
        "intensity": request.intensity
    }))))
}

pub async fn set_repair_parallel<K: NodeClientProvider>(
    Path(cluster_id): Path<String>,
    State(state): State<AppState<K>>,
    Json(request): Json<ParallelRequest>,
) -> ApiResult<Value> {
    state
        .repair_service
        .set_parallel(&cluster_id, request.parallel)
        .map_err(repair_error_response)?;

    Ok(Json(ApiResponse::success(json!({
        "parallel": request.parallel
    }))))
}

/// Live settings of the active run
pub async fn get_repair_status<K: NodeClientProvider>(
    Path(cluster_id): Path<String>,
    State(state): State<AppState<K>>,
) -> ApiResult<ActiveRunInfo> {
    match state.repair_service.active_run(&cluster_id) {
        Some(run) => Ok(Json(ApiResponse::success(run))),
        None => Err(repair_error_response(RepairError::NoActiveRun { cluster_id })),
    }
}

pub async fn list_repair_runs<K: NodeClientProvider>(
    State(state): State<AppState<K>>,
) -> ApiResult<Vec<RepairRunRecord>> {
    match state.database.get_repair_runs(MAX_RUNS_LISTED).await {
        Ok(runs) => Ok(Json(ApiResponse::success(runs))),
        Err(e) => {
            error!("Failed to list repair runs: {}", e);
            Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

pub async fn get_run_progress<K: NodeClientProvider>(
    Path(run_id): Path<String>,
    State(state): State<AppState<K>>,
) -> ApiResult<Vec<RangeProgressRecord>> {
    let run = state
        .database
        .get_repair_run(&run_id)
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    if run.is_none() {
        return Err(error_response(
            StatusCode::NOT_FOUND,
            format!("Repair run {} not found", run_id),
        ));
    }

    match state.database.get_run_progress(&run_id).await {
        Ok(progress) => Ok(Json(ApiResponse::success(progress))),
        Err(e) => {
            error!("Failed to load progress of run {}: {}", run_id, e);
            Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}
