//! HTTP request handlers for the agent server

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::Json as ResponseJson,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::middleware::ApiKeyAuth;
use crate::services::{node_info, nodetool};
use crate::types::*;
use crate::AppState;

type HandlerResult<T> = Result<ResponseJson<ApiResponse<T>>, StatusCode>;

pub async fn health() -> ResponseJson<ApiResponse<Value>> {
    ResponseJson(ApiResponse::success_with_data(json!({ "status": "ok" })))
}

// === Node handlers ===

pub async fn get_node_info(
    _auth: ApiKeyAuth,
    State(state): State<Arc<AppState>>,
) -> HandlerResult<NodeInfo> {
    let total_memory_bytes = match node_info::total_memory_bytes().await {
        Ok(bytes) => bytes,
        Err(e) => return Ok(ResponseJson(ApiResponse::error(e.to_string()))),
    };

    Ok(ResponseJson(ApiResponse::success_with_data(NodeInfo {
        total_memory_bytes,
        shard_count: node_info::shard_count(),
        active_repairs: state.job_manager.running_count().await,
    })))
}

// === Storage handlers ===

pub async fn get_ring(
    _auth: ApiKeyAuth,
    State(state): State<Arc<AppState>>,
    Path(keyspace): Path<String>,
) -> HandlerResult<RingInfo> {
    if let Err(e) = node_info::validate_identifier("keyspace", &keyspace) {
        return Ok(ResponseJson(ApiResponse::error(e.to_string())));
    }
    match nodetool::describe_ring(&state.nodetool_path, &keyspace).await {
        Ok(ring) => Ok(ResponseJson(ApiResponse::success_with_data(ring))),
        Err(e) => Ok(ResponseJson(ApiResponse::error(e.to_string()))),
    }
}

pub async fn get_tables(
    _auth: ApiKeyAuth,
    State(state): State<Arc<AppState>>,
    Path(keyspace): Path<String>,
) -> HandlerResult<Vec<String>> {
    match node_info::list_tables(&state.data_dir, &keyspace).await {
        Ok(tables) => Ok(ResponseJson(ApiResponse::success_with_data(tables))),
        Err(e) => Ok(ResponseJson(ApiResponse::error(e.to_string()))),
    }
}

pub async fn get_table_size(
    _auth: ApiKeyAuth,
    State(state): State<Arc<AppState>>,
    Json(request): Json<TableSizeRequest>,
) -> HandlerResult<TableSize> {
    match node_info::table_size(&state.data_dir, &request.keyspace, &request.table).await {
        Ok(size_bytes) => Ok(ResponseJson(ApiResponse::success_with_data(TableSize {
            size_bytes,
        }))),
        Err(e) => Ok(ResponseJson(ApiResponse::error(e.to_string()))),
    }
}

// === Repair handlers ===

pub async fn start_repair(
    _auth: ApiKeyAuth,
    State(state): State<Arc<AppState>>,
    Json(request): Json<RepairStartRequest>,
) -> HandlerResult<()> {
    if request.ranges.is_empty() {
        return Ok(ResponseJson(ApiResponse::error(
            "Repair request has no ranges".to_string(),
        )));
    }
    let names = std::iter::once(("keyspace", &request.keyspace))
        .chain(request.tables.iter().map(|t| ("table", t)));
    for (kind, name) in names {
        if let Err(e) = node_info::validate_identifier(kind, name) {
            return Ok(ResponseJson(ApiResponse::error(e.to_string())));
        }
    }

    info!(
        "Repair of {} ranges of {}.{} requested",
        request.ranges.len(),
        request.keyspace,
        request.tables.join(",")
    );
    let job_id = state
        .job_manager
        .start_repair(state.nodetool_path.clone(), request)
        .await;
    Ok(ResponseJson(ApiResponse::success_with_job(job_id)))
}

pub async fn get_repair_status(
    _auth: ApiKeyAuth,
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> HandlerResult<()> {
    match state.job_manager.get_job_status(&job_id).await {
        Some(job_info) => {
            let mut response = ApiResponse::success();
            response.job_id = Some(job_info.job_id);
            response.job_status = Some(format!("{:?}", job_info.status));

            match job_info.status {
                JobStatus::Completed => response.output = job_info.output,
                JobStatus::Failed => response.error = job_info.error_message,
                JobStatus::Running => {
                    response.output = Some("Repair still running".to_string());
                }
            }

            Ok(ResponseJson(response))
        }
        None => Ok(ResponseJson(ApiResponse::error(format!(
            "Job {} not found",
            job_id
        )))),
    }
}

pub async fn kill_repairs(
    _auth: ApiKeyAuth,
    State(state): State<Arc<AppState>>,
) -> HandlerResult<Value> {
    let killed = state.job_manager.kill_all().await;
    if killed > 0 {
        warn!("Kill request stopped {} repair jobs", killed);
    }
    Ok(ResponseJson(ApiResponse::success_with_data(
        json!({ "killed": killed }),
    )))
}
