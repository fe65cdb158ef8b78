pub mod handlers;
pub mod middleware;
pub mod services;
pub mod types;

use axum::{
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::services::job_manager::JobManager;

// Application state
pub struct AppState {
    pub api_key: String,
    pub nodetool_path: String,
    pub data_dir: PathBuf,
    pub job_manager: JobManager,
}

impl AppState {
    pub fn new(api_key: String, nodetool_path: String, data_dir: PathBuf) -> Self {
        Self {
            api_key,
            nodetool_path,
            data_dir,
            job_manager: JobManager::new(),
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/node/info", get(handlers::get_node_info))
        .route("/storage/ring/{keyspace}", get(handlers::get_ring))
        .route("/storage/tables/{keyspace}", get(handlers::get_tables))
        .route("/storage/table-size", post(handlers::get_table_size))
        .route("/repair/start", post(handlers::start_repair))
        .route("/repair/status/{job_id}", get(handlers::get_repair_status))
        .route("/repair/kill", post(handlers::kill_repairs))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
