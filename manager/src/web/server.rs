use crate::repair::NodeClientProvider;
use crate::web::{handlers, AppState};
use anyhow::Result;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub async fn start_web_server<K: NodeClientProvider>(state: AppState<K>) -> Result<()> {
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server running on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn create_router<K: NodeClientProvider>(state: AppState<K>) -> Router {
    Router::new()
        // === CLUSTER REPAIR ROUTES ===
        .route(
            "/api/clusters/{cluster_id}/repair",
            post(handlers::start_repair::<K>),
        )
        .route(
            "/api/clusters/{cluster_id}/repair/cancel",
            post(handlers::cancel_repair::<K>),
        )
        .route(
            "/api/clusters/{cluster_id}/repair/intensity",
            put(handlers::set_repair_intensity::<K>),
        )
        .route(
            "/api/clusters/{cluster_id}/repair/parallel",
            put(handlers::set_repair_parallel::<K>),
        )
        .route(
            "/api/clusters/{cluster_id}/repair/status",
            get(handlers::get_repair_status::<K>),
        )
        // === RUN HISTORY ROUTES ===
        .route("/api/repair/runs", get(handlers::list_repair_runs::<K>))
        .route(
            "/api/repair/runs/{run_id}/progress",
            get(handlers::get_run_progress::<K>),
        )
        // Add middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
