use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use repair_agent::{create_router, AppState};

const JOB_RETENTION_HOURS: i64 = 12;

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::from_default_env()
        .add_directive("repair_agent=info".parse()?)
        .add_directive("tower_http=warn".parse()?);
    fmt().with_env_filter(env_filter).init();

    let bind_address =
        std::env::var("AGENT_BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8746".to_string());
    let api_key = std::env::var("AGENT_API_KEY")
        .unwrap_or_else(|_| "default-development-key".to_string());
    if api_key == "default-development-key" {
        warn!("Using default development API key - set AGENT_API_KEY environment variable for production");
    }
    let nodetool_path = std::env::var("NODETOOL_PATH").unwrap_or_else(|_| "nodetool".to_string());
    let data_dir = PathBuf::from(
        std::env::var("DATA_DIR").unwrap_or_else(|_| "/var/lib/scylla/data".to_string()),
    );

    info!(
        "Starting Repair Agent on {} (nodetool: {}, data: {})",
        bind_address,
        nodetool_path,
        data_dir.display()
    );

    let state = Arc::new(AppState::new(api_key, nodetool_path, data_dir));

    let jobs = state.job_manager.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            jobs.cleanup_old_jobs(JOB_RETENTION_HOURS).await;
        }
    });

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Repair agent listening on {}", bind_address);

    axum::serve(listener, app).await?;
    Ok(())
}
