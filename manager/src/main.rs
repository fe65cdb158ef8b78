use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use repair_manager::web::{start_web_server, AppState};
use repair_manager::{AgentClients, ConfigManager, Database, RepairScheduler, RepairService};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with reduced verbosity
    let env_filter = EnvFilter::from_default_env()
        .add_directive("repair_manager=info".parse()?)
        .add_directive("tower_http=warn".parse()?)
        .add_directive("tokio_cron_scheduler=warn".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("sqlx=warn".parse()?);

    fmt().with_env_filter(env_filter).init();

    info!("Starting Cluster Repair Manager");

    let config_dir = std::env::var("REPAIR_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
    let config_manager = ConfigManager::new(config_dir).await?;
    let config = config_manager.get_current_config();
    info!(
        "Configuration loaded: {} clusters, {} hosts",
        config.clusters.len(),
        config.clusters.values().map(|c| c.hosts.len()).sum::<usize>()
    );

    let database = Arc::new(Database::new(&config.database_path).await?);
    info!("Database initialized");

    let clients = Arc::new(AgentClients::new(config.clone()));
    let repair_service = RepairService::new(clients, database.clone(), config.clone());
    info!("Repair service initialized");

    let scheduler = RepairScheduler::new(repair_service.clone(), config.clone()).await?;
    match scheduler.start().await {
        Ok(count) => info!("Repair scheduler running {} cluster schedules", count),
        Err(e) => error!("Failed to start repair scheduler: {}", e),
    }
    let shutdown = scheduler.shutdown_token();

    let registry = repair_service.registry();
    let drain_limit = config.repair.graceful_shutdown_timeout() + std::time::Duration::from_secs(5);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown requested, cancelling active repairs");
        shutdown.cancel();
        for run in registry.active_runs() {
            if let Some(handle) = registry.get(&run.cluster_id) {
                handle.cancel.cancel();
            }
        }

        // Give the runs their graceful shutdown window before exiting
        let deadline = tokio::time::Instant::now() + drain_limit;
        while !registry.active_runs().is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        }
        info!("Repair manager stopped");
        std::process::exit(0);
    });

    let state = AppState::new(config.clone(), database, repair_service);
    info!("Starting web server on {}:{}", config.host, config.port);
    if let Err(e) = start_web_server(state).await {
        error!("Web server failed: {}", e);
        return Err(e);
    }

    Ok(())
}
