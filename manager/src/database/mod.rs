//! Database layer for the repair manager.
//!
//! This module provides SQLite persistence for:
//! - Repair runs (one row per run with range counters)
//! - Range progress (per-range outcome, used to resume interrupted tasks)
//!
//! The module is organized into submodules:
//! - `records` - All record types (entities)
//! - `repair` - Repair run and range progress operations

mod records;
mod repair;

pub use records::*;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use tracing::{error, info, warn};

pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Expose pool for integration test queries
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn new(database_path: &str) -> Result<Self> {
        info!("Opening repair database: {}", database_path);

        let pool = if database_path == ":memory:" {
            // Every connection would get its own empty in-memory database
            SqlitePoolOptions::new()
                .max_connections(1)
                .connect("sqlite::memory:")
                .await?
        } else {
            if let Some(parent) = Path::new(database_path).parent() {
                if !parent.as_os_str().is_empty() {
                    if let Err(e) = tokio::fs::create_dir_all(parent).await {
                        error!("Failed to create database directory {:?}: {}", parent, e);
                        return Err(e.into());
                    }
                }
            }

            let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", database_path))?
                .create_if_missing(true);
            match SqlitePoolOptions::new().connect_with(options).await {
                Ok(pool) => pool,
                Err(e) => {
                    error!("Failed to connect to database {}: {}", database_path, e);
                    return Err(e.into());
                }
            }
        };

        let database = Self { pool };
        database.initialize_tables().await?;

        // Runs left in "running" by a previous process never finished
        match database.mark_interrupted_runs().await {
            Ok(0) => {}
            Ok(count) => warn!("Marked {} unfinished repair runs as interrupted", count),
            Err(e) => warn!("Failed to clean up unfinished repair runs: {}", e),
        }

        info!("Repair database ready");
        Ok(database)
    }

    async fn initialize_tables(&self) -> Result<()> {
        let runs_table_sql = r#"
            CREATE TABLE IF NOT EXISTS repair_runs (
                run_id TEXT PRIMARY KEY,
                cluster_id TEXT NOT NULL,
                task_id TEXT NOT NULL,
                status TEXT NOT NULL,
                total_ranges INTEGER NOT NULL DEFAULT 0,
                success_ranges INTEGER NOT NULL DEFAULT 0,
                failed_ranges INTEGER NOT NULL DEFAULT 0,
                skipped_ranges INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                started_at DATETIME NOT NULL,
                completed_at DATETIME
            )
        "#;
        if let Err(e) = sqlx::query(runs_table_sql).execute(&self.pool).await {
            error!("Failed to create repair_runs table: {}", e);
            return Err(e.into());
        }

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_repair_runs_started ON repair_runs(started_at DESC)",
        )
        .execute(&self.pool)
        .await?;

        let progress_table_sql = r#"
            CREATE TABLE IF NOT EXISTS repair_progress (
                cluster_id TEXT NOT NULL,
                task_id TEXT NOT NULL,
                keyspace TEXT NOT NULL,
                table_name TEXT NOT NULL,
                start_token INTEGER NOT NULL,
                end_token INTEGER NOT NULL,
                run_id TEXT NOT NULL,
                status TEXT NOT NULL,
                error_message TEXT,
                updated_at DATETIME NOT NULL,
                PRIMARY KEY (cluster_id, task_id, keyspace, table_name, start_token, end_token)
            )
        "#;
        if let Err(e) = sqlx::query(progress_table_sql).execute(&self.pool).await {
            error!("Failed to create repair_progress table: {}", e);
            return Err(e.into());
        }

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_repair_progress_run ON repair_progress(run_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
