//! Repair run and range progress database operations.

use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{debug, error};

use super::records::{
    RangeProgressRecord, RepairRunRecord, RunStatus, RANGE_STATUS_FAILED, RANGE_STATUS_SUCCESS,
};
use super::Database;
use crate::repair::TableTokenRange;

impl Database {
    pub async fn store_repair_run(&self, run: &RepairRunRecord) -> Result<()> {
        debug!("Storing repair run {} ({})", run.run_id, run.status);

        match sqlx::query(
            r#"
            INSERT OR REPLACE INTO repair_runs (
                run_id, cluster_id, task_id, status, total_ranges, success_ranges,
                failed_ranges, skipped_ranges, error_message, started_at, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.run_id)
        .bind(&run.cluster_id)
        .bind(&run.task_id)
        .bind(&run.status)
        .bind(run.total_ranges)
        .bind(run.success_ranges)
        .bind(run.failed_ranges)
        .bind(run.skipped_ranges)
        .bind(&run.error_message)
        .bind(run.started_at)
        .bind(run.completed_at)
        .execute(&self.pool)
        .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                error!("Failed to store repair run {}: {}", run.run_id, e);
                Err(e.into())
            }
        }
    }

    pub async fn get_repair_run(&self, run_id: &str) -> Result<Option<RepairRunRecord>> {
        let row = sqlx::query(
            r#"
            SELECT run_id, cluster_id, task_id, status, total_ranges, success_ranges,
                   failed_ranges, skipped_ranges, error_message, started_at, completed_at
            FROM repair_runs
            WHERE run_id = ?
            "#,
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| run_from_row(&r)).transpose()
    }

    /// Most recent runs first
    pub async fn get_repair_runs(&self, limit: i64) -> Result<Vec<RepairRunRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT run_id, cluster_id, task_id, status, total_ranges, success_ranges,
                   failed_ranges, skipped_ranges, error_message, started_at, completed_at
            FROM repair_runs
            ORDER BY started_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(run_from_row).collect()
    }

    pub(super) async fn mark_interrupted_runs(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE repair_runs
            SET status = ?, completed_at = ?, error_message = 'Manager restarted during run'
            WHERE status = ?
            "#,
        )
        .bind(RunStatus::Interrupted.as_str())
        .bind(Utc::now())
        .bind(RunStatus::Running.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Record the outcome of `ranges`; a later write for the same range wins
    pub async fn record_range_progress(
        &self,
        cluster_id: &str,
        task_id: &str,
        run_id: &str,
        ranges: &[TableTokenRange],
        error_message: Option<&str>,
    ) -> Result<()> {
        let status = if error_message.is_none() {
            RANGE_STATUS_SUCCESS
        } else {
            RANGE_STATUS_FAILED
        };
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        for range in ranges {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO repair_progress (
                    cluster_id, task_id, keyspace, table_name, start_token, end_token,
                    run_id, status, error_message, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(cluster_id)
            .bind(task_id)
            .bind(&range.keyspace)
            .bind(&range.table)
            .bind(range.start_token)
            .bind(range.end_token)
            .bind(run_id)
            .bind(status)
            .bind(error_message)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(
            "Recorded {} ranges as {} for cluster {} task {}",
            ranges.len(),
            status,
            cluster_id,
            task_id
        );
        Ok(())
    }

    pub async fn get_repaired_ranges(
        &self,
        cluster_id: &str,
        task_id: &str,
    ) -> Result<Vec<RangeProgressRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT cluster_id, task_id, keyspace, table_name, start_token, end_token,
                   run_id, status, error_message, updated_at
            FROM repair_progress
            WHERE cluster_id = ? AND task_id = ? AND status = ?
            "#,
        )
        .bind(cluster_id)
        .bind(task_id)
        .bind(RANGE_STATUS_SUCCESS)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(progress_from_row).collect()
    }

    pub async fn get_run_progress(&self, run_id: &str) -> Result<Vec<RangeProgressRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT cluster_id, task_id, keyspace, table_name, start_token, end_token,
                   run_id, status, error_message, updated_at
            FROM repair_progress
            WHERE run_id = ?
            ORDER BY keyspace, table_name, start_token
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(progress_from_row).collect()
    }

    pub async fn clear_range_progress(&self, cluster_id: &str, task_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM repair_progress WHERE cluster_id = ? AND task_id = ?")
            .bind(cluster_id)
            .bind(task_id)
            .execute(&self.pool)
            .await?;

        debug!(
            "Cleared {} progress rows for cluster {} task {}",
            result.rows_affected(),
            cluster_id,
            task_id
        );
        Ok(result.rows_affected())
    }
}

fn run_from_row(row: &SqliteRow) -> Result<RepairRunRecord> {
    Ok(RepairRunRecord {
        run_id: row.try_get("run_id")?,
        cluster_id: row.try_get("cluster_id")?,
        task_id: row.try_get("task_id")?,
        status: row.try_get("status")?,
        total_ranges: row.try_get("total_ranges")?,
        success_ranges: row.try_get("success_ranges")?,
        failed_ranges: row.try_get("failed_ranges")?,
        skipped_ranges: row.try_get("skipped_ranges")?,
        error_message: row.try_get("error_message")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn progress_from_row(row: &SqliteRow) -> Result<RangeProgressRecord> {
    Ok(RangeProgressRecord {
        cluster_id: row.try_get("cluster_id")?,
        task_id: row.try_get("task_id")?,
        keyspace: row.try_get("keyspace")?,
        table_name: row.try_get("table_name")?,
        start_token: row.try_get("start_token")?,
        end_token: row.try_get("end_token")?,
        run_id: row.try_get("run_id")?,
        status: row.try_get("status")?,
        error_message: row.try_get("error_message")?,
        updated_at: row.try_get("updated_at")?,
    })
}
