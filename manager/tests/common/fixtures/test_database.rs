//! Test database utilities for in-memory SQLite testing

use anyhow::Result;
use std::sync::Arc;

use repair_manager::Database;

/// In-memory ledger with the production schema
pub struct TestDatabase {
    db: Arc<Database>,
}

impl TestDatabase {
    pub async fn new() -> Result<Self> {
        let db = Database::new(":memory:").await?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn db(&self) -> Arc<Database> {
        self.db.clone()
    }

    pub async fn count_rows(&self, table: &str) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(self.db.pool())
            .await?;
        Ok(row.0)
    }
}
