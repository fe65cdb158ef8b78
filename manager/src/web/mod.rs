pub mod handlers;
pub mod server;

pub use server::{create_router, start_web_server};

use std::sync::Arc;

use crate::config::Config;
use crate::database::Database;
use crate::repair::{NodeClientProvider, RepairService};

// Application state shared across all handlers
pub struct AppState<K: NodeClientProvider> {
    pub config: Arc<Config>,
    pub database: Arc<Database>,
    pub repair_service: RepairService<K>,
}

impl<K: NodeClientProvider> Clone for AppState<K> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            database: self.database.clone(),
            repair_service: self.repair_service.clone(),
        }
    }
}

impl<K: NodeClientProvider> AppState<K> {
    pub fn new(
        config: Arc<Config>,
        database: Arc<Database>,
        repair_service: RepairService<K>,
    ) -> Self {
        Self {
            config,
            database,
            repair_service,
        }
    }
}
