pub mod check;
pub mod crawl;
pub mod export;
pub mod status;

use std::sync::Arc;

use anyhow::Result;
use linkscan_core::config::AppConfig;
use linkscan_storage::{JobStore, MemoryStore, PgStore};

/// Pick the store backend for this invocation. The Postgres path runs
/// migrations so a fresh database works out of the box.
pub async fn build_store(config: &AppConfig, memory: bool) -> Result<Arc<dyn JobStore>> {
    if memory {
        return Ok(Arc::new(MemoryStore::new()));
    }
    let store = PgStore::new(&config.database.url).await?;
    store.run_migrations().await?;
    Ok(Arc::new(store))
}
