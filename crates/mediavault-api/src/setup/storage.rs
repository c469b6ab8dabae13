//! Storage setup and initialization

use anyhow::{Context, Result};
use mediavault_core::Config;
use mediavault_storage::{get_storage, Storage};
use std::sync::Arc;

/// Resolve the process-wide storage provider selected by `STORAGE_BACKEND`.
pub async fn setup_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    tracing::info!(backend = %config.storage.backend, "Initializing storage...");
    let storage = get_storage(config)
        .await
        .context("Failed to initialize storage backend")?;
    tracing::info!(
        backend = %storage.backend_type(),
        "Storage initialized successfully"
    );
    Ok(storage)
}
