//! Application setup and initialization
//!
//! Everything main needs to go from a parsed [`Config`] to a router ready to serve.

pub mod routes;
pub mod server;
pub mod storage;

use crate::state::AppState;
use anyhow::{Context, Result};
use mediavault_core::{Config, LoggingCatalogWriter};
use mediavault_processing::FfmpegTranscoder;
use std::sync::Arc;

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    config.validate().context("Configuration validation failed")?;

    crate::telemetry::init_telemetry(&config.base.log_format)
        .context("Failed to initialize telemetry")?;

    tracing::info!(
        environment = %config.base.environment,
        "Configuration loaded and validated successfully"
    );

    let storage = storage::setup_storage(&config).await?;

    tokio::fs::create_dir_all(&config.transcode.scratch_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create transcode scratch dir {}",
                config.transcode.scratch_dir.display()
            )
        })?;
    let transcoder = Arc::new(FfmpegTranscoder::new(
        config.transcode.ffmpeg_path.clone(),
        config.transcode.timeout,
    ));

    let sweep_interval = config.uploads.sweep_interval;
    let state = Arc::new(AppState::new(
        config,
        storage,
        Arc::new(LoggingCatalogWriter),
        transcoder,
    ));

    // Detached: the sweeper lives as long as the runtime.
    let _sweeper = state.sessions.clone().start_sweeper(sweep_interval);
    tracing::info!(
        interval_secs = sweep_interval.as_secs(),
        "Upload session sweeper started"
    );

    let router = routes::setup_routes(&state.config, state.clone())?;

    Ok((state, router))
}
