//! Application state shared by every handler.

use crate::services::{MultipartCoordinator, UploadSessionStore};
use mediavault_core::{CatalogWriter, Config};
use mediavault_processing::{TranscodeCache, Transcoder};
use mediavault_storage::Storage;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Arc<dyn Storage>,
    pub sessions: Arc<UploadSessionStore>,
    pub multipart: MultipartCoordinator,
    pub transcode: TranscodeCache,
    pub catalog: Arc<dyn CatalogWriter>,
}

impl AppState {
    /// Wire the services around one storage provider, catalog writer and encoder.
    pub fn new(
        config: Config,
        storage: Arc<dyn Storage>,
        catalog: Arc<dyn CatalogWriter>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        let uploads = &config.uploads;
        let sessions = Arc::new(UploadSessionStore::new(
            uploads.session_ttl,
            uploads.max_chunk_size_bytes,
            uploads.max_chunked_upload_bytes,
        ));

        let multipart = MultipartCoordinator::new(
            storage.clone(),
            catalog.clone(),
            uploads.multipart_max_total_bytes,
            uploads.multipart_max_parts,
            uploads.multipart_url_expiry,
        );

        let transcode = TranscodeCache::new(
            storage.clone(),
            transcoder,
            config.transcode.scratch_dir.clone(),
            config.transcode.signed_url_expiry,
            config.transcode.max_concurrent_transcodes,
        );

        Self {
            config: Arc::new(config),
            storage,
            sessions,
            multipart,
            transcode,
            catalog,
        }
    }
}
