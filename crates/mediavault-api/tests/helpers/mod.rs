//! Test helpers: build AppState and router for integration tests.
//!
//! Every test app gets its own temp directory for Local storage and transcode scratch
//! space, a catalog writer that records updates and an encoder stub that counts runs.

#![allow(dead_code)]

pub mod fakes;
pub mod storage;

use axum_test::TestServer;
use fakes::{CountingTranscoder, RecordingCatalogWriter};
use mediavault_api::constants;
use mediavault_api::setup::routes;
use mediavault_api::state::AppState;
use mediavault_core::Config;
use mediavault_storage::{LocalStorage, Storage};
use std::sync::Arc;
use storage::MultipartLocalStorage;
use tempfile::TempDir;

/// API path prefix for tests (e.g. `/api/v0`).
pub fn api_path(path: &str) -> String {
    format!("{}{}", constants::API_PREFIX, path)
}

/// Test application: server and owned resources.
pub struct TestApp {
    pub server: TestServer,
    pub storage: Arc<dyn Storage>,
    pub catalog: Arc<RecordingCatalogWriter>,
    pub transcoder: Arc<CountingTranscoder>,
    pub _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    /// Store `data` at `path` directly, bypassing the HTTP surface.
    pub async fn put_object(&self, path: &str, data: &[u8]) {
        self.storage
            .upload(
                path,
                bytes::Bytes::copy_from_slice(data),
                &Default::default(),
            )
            .await
            .expect("Failed to seed object");
    }
}

pub fn create_test_config(temp_dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.storage.local_storage_path = temp_dir.path().join("storage");
    config.storage.local_storage_base_url = "http://localhost:4000/api/v0/media".to_string();
    config.transcode.scratch_dir = temp_dir.path().join("scratch");
    config.streaming.range_chunk_size = 1024;
    config.uploads.max_chunk_size_bytes = 64 * 1024;
    config.uploads.max_chunked_upload_bytes = 256 * 1024;
    config
}

/// Setup test app with Local storage (multipart unsupported).
pub async fn setup_test_app() -> TestApp {
    setup_test_app_with(|_| {}, false).await
}

/// Setup test app whose storage also accepts multipart transactions.
pub async fn setup_multipart_test_app() -> TestApp {
    setup_test_app_with(|_| {}, true).await
}

pub async fn setup_test_app_with(customize: impl FnOnce(&mut Config), multipart: bool) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let mut config = create_test_config(&temp_dir);
    customize(&mut config);

    let local = LocalStorage::new(
        config.storage.local_storage_path.clone(),
        config.storage.local_storage_base_url.clone(),
    )
    .await
    .expect("Failed to create local storage");

    let storage: Arc<dyn Storage> = if multipart {
        Arc::new(MultipartLocalStorage::new(local))
    } else {
        Arc::new(local)
    };

    let catalog = Arc::new(RecordingCatalogWriter::default());
    let transcoder = Arc::new(CountingTranscoder::default());

    let state = Arc::new(AppState::new(
        config.clone(),
        storage.clone(),
        catalog.clone(),
        transcoder.clone(),
    ));

    let router = routes::setup_routes(&config, state).expect("Failed to build router");
    let server = TestServer::new(router).expect("Failed to create test server");

    TestApp {
        server,
        storage,
        catalog,
        transcoder,
        _temp_dir: temp_dir,
    }
}
