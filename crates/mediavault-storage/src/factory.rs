#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-s3")]
use crate::{S3Settings, S3Storage};
use crate::{Storage, StorageBackend, StorageError, StorageResult};
use mediavault_core::Config;
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;

/// Create a storage backend based on configuration
pub async fn create_storage(config: &Config) -> StorageResult<Arc<dyn Storage>> {
    let storage = &config.storage;

    match storage.backend {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => {
            let bucket = storage
                .s3_bucket
                .clone()
                .ok_or_else(|| StorageError::ConfigError("S3_BUCKET not configured".to_string()))?;
            let region = storage.s3_region.clone().ok_or_else(|| {
                StorageError::ConfigError("S3_REGION or AWS_REGION not configured".to_string())
            })?;

            let s3 = S3Storage::new(S3Settings {
                bucket,
                region,
                endpoint_url: storage.s3_endpoint.clone(),
                access_key_id: storage.s3_access_key_id.clone(),
                secret_access_key: storage.s3_secret_access_key.clone(),
                public_url: storage.s3_public_url.clone(),
                max_connections: storage.s3_max_connections,
                connect_timeout: storage.s3_connect_timeout,
                read_timeout: storage.s3_read_timeout,
            })
            .await?;
            Ok(Arc::new(s3))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::S3 => Err(StorageError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let local = LocalStorage::new(
                storage.local_storage_path.clone(),
                storage.local_storage_base_url.clone(),
            )
            .await?;
            Ok(Arc::new(local))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),
    }
}

static STORAGE: OnceLock<Mutex<Option<Arc<dyn Storage>>>> = OnceLock::new();

fn slot() -> &'static Mutex<Option<Arc<dyn Storage>>> {
    STORAGE.get_or_init(|| Mutex::new(None))
}

/// Process-wide storage provider, constructed on first use.
///
/// Concurrent first callers wait on the same initialization; later calls ignore
/// `config` and return the existing provider.
pub async fn get_storage(config: &Config) -> StorageResult<Arc<dyn Storage>> {
    let mut guard = slot().lock().await;
    if let Some(storage) = guard.as_ref() {
        return Ok(storage.clone());
    }

    let storage = create_storage(config).await?;
    tracing::info!(backend = %storage.backend_type(), "Storage provider initialized");
    *guard = Some(storage.clone());
    Ok(storage)
}

/// Drop the process-wide provider so the next [`get_storage`] builds a fresh one.
/// Only meant for test isolation.
pub async fn reset_storage() {
    *slot().lock().await = None;
}
