//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use mediavault_core::{ObjectMetadata, StorageFile};
use std::collections::HashMap;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Invalid byte range: {0}")]
    InvalidRange(String),

    #[error("Operation not supported by this backend: {0}")]
    Unsupported(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed byte stream returned by streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// Options for [`Storage::upload`].
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Explicit content type; derived from the path extension when absent.
    pub content_type: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl UploadOptions {
    pub fn with_content_type(content_type: impl Into<String>) -> Self {
        Self {
            content_type: Some(content_type.into()),
            metadata: HashMap::new(),
        }
    }
}

/// A finished part of a multipart upload as reported by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPartInfo {
    pub part_number: u32,
    pub etag: String,
}

/// Storage abstraction trait
///
/// All storage backends (S3, local filesystem) implement this trait. Paths are
/// forward-slash-delimited relative keys; see [`crate::keys`] for the layouts in use.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Write the full content at `path`, overwriting any existing object.
    async fn upload(
        &self,
        path: &str,
        data: Bytes,
        options: &UploadOptions,
    ) -> StorageResult<StorageFile>;

    /// Write the content of the local file `source` at `path`.
    ///
    /// The default reads the file into memory; backends that can stream from disk override it.
    async fn upload_file(
        &self,
        path: &str,
        source: &Path,
        options: &UploadOptions,
    ) -> StorageResult<StorageFile> {
        let data = tokio::fs::read(source).await?;
        self.upload(path, Bytes::from(data), options).await
    }

    /// Read the full object into memory.
    async fn download(&self, path: &str) -> StorageResult<Bytes>;

    /// Size, content type and modification time without reading the body.
    async fn metadata(&self, path: &str) -> StorageResult<ObjectMetadata>;

    /// Read bytes `start..=end`. Returns exactly `end - start + 1` bytes.
    async fn download_range(&self, path: &str, start: u64, end: u64) -> StorageResult<Bytes>;

    /// Streaming variant of [`Storage::download_range`]. Never buffers the object;
    /// dropping the stream closes the underlying reader.
    async fn download_range_stream(
        &self,
        path: &str,
        start: u64,
        end: u64,
    ) -> StorageResult<ByteStream>;

    /// Time-limited URL for reading the object directly.
    async fn signed_url(&self, path: &str, expires_in: Duration) -> StorageResult<String>;

    /// Time-limited URL for a direct PUT. `None` means direct upload is unsupported and
    /// the caller must fall back to a buffered upload.
    async fn upload_url(
        &self,
        path: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> StorageResult<Option<String>>;

    async fn exists(&self, path: &str) -> StorageResult<bool>;

    /// Idempotent: deleting a missing path succeeds.
    async fn delete(&self, path: &str) -> StorageResult<()>;

    /// All objects under `prefix`, sorted by path.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<StorageFile>>;

    async fn copy(&self, source: &str, dest: &str) -> StorageResult<StorageFile>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;

    /// Open a backend multipart transaction and return its upload id.
    async fn create_multipart(&self, path: &str, _content_type: &str) -> StorageResult<String> {
        Err(StorageError::Unsupported(format!(
            "multipart upload to {} on {} backend",
            path,
            self.backend_type()
        )))
    }

    /// Signed PUT URL for one part of an open multipart transaction.
    async fn presigned_part_url(
        &self,
        path: &str,
        _upload_id: &str,
        _part_number: u32,
        _expires_in: Duration,
    ) -> StorageResult<String> {
        Err(StorageError::Unsupported(format!(
            "multipart upload to {} on {} backend",
            path,
            self.backend_type()
        )))
    }

    /// Stitch the given parts, which must be sorted by part number, into the final object.
    async fn complete_multipart(
        &self,
        path: &str,
        _upload_id: &str,
        _parts: &[CompletedPartInfo],
    ) -> StorageResult<StorageFile> {
        Err(StorageError::Unsupported(format!(
            "multipart upload to {} on {} backend",
            path,
            self.backend_type()
        )))
    }

    /// Discard all uploaded parts. Idempotent against an already-aborted id.
    async fn abort_multipart(&self, path: &str, _upload_id: &str) -> StorageResult<()> {
        Err(StorageError::Unsupported(format!(
            "multipart upload to {} on {} backend",
            path,
            self.backend_type()
        )))
    }
}

/// Validate an inclusive byte range against an object size.
pub(crate) fn check_range(path: &str, start: u64, end: u64, size: u64) -> StorageResult<()> {
    if start > end || end >= size {
        return Err(StorageError::InvalidRange(format!(
            "{}-{} outside {} ({} bytes)",
            start, end, path, size
        )));
    }
    Ok(())
}
