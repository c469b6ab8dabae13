//! Direct-to-backend multipart uploads.
//!
//! Part bytes never pass through this process: the client PUTs each part to a presigned
//! URL and only the part numbers and ETags come back here for the final stitch.

use crate::error::storage_app_error;
use crate::services::upload_sessions::notify_catalog;
use mediavault_core::formats;
use mediavault_core::{AppError, CatalogWriter, UploadKind};
use mediavault_storage::keys::{destination_key, parse_destination};
use mediavault_storage::{CompletedPartInfo, Storage, StorageError};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Highest part number the multipart protocol accepts.
pub const MAX_PART_NUMBER: u32 = 10_000;

#[derive(Debug, Clone)]
pub struct MultipartInit {
    pub kind: UploadKind,
    pub target_id: String,
    pub filename: String,
    pub total_size: u64,
    pub part_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartUrl {
    pub part_number: u32,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartHandle {
    pub upload_id: String,
    pub storage_path: String,
    pub part_urls: Vec<PartUrl>,
}

#[derive(Clone)]
pub struct MultipartCoordinator {
    storage: Arc<dyn Storage>,
    catalog: Arc<dyn CatalogWriter>,
    max_total_bytes: u64,
    max_parts: u32,
    url_expiry: Duration,
}

impl MultipartCoordinator {
    pub fn new(
        storage: Arc<dyn Storage>,
        catalog: Arc<dyn CatalogWriter>,
        max_total_bytes: u64,
        max_parts: u32,
        url_expiry: Duration,
    ) -> Self {
        Self {
            storage,
            catalog,
            max_total_bytes,
            max_parts: max_parts.min(MAX_PART_NUMBER),
            url_expiry,
        }
    }

    /// Open a multipart transaction and presign one PUT URL per part.
    pub async fn initiate(&self, init: MultipartInit) -> Result<MultipartHandle, AppError> {
        if init.part_count == 0 || init.part_count > self.max_parts {
            return Err(AppError::InvalidInput(format!(
                "partCount must be between 1 and {}",
                self.max_parts
            )));
        }
        if init.total_size > self.max_total_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "File size {} exceeds maximum allowed size of {} bytes",
                init.total_size, self.max_total_bytes
            )));
        }

        let path = destination_key(init.kind, &init.target_id, &init.filename)
            .map_err(invalid_destination)?;
        let content_type = formats::content_type_for_path(&path);

        let upload_id = match self.storage.create_multipart(&path, content_type).await {
            Ok(id) => id,
            Err(StorageError::Unsupported(_)) => {
                return Err(AppError::InvalidInput(
                    "Direct multipart upload is not supported by this storage backend; use chunked upload"
                        .to_string(),
                ))
            }
            Err(e) => return Err(storage_app_error(e)),
        };

        let mut part_urls = Vec::with_capacity(init.part_count as usize);
        for part_number in 1..=init.part_count {
            match self
                .storage
                .presigned_part_url(&path, &upload_id, part_number, self.url_expiry)
                .await
            {
                Ok(url) => part_urls.push(PartUrl { part_number, url }),
                Err(e) => {
                    if let Err(abort_err) = self.storage.abort_multipart(&path, &upload_id).await {
                        tracing::warn!(
                            upload_id = %upload_id,
                            key = %path,
                            error = %abort_err,
                            "Failed to abort multipart upload after presign failure"
                        );
                    }
                    return Err(storage_app_error(e));
                }
            }
        }

        tracing::info!(
            upload_id = %upload_id,
            key = %path,
            part_count = init.part_count,
            total_size = init.total_size,
            "Multipart upload initiated"
        );

        Ok(MultipartHandle {
            upload_id,
            storage_path: path,
            part_urls,
        })
    }

    /// Stitch the uploaded parts, in ascending part order, into the final object.
    pub async fn complete(
        &self,
        upload_id: &str,
        path: &str,
        mut parts: Vec<CompletedPartInfo>,
    ) -> Result<String, AppError> {
        if parts.is_empty() {
            return Err(AppError::InvalidInput("parts must not be empty".to_string()));
        }

        let mut seen = HashSet::with_capacity(parts.len());
        for part in &parts {
            if part.part_number == 0 || part.part_number > MAX_PART_NUMBER {
                return Err(AppError::InvalidInput(format!(
                    "partNumber {} out of range 1..={}",
                    part.part_number, MAX_PART_NUMBER
                )));
            }
            if part.etag.trim().is_empty() {
                return Err(AppError::InvalidInput(format!(
                    "etag missing for part {}",
                    part.part_number
                )));
            }
            if !seen.insert(part.part_number) {
                return Err(AppError::InvalidInput(format!(
                    "duplicate partNumber {}",
                    part.part_number
                )));
            }
        }
        parts.sort_by_key(|p| p.part_number);

        let file = self
            .storage
            .complete_multipart(path, upload_id, &parts)
            .await
            .map_err(storage_app_error)?;

        tracing::info!(
            upload_id = %upload_id,
            key = %file.path,
            parts = parts.len(),
            size_bytes = file.size,
            "Multipart upload completed"
        );

        match parse_destination(&file.path) {
            Some((kind, target_id)) => {
                notify_catalog(self.catalog.as_ref(), kind, &target_id, &file.path).await
            }
            None => tracing::debug!(
                key = %file.path,
                "Multipart upload path has no catalog owner"
            ),
        }

        Ok(file.path)
    }

    /// Discard all parts of a multipart transaction. Aborting twice is not an error.
    pub async fn abort(&self, upload_id: &str, path: &str) -> Result<(), AppError> {
        self.storage
            .abort_multipart(path, upload_id)
            .await
            .map_err(storage_app_error)?;
        tracing::info!(upload_id = %upload_id, key = %path, "Multipart upload aborted");
        Ok(())
    }
}

fn invalid_destination(err: StorageError) -> AppError {
    AppError::InvalidInput(err.to_string())
}
