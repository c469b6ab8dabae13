use crate::keys::validate_key;
use crate::traits::{
    ByteStream, CompletedPartInfo, Storage, StorageError, StorageResult, UploadOptions,
};
use crate::StorageBackend;
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::retry::{RetryConfig, RetryMode};
use aws_config::timeout::TimeoutConfig;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::abort_multipart_upload::AbortMultipartUploadError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream as S3ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use mediavault_core::formats::content_type_for_path;
use mediavault_core::{ObjectMetadata, StorageFile};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::io::ReaderStream;

/// Connection settings for [`S3Storage`].
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible providers (MinIO, R2, Spaces)
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Public base URL of the bucket; when set, read URLs are not presigned.
    pub public_url: Option<String>,
    pub max_connections: usize,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

/// S3 storage implementation
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    public_url: Option<String>,
    /// Bounds in-flight requests to the connection budget. Body streams hold no permit.
    permits: Arc<Semaphore>,
    /// Longest a request waits for a permit before failing.
    permit_wait: Duration,
}

async fn acquire_permit(
    permits: &Arc<Semaphore>,
    wait: Duration,
) -> StorageResult<OwnedSemaphorePermit> {
    match tokio::time::timeout(wait, permits.clone().acquire_owned()).await {
        Ok(Ok(permit)) => Ok(permit),
        Ok(Err(e)) => Err(StorageError::BackendError(e.to_string())),
        Err(_) => {
            tracing::warn!(
                wait_ms = wait.as_millis() as u64,
                "All S3 connections busy; giving up on request"
            );
            Err(StorageError::BackendError(
                "Timed out waiting for a storage connection".to_string(),
            ))
        }
    }
}

fn to_chrono(dt: &aws_sdk_s3::primitives::DateTime) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(dt.secs(), dt.subsec_nanos()).unwrap_or_else(Utc::now)
}

impl S3Storage {
    pub async fn new(settings: S3Settings) -> StorageResult<Self> {
        let region_provider =
            RegionProviderChain::first_try(aws_config::Region::new(settings.region.clone()));

        let retry_config = RetryConfig::standard()
            .with_max_attempts(3)
            .with_retry_mode(RetryMode::Adaptive);

        let timeout_config = TimeoutConfig::builder()
            .connect_timeout(settings.connect_timeout)
            .read_timeout(settings.read_timeout)
            .build();

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .retry_config(retry_config.clone())
            .timeout_config(timeout_config.clone());

        match (&settings.access_key_id, &settings.secret_access_key) {
            (Some(access_key), Some(secret_key)) => {
                loader = loader.credentials_provider(Credentials::new(
                    access_key.clone(),
                    secret_key.clone(),
                    None,
                    None,
                    "mediavault",
                ));
            }
            (None, None) => {}
            _ => {
                return Err(StorageError::ConfigError(
                    "S3_ACCESS_KEY_ID and S3_SECRET_ACCESS_KEY must be set together".to_string(),
                ))
            }
        }

        let config = loader.load().await;

        let client = if let Some(ref endpoint) = settings.endpoint_url {
            // S3-compatible providers generally need path-style addressing
            let s3_config = aws_sdk_s3::config::Builder::from(&config)
                .endpoint_url(endpoint)
                .force_path_style(true)
                .build();
            Client::from_conf(s3_config)
        } else {
            Client::new(&config)
        };

        tracing::info!(
            bucket = %settings.bucket,
            region = %settings.region,
            endpoint = ?settings.endpoint_url,
            max_connections = settings.max_connections,
            "S3 storage initialized"
        );

        Ok(S3Storage {
            client,
            bucket: settings.bucket,
            public_url: settings
                .public_url
                .map(|u| u.trim_end_matches('/').to_string()),
            permits: Arc::new(Semaphore::new(settings.max_connections.max(1))),
            permit_wait: settings.connect_timeout + settings.read_timeout,
        })
    }

    async fn permit(&self) -> StorageResult<OwnedSemaphorePermit> {
        acquire_permit(&self.permits, self.permit_wait).await
    }

    fn presigning(expires_in: Duration) -> StorageResult<PresigningConfig> {
        PresigningConfig::builder()
            .expires_in(expires_in)
            .build()
            .map_err(|e| StorageError::BackendError(e.to_string()))
    }

    async fn get_object(
        &self,
        key: &str,
        range: Option<String>,
    ) -> StorageResult<aws_sdk_s3::operation::get_object::GetObjectOutput> {
        let start = std::time::Instant::now();
        self.client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .set_range(range)
            .send()
            .await
            .map_err(|e| match &e {
                SdkError::ServiceError(service_err)
                    if matches!(service_err.err(), GetObjectError::NoSuchKey(_)) =>
                {
                    StorageError::NotFound(key.to_string())
                }
                SdkError::ServiceError(service_err)
                    if service_err.raw().status().as_u16() == 416 =>
                {
                    StorageError::InvalidRange(key.to_string())
                }
                _ => {
                    tracing::error!(
                        error = %e,
                        bucket = %self.bucket,
                        key = %key,
                        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                        "S3 download failed"
                    );
                    StorageError::DownloadFailed(e.to_string())
                }
            })
    }

    /// Single PutObject; the body is streamed when it comes from a file.
    async fn put_object(
        &self,
        key: &str,
        body: S3ByteStream,
        size: u64,
        options: &UploadOptions,
    ) -> StorageResult<StorageFile> {
        let _permit = self.permit().await?;
        let content_type = options
            .content_type
            .clone()
            .unwrap_or_else(|| content_type_for_path(key).to_string());
        let start = std::time::Instant::now();

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_length(size as i64)
            .content_type(&content_type);
        for (name, value) in &options.metadata {
            request = request.metadata(name, value);
        }

        request.send().await.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 upload failed"
            );
            StorageError::UploadFailed(e.to_string())
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(StorageFile {
            path: key.to_string(),
            size,
            content_type,
            last_modified: Utc::now(),
        })
    }

    fn range_header(start: u64, end: u64) -> StorageResult<String> {
        if start > end {
            return Err(StorageError::InvalidRange(format!("{}-{}", start, end)));
        }
        Ok(format!("bytes={}-{}", start, end))
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn upload(
        &self,
        key: &str,
        data: Bytes,
        options: &UploadOptions,
    ) -> StorageResult<StorageFile> {
        validate_key(key)?;
        let size = data.len() as u64;
        self.put_object(key, S3ByteStream::from(data), size, options).await
    }

    async fn upload_file(
        &self,
        key: &str,
        source: &Path,
        options: &UploadOptions,
    ) -> StorageResult<StorageFile> {
        validate_key(key)?;
        let size = tokio::fs::metadata(source).await?.len();
        let body = S3ByteStream::from_path(source).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to open {}: {}", source.display(), e))
        })?;
        self.put_object(key, body, size, options).await
    }

    async fn download(&self, key: &str) -> StorageResult<Bytes> {
        validate_key(key)?;
        let _permit = self.permit().await?;
        let response = self.get_object(key, None).await?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;

        Ok(data.into_bytes())
    }

    async fn metadata(&self, key: &str) -> StorageResult<ObjectMetadata> {
        validate_key(key)?;
        let _permit = self.permit().await?;

        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match &e {
                SdkError::ServiceError(service_err)
                    if matches!(service_err.err(), HeadObjectError::NotFound(_)) =>
                {
                    StorageError::NotFound(key.to_string())
                }
                _ => StorageError::BackendError(e.to_string()),
            })?;

        Ok(ObjectMetadata {
            size: head.content_length().unwrap_or(0).max(0) as u64,
            content_type: head
                .content_type()
                .map(String::from)
                .unwrap_or_else(|| content_type_for_path(key).to_string()),
            last_modified: head
                .last_modified()
                .map(to_chrono)
                .unwrap_or_else(Utc::now),
        })
    }

    async fn download_range(&self, key: &str, start: u64, end: u64) -> StorageResult<Bytes> {
        validate_key(key)?;
        let range = Self::range_header(start, end)?;
        let _permit = self.permit().await?;
        let response = self.get_object(key, Some(range)).await?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?
            .into_bytes();

        if data.len() as u64 != end - start + 1 {
            return Err(StorageError::InvalidRange(format!(
                "{}-{} of {} returned {} bytes",
                start,
                end,
                key,
                data.len()
            )));
        }
        Ok(data)
    }

    async fn download_range_stream(
        &self,
        key: &str,
        start: u64,
        end: u64,
    ) -> StorageResult<ByteStream> {
        validate_key(key)?;
        let range = Self::range_header(start, end)?;
        let permit = self.permit().await?;
        let response = self.get_object(key, Some(range)).await?;
        drop(permit);

        let key = key.to_string();
        let stream = ReaderStream::new(response.body.into_async_read()).map(move |result| {
            result.map_err(|e| {
                tracing::error!(key = %key, error = %e, "S3 stream download error");
                StorageError::DownloadFailed(e.to_string())
            })
        });

        Ok(Box::pin(stream))
    }

    async fn signed_url(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        validate_key(key)?;
        if let Some(ref public) = self.public_url {
            return Ok(format!("{}/{}", public, key));
        }

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(Self::presigning(expires_in)?)
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }

    async fn upload_url(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> StorageResult<Option<String>> {
        validate_key(key)?;
        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(Self::presigning(expires_in)?)
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;

        Ok(Some(presigned.uri().to_string()))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self.metadata(key).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        let _permit = self.permit().await?;
        let start = std::time::Instant::now();

        // DeleteObject succeeds for missing keys, which keeps this idempotent.
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 delete failed"
                );
                StorageError::DeleteFailed(e.to_string())
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
        );

        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<StorageFile>> {
        let _permit = self.permit().await?;
        let mut files = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| StorageError::BackendError(e.to_string()))?;

            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                files.push(StorageFile {
                    path: key.to_string(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    content_type: content_type_for_path(key).to_string(),
                    last_modified: object
                        .last_modified()
                        .map(to_chrono)
                        .unwrap_or_else(Utc::now),
                });
            }

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    async fn copy(&self, source: &str, dest: &str) -> StorageResult<StorageFile> {
        validate_key(source)?;
        validate_key(dest)?;
        if !self.exists(source).await? {
            return Err(StorageError::NotFound(source.to_string()));
        }

        let start = std::time::Instant::now();
        // The copy source must be URL-encoded per the S3 API
        let copy_source = format!("{}/{}", self.bucket, urlencoding::encode(source));

        {
            let _permit = self.permit().await?;
            self.client
                .copy_object()
                .bucket(&self.bucket)
                .copy_source(&copy_source)
                .key(dest)
                .send()
                .await
                .map_err(|e| StorageError::BackendError(e.to_string()))?;
        }

        tracing::info!(
            from_key = %source,
            to_key = %dest,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 copy successful"
        );

        self.metadata(dest).await.map(|m| m.into_storage_file(dest))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }

    async fn create_multipart(&self, key: &str, content_type: &str) -> StorageResult<String> {
        validate_key(key)?;
        let _permit = self.permit().await?;

        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    "Failed to create multipart upload"
                );
                StorageError::UploadFailed(e.to_string())
            })?;

        created
            .upload_id()
            .map(String::from)
            .ok_or_else(|| StorageError::UploadFailed("No upload ID returned from S3".to_string()))
    }

    async fn presigned_part_url(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        expires_in: Duration,
    ) -> StorageResult<String> {
        validate_key(key)?;
        let presigned = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number as i32)
            .presigned(Self::presigning(expires_in)?)
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPartInfo],
    ) -> StorageResult<StorageFile> {
        validate_key(key)?;
        let start = std::time::Instant::now();

        let completed = parts
            .iter()
            .map(|p| {
                CompletedPart::builder()
                    .part_number(p.part_number as i32)
                    .e_tag(&p.etag)
                    .build()
            })
            .collect::<Vec<_>>();

        {
            let _permit = self.permit().await?;
            self.client
                .complete_multipart_upload()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .multipart_upload(
                    CompletedMultipartUpload::builder()
                        .set_parts(Some(completed))
                        .build(),
                )
                .send()
                .await
                .map_err(|e| {
                    tracing::error!(
                        error = %e,
                        bucket = %self.bucket,
                        key = %key,
                        upload_id = %upload_id,
                        "Failed to complete multipart upload"
                    );
                    StorageError::UploadFailed(e.to_string())
                })?;
        }

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            parts = parts.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 multipart upload completed"
        );

        self.metadata(key).await.map(|m| m.into_storage_file(key))
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> StorageResult<()> {
        validate_key(key)?;
        let _permit = self.permit().await?;

        match self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(SdkError::ServiceError(service_err))
                if matches!(
                    service_err.err(),
                    AbortMultipartUploadError::NoSuchUpload(_)
                ) =>
            {
                tracing::debug!(key = %key, upload_id = %upload_id, "Multipart upload already gone");
                Ok(())
            }
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_permit_wait_is_bounded() {
        let permits = Arc::new(Semaphore::new(1));
        let held = acquire_permit(&permits, Duration::from_millis(20)).await.unwrap();

        let err = acquire_permit(&permits, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::BackendError(_)));

        drop(held);
        assert!(acquire_permit(&permits, Duration::from_millis(20)).await.is_ok());
    }

    #[test]
    fn test_range_header() {
        assert_eq!(S3Storage::range_header(0, 99).unwrap(), "bytes=0-99");
        assert!(S3Storage::range_header(10, 9).is_err());
    }
}
