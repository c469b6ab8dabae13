use crate::keys::validate_key;
use crate::traits::{check_range, ByteStream, Storage, StorageError, StorageResult, UploadOptions};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use mediavault_core::formats::content_type_for_path;
use mediavault_core::{ObjectMetadata, StorageFile};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};
use uuid::Uuid;

const TEMP_SUFFIX: &str = ".mvtmp";

/// Local filesystem storage implementation
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for file storage (e.g., "/var/lib/mediavault")
    /// * `base_url` - Base URL of the media proxy route (e.g., "http://localhost:4000/api/v0/media")
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            base_url,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn key_to_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.base_path.join(key))
    }

    fn generate_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }

    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn stat(&self, key: &str, path: &Path) -> StorageResult<std::fs::Metadata> {
        match fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Ok(meta),
            Ok(_) => Err(StorageError::NotFound(key.to_string())),
            Err(e) if is_absent(&e) => Err(StorageError::NotFound(key.to_string())),
            Err(e) => Err(StorageError::BackendError(format!(
                "Failed to stat {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn object_metadata(key: &str, meta: &std::fs::Metadata) -> ObjectMetadata {
        let last_modified = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        ObjectMetadata {
            size: meta.len(),
            content_type: content_type_for_path(key).to_string(),
            last_modified,
        }
    }

    /// Open the file positioned at `start`, limited to `len` bytes.
    async fn open_range(
        &self,
        key: &str,
        start: u64,
        end: u64,
    ) -> StorageResult<tokio::io::Take<fs::File>> {
        let path = self.key_to_path(key)?;
        let meta = self.stat(key, &path).await?;
        check_range(key, start, end, meta.len())?;

        let mut file = fs::File::open(&path).await.map_err(|e| {
            StorageError::DownloadFailed(format!("Failed to open file {}: {}", path.display(), e))
        })?;
        file.seek(SeekFrom::Start(start)).await?;
        Ok(file.take(end - start + 1))
    }

    /// Write to a sibling temp file and rename over the target so readers never observe
    /// a partially written object.
    async fn write_atomic(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        self.ensure_parent_dir(path).await?;

        let tmp_path = temp_path_for(path);

        let result = async {
            let mut file = fs::File::create(&tmp_path).await.map_err(|e| {
                StorageError::UploadFailed(format!(
                    "Failed to create file {}: {}",
                    tmp_path.display(),
                    e
                ))
            })?;
            file.write_all(data).await.map_err(|e| {
                StorageError::UploadFailed(format!("Failed to write file {}: {}", path.display(), e))
            })?;
            file.sync_all().await.map_err(|e| {
                StorageError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
            })?;
            fs::rename(&tmp_path, path).await.map_err(|e| {
                StorageError::UploadFailed(format!(
                    "Failed to move file into place {}: {}",
                    path.display(),
                    e
                ))
            })
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&tmp_path).await;
        }
        result
    }

    /// Copy a local file into place through a sibling temp file.
    async fn copy_atomic(&self, source: &Path, path: &Path) -> StorageResult<u64> {
        self.ensure_parent_dir(path).await?;
        let tmp_path = temp_path_for(path);

        let result = async {
            let size = fs::copy(source, &tmp_path).await.map_err(|e| {
                StorageError::UploadFailed(format!(
                    "Failed to copy {} to {}: {}",
                    source.display(),
                    tmp_path.display(),
                    e
                ))
            })?;
            fs::File::open(&tmp_path).await?.sync_all().await.map_err(|e| {
                StorageError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
            })?;
            fs::rename(&tmp_path, path).await.map_err(|e| {
                StorageError::UploadFailed(format!(
                    "Failed to move file into place {}: {}",
                    path.display(),
                    e
                ))
            })?;
            Ok(size)
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&tmp_path).await;
        }
        result
    }

    fn path_to_key(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.base_path).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload(
        &self,
        key: &str,
        data: Bytes,
        options: &UploadOptions,
    ) -> StorageResult<StorageFile> {
        let path = self.key_to_path(key)?;
        let size = data.len() as u64;
        let start = std::time::Instant::now();

        self.write_atomic(&path, &data).await?;

        let content_type = options
            .content_type
            .clone()
            .unwrap_or_else(|| content_type_for_path(key).to_string());

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(StorageFile {
            path: key.to_string(),
            size,
            content_type,
            last_modified: Utc::now(),
        })
    }

    async fn upload_file(
        &self,
        key: &str,
        source: &Path,
        options: &UploadOptions,
    ) -> StorageResult<StorageFile> {
        let path = self.key_to_path(key)?;
        let start = std::time::Instant::now();

        let size = self.copy_atomic(source, &path).await?;

        let content_type = options
            .content_type
            .clone()
            .unwrap_or_else(|| content_type_for_path(key).to_string());

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage file upload successful"
        );

        Ok(StorageFile {
            path: key.to_string(),
            size,
            content_type,
            last_modified: Utc::now(),
        })
    }

    async fn download(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_to_path(key)?;
        let start = std::time::Instant::now();

        self.stat(key, &path).await?;

        let data = fs::read(&path).await.map_err(|e| {
            StorageError::DownloadFailed(format!("Failed to read file {}: {}", path.display(), e))
        })?;

        tracing::debug!(
            key = %key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage download successful"
        );

        Ok(Bytes::from(data))
    }

    async fn metadata(&self, key: &str) -> StorageResult<ObjectMetadata> {
        let path = self.key_to_path(key)?;
        let meta = self.stat(key, &path).await?;
        Ok(Self::object_metadata(key, &meta))
    }

    async fn download_range(&self, key: &str, start: u64, end: u64) -> StorageResult<Bytes> {
        let mut reader = self.open_range(key, start, end).await?;
        let mut buf = Vec::with_capacity((end - start + 1) as usize);
        reader.read_to_end(&mut buf).await.map_err(|e| {
            StorageError::DownloadFailed(format!("Failed to read range of {}: {}", key, e))
        })?;
        Ok(Bytes::from(buf))
    }

    async fn download_range_stream(
        &self,
        key: &str,
        start: u64,
        end: u64,
    ) -> StorageResult<ByteStream> {
        let reader = self.open_range(key, start, end).await?;

        let key = key.to_string();
        let stream = tokio_util::io::ReaderStream::new(reader).map(move |result| {
            result.map_err(|e| {
                tracing::error!(key = %key, error = %e, "Local storage stream download error");
                StorageError::DownloadFailed(format!("Failed to read chunk: {}", e))
            })
        });

        Ok(Box::pin(stream))
    }

    async fn signed_url(&self, key: &str, _expires_in: Duration) -> StorageResult<String> {
        validate_key(key)?;
        Ok(self.generate_url(key))
    }

    async fn upload_url(
        &self,
        key: &str,
        _content_type: &str,
        _expires_in: Duration,
    ) -> StorageResult<Option<String>> {
        validate_key(key)?;
        Ok(None)
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(key)?;
        match self.stat(key, &path).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(key = %key, "Local storage delete successful");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "Failed to delete file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<StorageFile>> {
        // Walk from the deepest directory named by the prefix, then filter by full prefix.
        let dir_part = match prefix.rfind('/') {
            Some(idx) => &prefix[..idx],
            None => "",
        };
        let root = if dir_part.is_empty() {
            self.base_path.clone()
        } else {
            self.key_to_path(dir_part)?
        };

        let mut files = Vec::new();
        let mut pending = vec![root];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::IoError(e)),
            };

            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let entry_path = entry.path();
                if file_type.is_dir() {
                    pending.push(entry_path);
                    continue;
                }
                if !file_type.is_file() {
                    continue;
                }
                let Some(key) = self.path_to_key(&entry_path) else {
                    continue;
                };
                if key.ends_with(TEMP_SUFFIX) || !key.starts_with(prefix) {
                    continue;
                }
                let meta = entry.metadata().await?;
                files.push(Self::object_metadata(&key, &meta).into_storage_file(key));
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    async fn copy(&self, source: &str, dest: &str) -> StorageResult<StorageFile> {
        let from_path = self.key_to_path(source)?;
        let to_path = self.key_to_path(dest)?;

        self.stat(source, &from_path).await?;
        self.ensure_parent_dir(&to_path).await?;

        fs::copy(&from_path, &to_path).await.map_err(|e| {
            StorageError::BackendError(format!(
                "Failed to copy {} to {}: {}",
                from_path.display(),
                to_path.display(),
                e
            ))
        })?;

        tracing::info!(
            from_key = %source,
            to_key = %dest,
            "Local storage copy successful"
        );

        self.metadata(dest).await.map(|m| m.into_storage_file(dest))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

/// Hidden sibling of `path` that listings skip.
fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}{}", file_name, Uuid::new_v4(), TEMP_SUFFIX))
}

/// A missing file, or a key whose parent segment is a regular file.
fn is_absent(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory
    )
}

#[cfg(all(test, feature = "storage-local"))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn storage(dir: &Path) -> LocalStorage {
        LocalStorage::new(dir, "http://localhost:4000/api/v0/media".to_string())
            .await
            .unwrap()
    }

    fn sample(len: usize) -> Bytes {
        Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>())
    }

    #[tokio::test]
    async fn test_upload_file_copies_from_disk() {
        let dir = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        let source = scratch.path().join("output.mp4");
        let data = sample(64 * 1024 + 7);
        tokio::fs::write(&source, &data).await.unwrap();

        let file = storage
            .upload_file(
                "transcoded/videos/c1/raw.mkv.mp4",
                &source,
                &UploadOptions::with_content_type("video/mp4"),
            )
            .await
            .unwrap();

        assert_eq!(file.size, data.len() as u64);
        assert_eq!(file.content_type, "video/mp4");
        assert_eq!(
            storage.download("transcoded/videos/c1/raw.mkv.mp4").await.unwrap(),
            data
        );
        assert!(source.exists());

        let listed = storage.list("transcoded/").await.unwrap();
        assert_eq!(listed.len(), 1);

        let missing = scratch.path().join("gone.mp4");
        assert!(storage
            .upload_file("transcoded/gone.mp4", &missing, &UploadOptions::default())
            .await
            .is_err());
        assert!(!storage.exists("transcoded/gone.mp4").await.unwrap());
    }

    #[tokio::test]
    async fn test_exists_reports_stat_failures() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        storage
            .upload("videos/c1/a.mp4", Bytes::from_static(b"a"), &UploadOptions::default())
            .await
            .unwrap();

        assert!(storage.exists("videos/c1/a.mp4").await.unwrap());
        assert!(!storage.exists("videos/c1/b.mp4").await.unwrap());
        assert!(!storage.exists("videos/c1").await.unwrap());
        assert!(!storage.exists("videos/c1/a.mp4/nested").await.unwrap());

        let too_long = format!("videos/c1/{}.mp4", "x".repeat(300));
        let err = storage.exists(&too_long).await.unwrap_err();
        assert!(matches!(err, StorageError::BackendError(_)));
    }

    #[tokio::test]
    async fn test_local_storage_upload_download() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        let data = Bytes::from_static(b"test data");

        let file = storage
            .upload("videos/c1/test.mp4", data.clone(), &UploadOptions::default())
            .await
            .unwrap();

        assert_eq!(file.path, "videos/c1/test.mp4");
        assert_eq!(file.size, 9);
        assert_eq!(file.content_type, "video/mp4");

        let downloaded = storage.download("videos/c1/test.mp4").await.unwrap();
        assert_eq!(data, downloaded);
    }

    #[tokio::test]
    async fn test_upload_overwrites_existing() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        storage
            .upload("a/b.bin", Bytes::from_static(b"first"), &UploadOptions::default())
            .await
            .unwrap();
        storage
            .upload("a/b.bin", Bytes::from_static(b"second!"), &UploadOptions::default())
            .await
            .unwrap();

        assert_eq!(storage.download("a/b.bin").await.unwrap(), Bytes::from_static(b"second!"));
        assert_eq!(storage.list("a/").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_download_range_matches_slice() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        let data = sample(10_000);
        storage
            .upload("videos/c1/r.mp4", data.clone(), &UploadOptions::default())
            .await
            .unwrap();

        for (start, end) in [(0u64, 0u64), (0, 9_999), (100, 199), (9_999, 9_999), (4_096, 8_191)] {
            let range = storage.download_range("videos/c1/r.mp4", start, end).await.unwrap();
            assert_eq!(range.len() as u64, end - start + 1);
            assert_eq!(&range[..], &data[start as usize..=end as usize]);
        }
    }

    #[tokio::test]
    async fn test_download_range_rejects_out_of_bounds() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        storage
            .upload("f.bin", sample(10), &UploadOptions::default())
            .await
            .unwrap();

        let result = storage.download_range("f.bin", 5, 10).await;
        assert!(matches!(result, Err(StorageError::InvalidRange(_))));
        let result = storage.download_range("f.bin", 6, 5).await;
        assert!(matches!(result, Err(StorageError::InvalidRange(_))));
    }

    #[tokio::test]
    async fn test_download_range_stream() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        let data = sample(200_000);
        storage
            .upload("videos/c1/big.mp4", data.clone(), &UploadOptions::default())
            .await
            .unwrap();

        let mut stream = storage
            .download_range_stream("videos/c1/big.mp4", 1_000, 150_999)
            .await
            .unwrap();
        let mut downloaded = Vec::new();
        while let Some(chunk) = stream.next().await {
            downloaded.extend_from_slice(&chunk.unwrap());
        }

        assert_eq!(downloaded.len(), 150_000);
        assert_eq!(&downloaded[..], &data[1_000..151_000]);
    }

    #[tokio::test]
    async fn test_metadata_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        let result = storage.metadata("videos/none.mp4").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
        let result = storage.download("videos/none.mp4").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_metadata_uses_registry_content_type() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        storage
            .upload("thumbnails/c1.webp", sample(42), &UploadOptions::default())
            .await
            .unwrap();

        let meta = storage.metadata("thumbnails/c1.webp").await.unwrap();
        assert_eq!(meta.size, 42);
        assert_eq!(meta.content_type, "image/webp");
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        let result = storage.download("../../../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage.delete("../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage.exists("/etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_local_storage_delete_nonexistent() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        assert!(storage.delete("nonexistent/file.txt").await.is_ok());
    }

    #[tokio::test]
    async fn test_local_storage_exists_and_delete() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        storage
            .upload("avatars/p1/me.png", sample(3), &UploadOptions::default())
            .await
            .unwrap();

        assert!(storage.exists("avatars/p1/me.png").await.unwrap());
        assert!(!storage.exists("avatars/p1").await.unwrap());
        storage.delete("avatars/p1/me.png").await.unwrap();
        assert!(!storage.exists("avatars/p1/me.png").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_prefix_filtered() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        for key in ["videos/c2/b.mp4", "videos/c1/a.mp4", "videos/c10/z.mp4", "thumbnails/c1.webp"] {
            storage
                .upload(key, sample(8), &UploadOptions::default())
                .await
                .unwrap();
        }

        let paths: Vec<String> = storage
            .list("videos/")
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();
        assert_eq!(paths, vec!["videos/c1/a.mp4", "videos/c10/z.mp4", "videos/c2/b.mp4"]);

        let paths: Vec<String> = storage
            .list("videos/c1")
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();
        assert_eq!(paths, vec!["videos/c1/a.mp4", "videos/c10/z.mp4"]);

        assert!(storage.list("missing/").await.unwrap().is_empty());
        assert_eq!(storage.list("").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_local_storage_copy() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        let data = Bytes::from_static(b"original content");

        storage
            .upload("videos/c1/original.mp4", data.clone(), &UploadOptions::default())
            .await
            .unwrap();

        let copied = storage
            .copy("videos/c1/original.mp4", "videos/c2/copy.mp4")
            .await
            .unwrap();
        assert_eq!(copied.path, "videos/c2/copy.mp4");
        assert_eq!(copied.size, data.len() as u64);

        assert_eq!(storage.download("videos/c2/copy.mp4").await.unwrap(), data);
        assert!(storage.exists("videos/c1/original.mp4").await.unwrap());

        let missing = storage.copy("videos/none.mp4", "videos/x.mp4").await;
        assert!(matches!(missing, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_signed_urls() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        let url = storage
            .signed_url("videos/c1/a.mp4", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(url, "http://localhost:4000/api/v0/media/videos/c1/a.mp4");

        let upload = storage
            .upload_url("videos/c1/a.mp4", "video/mp4", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(upload.is_none());
    }

    #[tokio::test]
    async fn test_multipart_unsupported() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        let result = storage.create_multipart("videos/c1/a.mp4", "video/mp4").await;
        assert!(matches!(result, Err(StorageError::Unsupported(_))));
    }
}
