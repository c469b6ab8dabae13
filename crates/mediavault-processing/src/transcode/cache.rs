use super::{TranscodeError, Transcoder};
use futures::StreamExt;
use mediavault_core::formats::{self, TRANSCODE_TARGET_CONTENT_TYPE};
use mediavault_storage::keys::{transcoded_key, validate_key};
use mediavault_storage::{Storage, UploadOptions};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Semaphore};

/// Result of a transcode request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeOutcome {
    /// Path of the playable rendition (the source itself when no conversion is needed).
    pub path: String,
    pub url: String,
    /// True when the rendition already existed and no encoder ran.
    pub cached: bool,
}

/// Transcode cache over a [`Storage`] provider.
///
/// The existence of `transcoded/{source}.mp4` is the cache entry; there is no separate
/// index. Encodes of the same source are serialized by a lock keyed on the derived path
/// and the number of concurrent encodes is bounded.
#[derive(Clone)]
pub struct TranscodeCache {
    storage: Arc<dyn Storage>,
    transcoder: Arc<dyn Transcoder>,
    scratch_dir: PathBuf,
    url_expiry: Duration,
    encode_permits: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashMap<String, Weak<Mutex<()>>>>>,
}

impl TranscodeCache {
    pub fn new(
        storage: Arc<dyn Storage>,
        transcoder: Arc<dyn Transcoder>,
        scratch_dir: impl Into<PathBuf>,
        url_expiry: Duration,
        max_concurrent: usize,
    ) -> Self {
        Self {
            storage,
            transcoder,
            scratch_dir: scratch_dir.into(),
            url_expiry,
            encode_permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Playable rendition of `source`, encoding it first if the cache misses.
    ///
    /// The encode runs on its own task, so it finishes (or times out) even if the
    /// caller stops waiting.
    pub async fn get_or_transcode(&self, source: &str) -> Result<TranscodeOutcome, TranscodeError> {
        validate_key(source)?;

        if !formats::needs_transcode(source) {
            if !self.storage.exists(source).await? {
                return Err(TranscodeError::SourceNotFound(source.to_string()));
            }
            let url = self.storage.signed_url(source, self.url_expiry).await?;
            return Ok(TranscodeOutcome {
                path: source.to_string(),
                url,
                cached: false,
            });
        }

        let derived = transcoded_key(source);
        if let Some(hit) = self.cached(&derived).await? {
            return Ok(hit);
        }

        let this = self.clone();
        let source = source.to_string();
        tokio::spawn(async move { this.transcode_locked(&source, &derived).await })
            .await
            .map_err(|e| TranscodeError::Task(e.to_string()))?
    }

    async fn cached(&self, derived: &str) -> Result<Option<TranscodeOutcome>, TranscodeError> {
        if !self.storage.exists(derived).await? {
            return Ok(None);
        }
        tracing::debug!(path = %derived, "Transcode cache hit");
        let url = self.storage.signed_url(derived, self.url_expiry).await?;
        Ok(Some(TranscodeOutcome {
            path: derived.to_string(),
            url,
            cached: true,
        }))
    }

    async fn lock_for(&self, derived: &str) -> Arc<Mutex<()>> {
        let mut in_flight = self.in_flight.lock().await;
        in_flight.retain(|_, lock| lock.strong_count() > 0);

        if let Some(lock) = in_flight.get(derived).and_then(Weak::upgrade) {
            return lock;
        }
        let lock = Arc::new(Mutex::new(()));
        in_flight.insert(derived.to_string(), Arc::downgrade(&lock));
        lock
    }

    async fn transcode_locked(
        &self,
        source: &str,
        derived: &str,
    ) -> Result<TranscodeOutcome, TranscodeError> {
        let lock = self.lock_for(derived).await;
        let _guard = lock.lock().await;

        // Another request may have finished the same encode while we waited.
        if let Some(hit) = self.cached(derived).await? {
            return Ok(hit);
        }

        if !self.storage.exists(source).await? {
            return Err(TranscodeError::SourceNotFound(source.to_string()));
        }

        let _permit = self
            .encode_permits
            .acquire()
            .await
            .map_err(|e| TranscodeError::Task(e.to_string()))?;

        let start = std::time::Instant::now();
        self.encode_and_store(source, derived).await?;

        tracing::info!(
            source = %source,
            path = %derived,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Transcode stored"
        );

        let url = self.storage.signed_url(derived, self.url_expiry).await?;
        Ok(TranscodeOutcome {
            path: derived.to_string(),
            url,
            cached: false,
        })
    }

    async fn encode_and_store(&self, source: &str, derived: &str) -> Result<(), TranscodeError> {
        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        // Removed on drop, on every exit path.
        let scratch = tempfile::Builder::new()
            .prefix("mediavault-transcode-")
            .tempdir_in(&self.scratch_dir)?;

        let extension = formats::extension(source).unwrap_or_else(|| "bin".to_string());
        let input = scratch.path().join(format!("source.{}", extension));
        let output = scratch.path().join("output.mp4");

        self.download_to(source, &input).await?;
        self.transcoder.transcode(&input, &output).await?;

        self.storage
            .upload_file(
                derived,
                &output,
                &UploadOptions::with_content_type(TRANSCODE_TARGET_CONTENT_TYPE),
            )
            .await?;

        Ok(())
    }

    /// Stream the source into a scratch file without holding it in memory.
    async fn download_to(&self, source: &str, target: &Path) -> Result<(), TranscodeError> {
        let metadata = self.storage.metadata(source).await?;
        let mut file = tokio::fs::File::create(target).await?;

        if metadata.size > 0 {
            let mut stream = self
                .storage
                .download_range_stream(source, 0, metadata.size - 1)
                .await?;
            while let Some(chunk) = stream.next().await {
                file.write_all(&chunk?).await?;
            }
        }

        file.flush().await?;
        Ok(())
    }
}
