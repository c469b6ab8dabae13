//! Stand-ins for the catalog and the encoder.

use async_trait::async_trait;
use mediavault_core::{CatalogUpdate, CatalogWriter};
use mediavault_processing::{TranscodeError, Transcoder};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Bytes written by [`CountingTranscoder`] for every encode.
pub const TRANSCODED_BYTES: &[u8] = b"fake mp4 rendition";

#[derive(Default)]
pub struct RecordingCatalogWriter {
    updates: Mutex<Vec<CatalogUpdate>>,
}

impl RecordingCatalogWriter {
    pub fn updates(&self) -> Vec<CatalogUpdate> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl CatalogWriter for RecordingCatalogWriter {
    async fn set_path(&self, update: CatalogUpdate) -> Result<(), String> {
        self.updates.lock().unwrap().push(update);
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingTranscoder {
    calls: AtomicUsize,
}

impl CountingTranscoder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcoder for CountingTranscoder {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), TranscodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(input.exists(), "source must be downloaded before encoding");
        tokio::time::sleep(Duration::from_millis(50)).await;
        tokio::fs::write(output, TRANSCODED_BYTES).await?;
        Ok(())
    }
}
