//! Transcoding
//!
//! [`Transcoder`] is the seam around the external encoder; [`TranscodeCache`] owns the
//! download, encode, upload sequence and the cache lookup in front of it.

mod cache;
mod ffmpeg;

pub use cache::{TranscodeCache, TranscodeOutcome};
pub use ffmpeg::FfmpegTranscoder;

use async_trait::async_trait;
use mediavault_storage::StorageError;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Encoder timed out after {0:?}")]
    Timeout(Duration),

    #[error("Encoder exited with {status}: {stderr}")]
    EncoderFailed { status: String, stderr: String },

    #[error("Failed to launch encoder: {0}")]
    Launch(#[source] std::io::Error),

    #[error("Scratch space error: {0}")]
    Scratch(#[from] std::io::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Transcode task failed: {0}")]
    Task(String),
}

/// External encoder producing an MP4 (H.264/AAC) file from any input container.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), TranscodeError>;
}
