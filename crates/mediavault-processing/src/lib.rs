//! Mediavault Processing Library
//!
//! On-demand transcoding of stored media into a universally playable rendition,
//! memoized in storage under a derived path.

pub mod transcode;

pub use transcode::{
    FfmpegTranscoder, TranscodeCache, TranscodeError, TranscodeOutcome, Transcoder,
};
