use super::{TranscodeError, Transcoder};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Keep the tail of ffmpeg's stderr; the useful diagnostics are at the end.
const STDERR_TAIL_BYTES: usize = 2048;

pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            timeout,
        }
    }

    /// H.264 main profile + AAC in an MP4 with the index atom up front, which every
    /// browser and TV runtime can start playing before the download finishes.
    fn args(input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-nostdin".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            "fast".to_string(),
            "-profile:v".to_string(),
            "main".to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            "128k".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            "-f".to_string(),
            "mp4".to_string(),
            output.to_string_lossy().to_string(),
        ]
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim_end();
    if trimmed.len() <= STDERR_TAIL_BYTES {
        return trimmed.to_string();
    }
    let mut cut = trimmed.len() - STDERR_TAIL_BYTES;
    while !trimmed.is_char_boundary(cut) {
        cut += 1;
    }
    trimmed[cut..].to_string()
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    #[tracing::instrument(skip(self, input, output), fields(input = %input.display()))]
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), TranscodeError> {
        let start = std::time::Instant::now();

        let child = Command::new(&self.ffmpeg_path)
            .args(Self::args(input, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(TranscodeError::Launch)?;

        // Dropping the child on timeout kills the encoder.
        let result = tokio::time::timeout(self.timeout, child.wait_with_output()).await;
        let output = match result {
            Ok(output) => output?,
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.timeout.as_secs(),
                    "FFmpeg transcode timed out"
                );
                return Err(TranscodeError::Timeout(self.timeout));
            }
        };

        if !output.status.success() {
            return Err(TranscodeError::EncoderFailed {
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            });
        }

        tracing::info!(
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "FFmpeg transcode finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_target_faststart_mp4() {
        let args = FfmpegTranscoder::args(Path::new("/tmp/in.mkv"), Path::new("/tmp/out.mp4"));
        assert_eq!(args.first().map(String::as_str), Some("-y"));
        assert!(args.windows(2).any(|w| w[0] == "-i" && w[1] == "/tmp/in.mkv"));
        assert!(args.windows(2).any(|w| w[0] == "-c:v" && w[1] == "libx264"));
        assert!(args.windows(2).any(|w| w[0] == "-movflags" && w[1] == "+faststart"));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out.mp4"));
    }

    #[test]
    fn test_stderr_tail_keeps_end() {
        let long = "x".repeat(5000) + "Invalid data found";
        let tail = stderr_tail(long.as_bytes());
        assert_eq!(tail.len(), STDERR_TAIL_BYTES);
        assert!(tail.ends_with("Invalid data found"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_launch_error() {
        let transcoder =
            FfmpegTranscoder::new("/nonexistent/ffmpeg-binary", Duration::from_secs(5));
        let result = transcoder
            .transcode(Path::new("/tmp/in.mkv"), Path::new("/tmp/out.mp4"))
            .await;
        assert!(matches!(result, Err(TranscodeError::Launch(_))));
    }
}
