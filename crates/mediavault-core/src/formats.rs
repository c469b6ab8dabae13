//! Format registry
//!
//! Static knowledge of content types, which containers every playback client can decode
//! natively and which ones must be transcoded first. Lookups are keyed by the lowercase
//! file extension of a storage path; nothing here touches the bytes of a file.

use serde::Serialize;

/// Broad media category of a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Image,
    Document,
}

/// One entry of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaFormat {
    pub extension: &'static str,
    pub content_type: &'static str,
    pub kind: MediaKind,
    /// Container/codec combination that some target clients cannot play.
    pub needs_transcode: bool,
}

/// Content type served for unknown extensions.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Container produced by the transcoder.
pub const TRANSCODE_TARGET_EXTENSION: &str = "mp4";
pub const TRANSCODE_TARGET_CONTENT_TYPE: &str = "video/mp4";

const fn format(
    extension: &'static str,
    content_type: &'static str,
    kind: MediaKind,
    needs_transcode: bool,
) -> MediaFormat {
    MediaFormat {
        extension,
        content_type,
        kind,
        needs_transcode,
    }
}

static FORMATS: &[MediaFormat] = &[
    // Video
    format("mp4", "video/mp4", MediaKind::Video, false),
    format("m4v", "video/mp4", MediaKind::Video, false),
    format("webm", "video/webm", MediaKind::Video, false),
    format("mov", "video/quicktime", MediaKind::Video, true),
    format("mkv", "video/x-matroska", MediaKind::Video, true),
    format("avi", "video/x-msvideo", MediaKind::Video, true),
    format("wmv", "video/x-ms-wmv", MediaKind::Video, true),
    format("flv", "video/x-flv", MediaKind::Video, true),
    format("mpg", "video/mpeg", MediaKind::Video, true),
    format("mpeg", "video/mpeg", MediaKind::Video, true),
    format("3gp", "video/3gpp", MediaKind::Video, true),
    format("ts", "video/mp2t", MediaKind::Video, true),
    format("m2ts", "video/mp2t", MediaKind::Video, true),
    format("ogv", "video/ogg", MediaKind::Video, true),
    // Audio
    format("mp3", "audio/mpeg", MediaKind::Audio, false),
    format("m4a", "audio/mp4", MediaKind::Audio, false),
    format("aac", "audio/aac", MediaKind::Audio, false),
    format("wav", "audio/wav", MediaKind::Audio, false),
    format("ogg", "audio/ogg", MediaKind::Audio, false),
    format("oga", "audio/ogg", MediaKind::Audio, false),
    format("opus", "audio/opus", MediaKind::Audio, false),
    format("flac", "audio/flac", MediaKind::Audio, false),
    format("wma", "audio/x-ms-wma", MediaKind::Audio, true),
    // Images
    format("jpg", "image/jpeg", MediaKind::Image, false),
    format("jpeg", "image/jpeg", MediaKind::Image, false),
    format("png", "image/png", MediaKind::Image, false),
    format("gif", "image/gif", MediaKind::Image, false),
    format("webp", "image/webp", MediaKind::Image, false),
    format("avif", "image/avif", MediaKind::Image, false),
    format("bmp", "image/bmp", MediaKind::Image, false),
    format("svg", "image/svg+xml", MediaKind::Image, false),
    format("heic", "image/heic", MediaKind::Image, false),
    // Documents and sidecars
    format("json", "application/json", MediaKind::Document, false),
    format("txt", "text/plain", MediaKind::Document, false),
    format("pdf", "application/pdf", MediaKind::Document, false),
    format("vtt", "text/vtt", MediaKind::Document, false),
    format("srt", "application/x-subrip", MediaKind::Document, false),
    format("m3u8", "application/vnd.apple.mpegurl", MediaKind::Document, false),
];

/// Lowercase extension of the final path component, without the dot.
pub fn extension(path: &str) -> Option<String> {
    let file_name = path.rsplit('/').next()?;
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Look up a format by extension (case-insensitive, with or without a leading dot).
pub fn lookup(ext: &str) -> Option<&'static MediaFormat> {
    let ext = ext.trim_start_matches('.');
    FORMATS
        .iter()
        .find(|f| f.extension.eq_ignore_ascii_case(ext))
}

pub fn format_for_path(path: &str) -> Option<&'static MediaFormat> {
    extension(path).and_then(|ext| lookup(&ext))
}

/// Content type for a storage path; unknown extensions get a generic binary type.
pub fn content_type_for_path(path: &str) -> &'static str {
    format_for_path(path)
        .map(|f| f.content_type)
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}

/// Audio and video are served with range support and long-lived caching.
pub fn is_streaming_type(path: &str) -> bool {
    matches!(
        format_for_path(path).map(|f| f.kind),
        Some(MediaKind::Video) | Some(MediaKind::Audio)
    )
}

pub fn needs_transcode(path: &str) -> bool {
    format_for_path(path)
        .map(|f| f.needs_transcode)
        .unwrap_or(false)
}
