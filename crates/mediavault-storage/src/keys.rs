//! Storage path conventions.
//!
//! These paths are persisted by the catalog, so the layouts below must stay stable:
//!
//! - `avatars/{profile_id}/{filename}`
//! - `thumbnails/{clip_id}.webp`
//! - `thumbnails/{clip_id}-animated.webp`
//! - `videos/{clip_id}/{filename}`
//! - `transcoded/{source_path}.mp4`

use crate::traits::{StorageError, StorageResult};
use mediavault_core::formats::TRANSCODE_TARGET_EXTENSION;
use mediavault_core::UploadKind;

pub const TRANSCODED_PREFIX: &str = "transcoded";

/// Reject keys that are empty, absolute, contain traversal segments or characters
/// that some backends interpret specially.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }
    if key.starts_with('/') || key.contains('\\') || key.contains('\0') {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid characters".to_string(),
        ));
    }
    if key.split('/').any(|segment| segment == ".." || segment == ".") {
        return Err(StorageError::InvalidKey(
            "Storage key contains a relative path segment".to_string(),
        ));
    }
    Ok(())
}

/// Final path component of a client-supplied filename.
pub fn sanitize_filename(filename: &str) -> StorageResult<String> {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name == "." || name == ".." || name.contains('\0') {
        return Err(StorageError::InvalidKey(format!(
            "Invalid filename: {:?}",
            filename
        )));
    }
    Ok(name.to_string())
}

fn sanitize_id(target_id: &str) -> StorageResult<&str> {
    let id = target_id.trim();
    if id.is_empty() || id.contains(['/', '\\', '\0']) || id == "." || id == ".." {
        return Err(StorageError::InvalidKey(format!(
            "Invalid target id: {:?}",
            target_id
        )));
    }
    Ok(id)
}

pub fn avatar_key(profile_id: &str, filename: &str) -> StorageResult<String> {
    Ok(format!(
        "avatars/{}/{}",
        sanitize_id(profile_id)?,
        sanitize_filename(filename)?
    ))
}

pub fn thumbnail_key(clip_id: &str) -> StorageResult<String> {
    Ok(format!("thumbnails/{}.webp", sanitize_id(clip_id)?))
}

pub fn animated_thumbnail_key(clip_id: &str) -> StorageResult<String> {
    Ok(format!("thumbnails/{}-animated.webp", sanitize_id(clip_id)?))
}

pub fn video_key(clip_id: &str, filename: &str) -> StorageResult<String> {
    Ok(format!(
        "videos/{}/{}",
        sanitize_id(clip_id)?,
        sanitize_filename(filename)?
    ))
}

/// Destination path of a completed upload.
pub fn destination_key(kind: UploadKind, target_id: &str, filename: &str) -> StorageResult<String> {
    match kind {
        UploadKind::Video => video_key(target_id, filename),
        UploadKind::Thumbnail => thumbnail_key(target_id),
        UploadKind::AnimatedThumbnail => animated_thumbnail_key(target_id),
        UploadKind::Avatar => avatar_key(target_id, filename),
    }
}

/// Cache path of the transcoded rendition of `source`. The same source always maps to
/// the same derived path, so a plain existence probe is the cache lookup.
pub fn transcoded_key(source: &str) -> String {
    format!(
        "{}/{}.{}",
        TRANSCODED_PREFIX, source, TRANSCODE_TARGET_EXTENSION
    )
}

/// Reverse of [`destination_key`]: the upload kind and target id a conventional path
/// belongs to, if any.
pub fn parse_destination(path: &str) -> Option<(UploadKind, String)> {
    let mut segments = path.split('/');
    let root = segments.next()?;
    let second = segments.next()?;
    let rest: Vec<&str> = segments.collect();

    match (root, rest.as_slice()) {
        ("videos", [file]) if !second.is_empty() && !file.is_empty() => {
            Some((UploadKind::Video, second.to_string()))
        }
        ("avatars", [file]) if !second.is_empty() && !file.is_empty() => {
            Some((UploadKind::Avatar, second.to_string()))
        }
        ("thumbnails", []) => {
            let stem = second.strip_suffix(".webp")?;
            match stem.strip_suffix("-animated") {
                Some(id) if !id.is_empty() => Some((UploadKind::AnimatedThumbnail, id.to_string())),
                _ if !stem.is_empty() => Some((UploadKind::Thumbnail, stem.to_string())),
                _ => None,
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_conventions() {
        assert_eq!(avatar_key("p1", "me.png").unwrap(), "avatars/p1/me.png");
        assert_eq!(thumbnail_key("c1").unwrap(), "thumbnails/c1.webp");
        assert_eq!(
            animated_thumbnail_key("c1").unwrap(),
            "thumbnails/c1-animated.webp"
        );
        assert_eq!(video_key("c1", "clip.mov").unwrap(), "videos/c1/clip.mov");
        assert_eq!(
            transcoded_key("videos/c1/clip.mov"),
            "transcoded/videos/c1/clip.mov.mp4"
        );
    }

    #[test]
    fn test_destination_key_by_kind() {
        assert_eq!(
            destination_key(UploadKind::Video, "c1", "a.mp4").unwrap(),
            "videos/c1/a.mp4"
        );
        assert_eq!(
            destination_key(UploadKind::Thumbnail, "c1", "ignored.png").unwrap(),
            "thumbnails/c1.webp"
        );
        assert_eq!(
            destination_key(UploadKind::Avatar, "p9", "face.jpg").unwrap(),
            "avatars/p9/face.jpg"
        );
    }

    #[test]
    fn test_filename_reduced_to_basename() {
        assert_eq!(
            video_key("c1", "../../etc/passwd").unwrap(),
            "videos/c1/passwd"
        );
        assert_eq!(
            video_key("c1", "C:\\Users\\me\\clip.mp4").unwrap(),
            "videos/c1/clip.mp4"
        );
        assert!(video_key("c1", "dir/").is_err());
    }

    #[test]
    fn test_target_id_rejects_separators() {
        assert!(video_key("c1/../x", "a.mp4").is_err());
        assert!(thumbnail_key("").is_err());
    }

    #[test]
    fn test_parse_destination() {
        assert_eq!(
            parse_destination("videos/c1/clip.mp4"),
            Some((UploadKind::Video, "c1".to_string()))
        );
        assert_eq!(
            parse_destination("thumbnails/c1-animated.webp"),
            Some((UploadKind::AnimatedThumbnail, "c1".to_string()))
        );
        assert_eq!(
            parse_destination("thumbnails/c1.webp"),
            Some((UploadKind::Thumbnail, "c1".to_string()))
        );
        assert_eq!(
            parse_destination("avatars/p1/me.png"),
            Some((UploadKind::Avatar, "p1".to_string()))
        );
        assert_eq!(parse_destination("videos/c1/nested/clip.mp4"), None);
        assert_eq!(parse_destination("misc/file.bin"), None);
        assert_eq!(parse_destination("thumbnails/c1.png"), None);
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("videos/c1/a.mp4").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("videos/../secret").is_err());
        assert!(validate_key("videos\\a.mp4").is_err());
        assert!(validate_key("a..b/file.mp4").is_ok());
    }
}
