use crate::hooks::CatalogEntity;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Logical target of an upload. Decides the destination storage path and which
/// catalog field is updated once the blob is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadKind {
    Video,
    Thumbnail,
    AnimatedThumbnail,
    Avatar,
}

impl UploadKind {
    /// Catalog entity owning the path field.
    pub fn entity(&self) -> CatalogEntity {
        match self {
            UploadKind::Video | UploadKind::Thumbnail | UploadKind::AnimatedThumbnail => {
                CatalogEntity::Clip
            }
            UploadKind::Avatar => CatalogEntity::Profile,
        }
    }

    /// Name of the path field on the owning entity.
    pub fn catalog_field(&self) -> &'static str {
        match self {
            UploadKind::Video => "video_path",
            UploadKind::Thumbnail => "thumbnail_path",
            UploadKind::AnimatedThumbnail => "animated_thumbnail_path",
            UploadKind::Avatar => "avatar_path",
        }
    }
}

impl FromStr for UploadKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "video" => Ok(UploadKind::Video),
            "thumbnail" => Ok(UploadKind::Thumbnail),
            "animated_thumbnail" | "animated-thumbnail" => Ok(UploadKind::AnimatedThumbnail),
            "avatar" => Ok(UploadKind::Avatar),
            other => Err(format!(
                "Invalid upload type: {}. Must be one of: video, thumbnail, animated_thumbnail, avatar",
                other
            )),
        }
    }
}

impl Display for UploadKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            UploadKind::Video => write!(f, "video"),
            UploadKind::Thumbnail => write!(f, "thumbnail"),
            UploadKind::AnimatedThumbnail => write!(f, "animated_thumbnail"),
            UploadKind::Avatar => write!(f, "avatar"),
        }
    }
}
