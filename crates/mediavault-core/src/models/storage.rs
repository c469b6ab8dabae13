use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata describing a stored blob.
///
/// Derived from the backend on every call; never persisted apart from the blob itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageFile {
    pub path: String,
    pub size: u64,
    pub content_type: String,
    pub last_modified: DateTime<Utc>,
}

/// Result of a metadata probe (no body download).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    pub size: u64,
    pub content_type: String,
    pub last_modified: DateTime<Utc>,
}

impl ObjectMetadata {
    pub fn into_storage_file(self, path: impl Into<String>) -> StorageFile {
        StorageFile {
            path: path.into(),
            size: self.size,
            content_type: self.content_type,
            last_modified: self.last_modified,
        }
    }
}
