//! Mediavault Storage Library
//!
//! This crate provides the storage provider abstraction and its implementations for
//! the local filesystem and S3-compatible object storage.
//!
//! # Storage paths
//!
//! Paths are opaque, forward-slash-delimited keys persisted by the catalog. They never
//! contain an absolute URL, a leading `/` or a `..` segment. Path layouts for uploads
//! and transcoded renditions live in the `keys` module so every caller derives them
//! the same way.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::{create_storage, get_storage, reset_storage};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use mediavault_core::StorageBackend;
#[cfg(feature = "storage-s3")]
pub use s3::{S3Settings, S3Storage};
pub use traits::{
    ByteStream, CompletedPartInfo, Storage, StorageError, StorageResult, UploadOptions,
};
