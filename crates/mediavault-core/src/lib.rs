//! Mediavault Core Library
//!
//! This crate provides the format registry, error taxonomy, configuration and data
//! model shared by the storage, processing and API crates.

pub mod config;
pub mod error;
pub mod formats;
pub mod hooks;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use formats::{MediaFormat, MediaKind};
pub use hooks::{CatalogEntity, CatalogUpdate, CatalogWriter, LoggingCatalogWriter};
pub use models::{ObjectMetadata, StorageFile, UploadKind};
pub use storage_types::StorageBackend;
