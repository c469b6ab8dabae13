//! Hooks for the catalog collaborator
//!
//! The catalog application owns the association between a storage path and a business
//! entity. The storage engine only ever asks it to set one path field after a blob has
//! been committed; the catalog implements [`CatalogWriter`] to receive those writes.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Catalog entity that owns a path field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogEntity {
    Clip,
    Profile,
}

impl Display for CatalogEntity {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            CatalogEntity::Clip => write!(f, "clip"),
            CatalogEntity::Profile => write!(f, "profile"),
        }
    }
}

/// "Set path field `field` on entity `entity`/`entity_id` to `path`".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogUpdate {
    pub entity: CatalogEntity,
    pub entity_id: String,
    pub field: &'static str,
    pub path: String,
}

/// Write side of the catalog, invoked after every successful upload completion.
///
/// Callers treat this as fire-and-forget relative to their own success: an error is
/// logged and never rolls back the blob write.
#[async_trait]
pub trait CatalogWriter: Send + Sync {
    async fn set_path(&self, update: CatalogUpdate) -> Result<(), String>;
}

/// Catalog writer that only records the update in the log stream.
pub struct LoggingCatalogWriter;

#[async_trait]
impl CatalogWriter for LoggingCatalogWriter {
    async fn set_path(&self, update: CatalogUpdate) -> Result<(), String> {
        tracing::info!(
            entity = %update.entity,
            entity_id = %update.entity_id,
            field = update.field,
            path = %update.path,
            "Catalog path update"
        );
        Ok(())
    }
}
