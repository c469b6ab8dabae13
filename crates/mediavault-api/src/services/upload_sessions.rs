//! In-memory chunked upload sessions.
//!
//! Sessions live only in this process: a restart loses them and clients start over.
//! The map lock is held only to look up, insert or remove a session; chunk writes take
//! the per-session lock, so uploads to different sessions never wait on each other.

use crate::error::storage_app_error;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use mediavault_core::{AppError, CatalogEntity, CatalogUpdate, CatalogWriter, UploadKind};
use mediavault_storage::keys::destination_key;
use mediavault_storage::{Storage, UploadOptions};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::time::interval;
use uuid::Uuid;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct UploadSession {
    pub id: Uuid,
    pub kind: UploadKind,
    pub target_id: String,
    pub filename: String,
    pub total_chunks: u32,
    pub created_at: DateTime<Utc>,
    chunks: BTreeMap<u32, Bytes>,
    buffered_bytes: u64,
    /// Set once the assembled file has been committed; later calls see NotFound.
    finished: bool,
}

impl UploadSession {
    pub fn received(&self) -> u32 {
        self.chunks.len() as u32
    }

    pub fn missing(&self) -> Vec<u32> {
        (0..self.total_chunks)
            .filter(|i| !self.chunks.contains_key(i))
            .collect()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn mark_finished(&mut self) {
        self.finished = true;
        self.chunks.clear();
        self.buffered_bytes = 0;
    }

    /// Concatenate all chunks in index order. Fails if any index is absent.
    pub fn assemble(&self) -> Result<Bytes, AppError> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "Upload incomplete: received {} of {} chunks, missing {:?}",
                self.received(),
                self.total_chunks,
                missing
            )));
        }

        let mut data = BytesMut::with_capacity(self.buffered_bytes as usize);
        for chunk in self.chunks.values() {
            data.extend_from_slice(chunk);
        }
        Ok(data.freeze())
    }
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub kind: UploadKind,
    pub target_id: String,
    pub filename: String,
    pub total_chunks: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkProgress {
    pub received: u32,
    pub total: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedUpload {
    pub path: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub received: u32,
    pub total: u32,
    pub missing: Vec<u32>,
    pub expires_at: DateTime<Utc>,
}

struct Entry {
    created: Instant,
    session: Arc<Mutex<UploadSession>>,
}

pub struct UploadSessionStore {
    sessions: RwLock<HashMap<Uuid, Entry>>,
    ttl: Duration,
    max_chunk_bytes: u64,
    max_total_bytes: u64,
}

impl UploadSessionStore {
    pub fn new(ttl: Duration, max_chunk_bytes: u64, max_total_bytes: u64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
            max_chunk_bytes,
            max_total_bytes,
        }
    }

    pub async fn init(&self, new: NewSession) -> Result<Uuid, AppError> {
        if new.total_chunks == 0 {
            return Err(AppError::InvalidInput(
                "totalChunks must be at least 1".to_string(),
            ));
        }

        let id = Uuid::new_v4();
        let session = UploadSession {
            id,
            kind: new.kind,
            target_id: new.target_id,
            filename: new.filename,
            total_chunks: new.total_chunks,
            created_at: Utc::now(),
            chunks: BTreeMap::new(),
            buffered_bytes: 0,
            finished: false,
        };

        tracing::info!(
            session_id = %id,
            upload_type = %session.kind,
            target_id = %session.target_id,
            total_chunks = session.total_chunks,
            "Chunked upload session created"
        );

        self.sessions.write().await.insert(
            id,
            Entry {
                created: Instant::now(),
                session: Arc::new(Mutex::new(session)),
            },
        );
        Ok(id)
    }

    /// Session handle; the caller locks it for the duration of its mutation.
    pub async fn get(&self, id: Uuid) -> Result<Arc<Mutex<UploadSession>>, AppError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .map(|entry| entry.session.clone())
            .ok_or_else(|| not_found(id))
    }

    /// Store chunk `index`. A retried index replaces the earlier bytes.
    pub async fn put_chunk(
        &self,
        id: Uuid,
        index: u32,
        data: Bytes,
    ) -> Result<ChunkProgress, AppError> {
        if data.len() as u64 > self.max_chunk_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "Chunk of {} bytes exceeds the {} byte limit",
                data.len(),
                self.max_chunk_bytes
            )));
        }

        let session = self.get(id).await?;
        let mut session = session.lock().await;
        if session.finished {
            return Err(not_found(id));
        }

        if index >= session.total_chunks {
            return Err(AppError::InvalidInput(format!(
                "chunkIndex {} out of range 0..{}",
                index, session.total_chunks
            )));
        }

        let replaced = session.chunks.get(&index).map_or(0, |c| c.len() as u64);
        let buffered = session.buffered_bytes - replaced + data.len() as u64;
        if buffered > self.max_total_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "Upload exceeds the {} byte limit for chunked uploads; use multipart upload",
                self.max_total_bytes
            )));
        }

        session.buffered_bytes = buffered;
        session.chunks.insert(index, data);

        tracing::debug!(
            session_id = %id,
            chunk_index = index,
            received = session.received(),
            total = session.total_chunks,
            "Chunk received"
        );

        Ok(ChunkProgress {
            received: session.received(),
            total: session.total_chunks,
        })
    }

    pub async fn status(&self, id: Uuid) -> Result<SessionStatus, AppError> {
        let session = self.get(id).await?;
        let session = session.lock().await;
        if session.finished {
            return Err(not_found(id));
        }
        Ok(SessionStatus {
            received: session.received(),
            total: session.total_chunks,
            missing: session.missing(),
            expires_at: self.expires_at(&session),
        })
    }

    /// Assemble the session, commit it to storage and update the owning catalog field.
    ///
    /// The session lock is held for the whole commit, so a concurrent chunk or a second
    /// completion waits and then finds the session gone.
    pub async fn complete(
        &self,
        id: Uuid,
        storage: &dyn Storage,
        catalog: &dyn CatalogWriter,
    ) -> Result<CompletedUpload, AppError> {
        let handle = self.get(id).await?;
        let mut session = handle.lock().await;
        if session.finished {
            return Err(not_found(id));
        }

        let data = session.assemble()?;
        let path = destination_key(session.kind, &session.target_id, &session.filename)
            .map_err(storage_app_error)?;

        let start = std::time::Instant::now();
        let file = storage
            .upload(&path, data, &UploadOptions::default())
            .await
            .map_err(storage_app_error)?;

        tracing::info!(
            session_id = %id,
            key = %file.path,
            size_bytes = file.size,
            chunks = session.total_chunks,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Chunked upload completed"
        );

        notify_catalog(catalog, session.kind, &session.target_id, &file.path).await;

        session.mark_finished();
        drop(session);
        self.sessions.write().await.remove(&id);

        Ok(CompletedUpload {
            path: file.path,
            size: file.size,
        })
    }

    /// Drop a session. Unknown ids are ignored; returns whether it existed.
    pub async fn cancel(&self, id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&id).is_some();
        if removed {
            tracing::info!(session_id = %id, "Chunked upload session cancelled");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Wall-clock deadline after which the sweeper may drop the session.
    pub fn expires_at(&self, session: &UploadSession) -> DateTime<Utc> {
        chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| session.created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Remove every session older than the TTL, complete or not.
    pub async fn sweep(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| entry.created.elapsed() < self.ttl);
        before - sessions.len()
    }

    /// Start the background sweep. Returns a JoinHandle for graceful shutdown.
    ///
    /// A zero period is raised to one second; `interval` rejects zero.
    pub fn start_sweeper(self: Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let every = every.max(MIN_SWEEP_INTERVAL);
        tokio::spawn(async move {
            let mut sweep_interval = interval(every);

            loop {
                sweep_interval.tick().await;

                let removed = self.sweep().await;
                if removed > 0 {
                    tracing::info!(removed, "Swept stale upload sessions");
                }
            }
        })
    }
}

/// Set the catalog path field owned by `kind`. Failures are logged, never returned:
/// the blob is already committed and stays in place.
pub async fn notify_catalog(
    catalog: &dyn CatalogWriter,
    kind: UploadKind,
    target_id: &str,
    path: &str,
) {
    notify_catalog_field(catalog, kind.entity(), target_id, kind.catalog_field(), path).await;
}

/// Like [`notify_catalog`], for a field other than the entity's upload path.
pub async fn notify_catalog_field(
    catalog: &dyn CatalogWriter,
    entity: CatalogEntity,
    target_id: &str,
    field: &'static str,
    path: &str,
) {
    let update = CatalogUpdate {
        entity,
        entity_id: target_id.to_string(),
        field,
        path: path.to_string(),
    };

    if let Err(e) = catalog.set_path(update).await {
        tracing::error!(
            error = %e,
            entity = %entity,
            target_id = %target_id,
            field,
            key = %path,
            "Catalog update failed; stored object left without a catalog reference"
        );
    }
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Upload session not found: {}", id))
}
