//! Chunked upload handlers.
//!
//! One route carries both message shapes: a JSON body is a control message
//! (init/complete/cancel), a multipart/form-data body is one data chunk.

use crate::error::{HttpAppError, ValidatedJson};
use crate::services::upload_sessions::NewSession;
use crate::state::AppState;
use axum::{
    extract::{FromRequest, Multipart, Path, Request, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use mediavault_core::{AppError, UploadKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Control message. Every field is optional at the wire level so a missing one is
/// reported as a validation error naming it, not as a generic body rejection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkedControlRequest {
    pub action: Option<String>,
    #[serde(rename = "type")]
    pub upload_type: Option<String>,
    pub target_id: Option<String>,
    pub filename: Option<String>,
    pub total_chunks: Option<u32>,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitResponse {
    pub success: bool,
    pub session_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ChunkResponse {
    pub success: bool,
    pub received: u32,
    pub total: u32,
}

#[derive(Debug, Serialize)]
pub struct CompleteResponse {
    pub success: bool,
    pub path: String,
    pub size: u64,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub success: bool,
    pub session_id: Uuid,
    pub received: u32,
    pub total: u32,
    pub missing: Vec<u32>,
    pub expires_at: DateTime<Utc>,
}

/// POST `/api/v0/uploads/chunked`
pub async fn chunked_upload(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Response, HttpAppError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().starts_with("multipart/form-data"))
        .unwrap_or(false);

    if is_multipart {
        let multipart = Multipart::from_request(request, &state).await?;
        return put_chunk(&state, multipart).await;
    }

    let ValidatedJson(control) =
        ValidatedJson::<ChunkedControlRequest>::from_request(request, &state).await?;
    let action = required(control.action.as_deref(), "action")?.to_string();

    match action.as_str() {
        "init" => init(&state, control).await,
        "complete" => {
            let session_id = parse_session_id(control.session_id.as_deref())?;
            let done = state
                .sessions
                .complete(session_id, state.storage.as_ref(), state.catalog.as_ref())
                .await?;
            Ok(Json(CompleteResponse {
                success: true,
                path: done.path,
                size: done.size,
            })
            .into_response())
        }
        "cancel" => {
            let session_id = parse_session_id(control.session_id.as_deref())?;
            state.sessions.cancel(session_id).await;
            Ok(Json(CancelResponse { success: true }).into_response())
        }
        other => Err(AppError::InvalidInput(format!(
            "Unknown action: {}. Must be one of: init, complete, cancel",
            other
        ))
        .into()),
    }
}

async fn init(state: &AppState, control: ChunkedControlRequest) -> Result<Response, HttpAppError> {
    let kind: UploadKind = required(control.upload_type.as_deref(), "type")?
        .parse()
        .map_err(AppError::InvalidInput)?;
    let target_id = required(control.target_id.as_deref(), "targetId")?.to_string();
    let filename = required(control.filename.as_deref(), "filename")?.to_string();
    let total_chunks = control
        .total_chunks
        .ok_or_else(|| AppError::InvalidInput("Missing required field: totalChunks".to_string()))?;

    let session_id = state
        .sessions
        .init(NewSession {
            kind,
            target_id,
            filename,
            total_chunks,
        })
        .await?;

    Ok(Json(InitResponse {
        success: true,
        session_id,
    })
    .into_response())
}

async fn put_chunk(state: &AppState, mut multipart: Multipart) -> Result<Response, HttpAppError> {
    let mut session_id: Option<String> = None;
    let mut chunk_index: Option<String> = None;
    let mut chunk: Option<Bytes> = None;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().map(|s| s.to_string()).unwrap_or_default();
        match field_name.as_str() {
            "sessionId" => session_id = Some(field.text().await?),
            "chunkIndex" => chunk_index = Some(field.text().await?),
            "chunk" => {
                if chunk.is_some() {
                    return Err(AppError::InvalidInput(
                        "Multiple chunk fields are not allowed".to_string(),
                    )
                    .into());
                }
                chunk = Some(field.bytes().await?);
            }
            _ => {}
        }
    }

    let session_id = parse_session_id(session_id.as_deref())?;
    let chunk_index: u32 = required(chunk_index.as_deref(), "chunkIndex")?
        .trim()
        .parse()
        .map_err(|_| AppError::InvalidInput("chunkIndex must be a non-negative integer".to_string()))?;
    let chunk =
        chunk.ok_or_else(|| AppError::InvalidInput("Missing required field: chunk".to_string()))?;

    let progress = state
        .sessions
        .put_chunk(session_id, chunk_index, chunk)
        .await?;

    Ok(Json(ChunkResponse {
        success: true,
        received: progress.received,
        total: progress.total,
    })
    .into_response())
}

/// GET `/api/v0/uploads/chunked/{session_id}`
pub async fn chunked_upload_status(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, HttpAppError> {
    let session_id = parse_session_id(Some(&session_id))?;
    let status = state.sessions.status(session_id).await?;

    Ok(Json(StatusResponse {
        success: true,
        session_id,
        received: status.received,
        total: status.total,
        missing: status.missing,
        expires_at: status.expires_at,
    }))
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, AppError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::InvalidInput(format!(
            "Missing required field: {}",
            name
        ))),
    }
}

/// Any string that is not a session id we issued is simply an unknown session.
fn parse_session_id(value: Option<&str>) -> Result<Uuid, AppError> {
    let raw = required(value, "sessionId")?;
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound(format!("Upload session not found: {}", raw)))
}
