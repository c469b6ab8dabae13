//! Direct multipart upload handlers (S3-compatible backends only).

use crate::error::{HttpAppError, ValidatedJson};
use crate::services::multipart::{MultipartHandle, MultipartInit};
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use mediavault_core::{AppError, UploadKind};
use mediavault_storage::CompletedPartInfo;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateMultipartRequest {
    #[serde(rename = "type")]
    pub upload_type: String,
    pub target_id: String,
    pub filename: String,
    pub total_size: u64,
    pub part_count: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateMultipartResponse {
    pub success: bool,
    #[serde(flatten)]
    pub handle: MultipartHandle,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPart {
    pub part_number: u32,
    #[serde(alias = "ETag")]
    pub etag: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteMultipartRequest {
    pub upload_id: String,
    pub storage_path: String,
    pub parts: Vec<CompletedPart>,
}

#[derive(Debug, Serialize)]
pub struct CompleteMultipartResponse {
    pub success: bool,
    pub path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbortMultipartRequest {
    pub upload_id: String,
    pub storage_path: String,
}

/// POST `/api/v0/uploads/multipart/init`
pub async fn initiate_multipart(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<InitiateMultipartRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let kind: UploadKind = request
        .upload_type
        .parse()
        .map_err(AppError::InvalidInput)?;
    if request.target_id.trim().is_empty() || request.filename.trim().is_empty() {
        return Err(AppError::InvalidInput("targetId and filename are required".to_string()).into());
    }

    let handle = state
        .multipart
        .initiate(MultipartInit {
            kind,
            target_id: request.target_id,
            filename: request.filename,
            total_size: request.total_size,
            part_count: request.part_count,
        })
        .await?;

    Ok(Json(InitiateMultipartResponse {
        success: true,
        handle,
    }))
}

/// POST `/api/v0/uploads/multipart/complete`
pub async fn complete_multipart(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<CompleteMultipartRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let parts = request
        .parts
        .into_iter()
        .map(|p| CompletedPartInfo {
            part_number: p.part_number,
            etag: p.etag,
        })
        .collect();

    let path = state
        .multipart
        .complete(&request.upload_id, &request.storage_path, parts)
        .await?;

    Ok(Json(CompleteMultipartResponse {
        success: true,
        path,
    }))
}

/// POST `/api/v0/uploads/multipart/abort`
pub async fn abort_multipart(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<AbortMultipartRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    state
        .multipart
        .abort(&request.upload_id, &request.storage_path)
        .await?;

    Ok(Json(serde_json::json!({ "success": true })))
}
