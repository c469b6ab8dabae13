use crate::error::HttpAppError;
use crate::services::upload_sessions::notify_catalog_field;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use mediavault_core::UploadKind;
use mediavault_storage::keys::parse_destination;
use serde::Serialize;
use std::sync::Arc;

/// Clip field that records the playable rendition of the clip's video.
pub const TRANSCODED_PATH_FIELD: &str = "transcoded_path";

#[derive(Debug, Serialize)]
pub struct TranscodeResponse {
    pub success: bool,
    pub path: String,
    pub url: String,
    pub cached: bool,
}

/// GET `/api/v0/transcode/{*path}`
///
/// Long-running on a cache miss: the encoder may take minutes.
pub async fn transcode_media(
    State(state): State<Arc<AppState>>,
    Path(source): Path<String>,
) -> Result<impl IntoResponse, HttpAppError> {
    let outcome = state.transcode.get_or_transcode(&source).await?;

    if !outcome.cached && outcome.path != source {
        if let Some((UploadKind::Video, clip_id)) = parse_destination(&source) {
            notify_catalog_field(
                state.catalog.as_ref(),
                UploadKind::Video.entity(),
                &clip_id,
                TRANSCODED_PATH_FIELD,
                &outcome.path,
            )
            .await;
        }
    }

    Ok(Json(TranscodeResponse {
        success: true,
        path: outcome.path,
        url: outcome.url,
        cached: outcome.cached,
    }))
}
