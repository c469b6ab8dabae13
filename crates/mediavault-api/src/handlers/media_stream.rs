//! Range-aware media serving.
//!
//! A request without a Range header gets the whole object with status 200 (some TV
//! runtimes refuse a 206 for the first request); a Range header gets a 206 for exactly
//! the resolved window. Bodies are always streamed from storage, never buffered.

use crate::error::HttpAppError;
use crate::state::AppState;
use crate::utils::range::resolve_range;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::Response,
};
use futures::StreamExt;
use mediavault_core::formats;
use mediavault_core::AppError;
use std::sync::Arc;

/// GET and HEAD `/api/v0/media/{*path}`
#[tracing::instrument(skip_all, fields(key = %path, method = %method))]
pub async fn stream_media(
    State(state): State<Arc<AppState>>,
    method: Method,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Result<Response, HttpAppError> {
    let meta = state.storage.metadata(&path).await?;
    let size = meta.size;

    let content_type = formats::content_type_for_path(&path);
    let max_age = if formats::is_streaming_type(&path) {
        state.config.streaming.stream_cache_max_age_secs
    } else {
        state.config.streaming.static_cache_max_age_secs
    };

    let range = match headers.get(header::RANGE) {
        Some(value) => {
            let value = value.to_str().map_err(|_| {
                AppError::RangeNotSatisfiable("Range header is not valid ASCII".to_string())
            })?;
            Some(resolve_range(
                value,
                size,
                state.config.streaming.range_chunk_size,
            )?)
        }
        None => None,
    };

    let (status, start, length) = match range {
        Some(range) => (StatusCode::PARTIAL_CONTENT, range.start, range.length()),
        None => (StatusCode::OK, 0, size),
    };

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, length)
        .header(header::CACHE_CONTROL, format!("public, max-age={}", max_age))
        .header(
            header::LAST_MODIFIED,
            meta.last_modified
                .format("%a, %d %b %Y %H:%M:%S GMT")
                .to_string(),
        );
    if let Some(range) = range {
        builder = builder.header(header::CONTENT_RANGE, range.content_range(size));
    }

    let body = if method == Method::HEAD || length == 0 {
        Body::empty()
    } else {
        let end = start + length - 1;
        let stream = state
            .storage
            .download_range_stream(&path, start, end)
            .await?;
        let path_for_log = path.clone();
        Body::from_stream(stream.map(move |chunk| {
            chunk.map_err(|e| {
                tracing::warn!(key = %path_for_log, error = %e, "Media stream aborted");
                std::io::Error::other(format!("Storage stream error: {}", e))
            })
        }))
    };

    tracing::debug!(
        status = status.as_u16(),
        start,
        length,
        size_bytes = size,
        "Serving media"
    );

    builder
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build media response: {}", e)).into())
}
