//! HTTP error response conversion
//!
//! Handlers return `Result<impl IntoResponse, HttpAppError>`. Domain errors from the
//! storage and processing crates convert into [`HttpAppError`] via `?`, so every failure
//! reaches the client as the same `{success: false, error, code, ...}` JSON body.

use axum::{
    extract::multipart::{MultipartError, MultipartRejection},
    extract::rejection::JsonRejection,
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mediavault_core::{AppError, ErrorMetadata, LogLevel};
use mediavault_processing::TranscodeError;
use mediavault_storage::StorageError;
use serde::{de::DeserializeOwned, Serialize};
use std::any::Any;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Always false; lets clients branch on one field for every endpoint.
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// Machine-readable error code for programmatic handling
    pub code: String,
    /// Whether this error is recoverable (can be retried)
    pub recoverable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

/// Wrapper type for AppError to implement IntoResponse
/// (orphan rules: IntoResponse and AppError both live in other crates)
#[derive(Debug)]
pub struct HttpAppError(pub AppError);

impl From<AppError> for HttpAppError {
    fn from(err: AppError) -> Self {
        HttpAppError(err)
    }
}

impl From<anyhow::Error> for HttpAppError {
    fn from(err: anyhow::Error) -> Self {
        HttpAppError(AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        })
    }
}

/// Convert JSON body deserialization failures into a 400 with our ErrorResponse format.
impl From<JsonRejection> for HttpAppError {
    fn from(rejection: JsonRejection) -> Self {
        HttpAppError(AppError::InvalidInput(format!(
            "Invalid request body: {}",
            rejection.body_text()
        )))
    }
}

impl From<MultipartError> for HttpAppError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return HttpAppError(AppError::PayloadTooLarge(err.body_text()));
        }
        HttpAppError(AppError::BadRequest(format!(
            "Failed to read multipart body: {}",
            err.body_text()
        )))
    }
}

impl From<MultipartRejection> for HttpAppError {
    fn from(rejection: MultipartRejection) -> Self {
        HttpAppError(AppError::BadRequest(format!(
            "Invalid multipart request: {}",
            rejection.body_text()
        )))
    }
}

/// JSON body extractor that returns our ErrorResponse format (400 + JSON) on deserialization failure.
#[derive(Debug, Clone, Copy)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = HttpAppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(inner) = Json::<T>::from_request(req, state)
            .await
            .map_err(HttpAppError::from)?;
        Ok(ValidatedJson(inner))
    }
}

fn log_error(error: &AppError) {
    let error_type = error.error_type();
    match error.log_level() {
        LogLevel::Debug => {
            tracing::debug!(error = %error, error_type = error_type, "Error occurred");
        }
        LogLevel::Warn => {
            tracing::warn!(error = %error, error_type = error_type, "Error occurred");
        }
        LogLevel::Error => {
            tracing::error!(error = %error, error_type = error_type, "Error occurred");
        }
    }
}

fn is_production_env() -> bool {
    std::env::var("ENVIRONMENT")
        .or_else(|_| std::env::var("APP_ENV"))
        .map(|env| env.to_lowercase() == "production" || env.to_lowercase() == "prod")
        .unwrap_or(false)
}

impl IntoResponse for HttpAppError {
    fn into_response(self) -> Response {
        let app_error = &self.0;

        let status = StatusCode::from_u16(app_error.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        log_error(app_error);

        // Details only leave the process outside production, and never for sensitive errors.
        let show_details = !is_production_env() && !app_error.is_sensitive();

        let body = ErrorResponse {
            success: false,
            error: app_error.client_message(),
            details: show_details.then(|| app_error.detailed_message()),
            error_type: show_details.then(|| app_error.error_type().to_string()),
            code: app_error.error_code().to_string(),
            recoverable: app_error.is_recoverable(),
            suggested_action: app_error.suggested_action().map(String::from),
        };

        (status, Json(body)).into_response()
    }
}

/// Response for a panicking handler, used by `CatchPanicLayer`.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| panic.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown panic".to_string());

    HttpAppError(AppError::Internal(format!("Handler panicked: {}", message))).into_response()
}

/// Taxonomy mapping for storage failures, shared by handlers and services.
pub fn storage_app_error(err: StorageError) -> AppError {
    match err {
        StorageError::NotFound(path) => AppError::NotFound(format!("Not found: {}", path)),
        StorageError::InvalidKey(msg) => AppError::InvalidInput(msg),
        StorageError::InvalidRange(msg) => AppError::RangeNotSatisfiable(msg),
        StorageError::Unsupported(msg) => AppError::BadRequest(msg),
        StorageError::UploadFailed(msg)
        | StorageError::DownloadFailed(msg)
        | StorageError::DeleteFailed(msg)
        | StorageError::BackendError(msg) => AppError::Storage(msg),
        StorageError::IoError(err) => AppError::Storage(format!("IO error: {}", err)),
        StorageError::ConfigError(msg) => AppError::Internal(msg),
    }
}

impl From<StorageError> for HttpAppError {
    fn from(err: StorageError) -> Self {
        HttpAppError(storage_app_error(err))
    }
}

impl From<TranscodeError> for HttpAppError {
    fn from(err: TranscodeError) -> Self {
        let app = match err {
            TranscodeError::SourceNotFound(path) => {
                AppError::NotFound(format!("Not found: {}", path))
            }
            TranscodeError::Storage(storage) => return HttpAppError::from(storage),
            err @ (TranscodeError::Timeout(_)
            | TranscodeError::EncoderFailed { .. }
            | TranscodeError::Launch(_)) => AppError::TranscodeFailed(err.to_string()),
            err @ (TranscodeError::Scratch(_) | TranscodeError::Task(_)) => {
                AppError::Internal(err.to_string())
            }
        };
        HttpAppError(app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: impl Into<HttpAppError>) -> u16 {
        err.into().into_response().status().as_u16()
    }

    #[test]
    fn test_storage_error_statuses() {
        assert_eq!(status_of(StorageError::NotFound("a".into())), 404);
        assert_eq!(status_of(StorageError::InvalidKey("..".into())), 400);
        assert_eq!(status_of(StorageError::InvalidRange("9-1".into())), 400);
        assert_eq!(status_of(StorageError::Unsupported("multipart".into())), 400);
        assert_eq!(status_of(StorageError::BackendError("down".into())), 500);
    }

    #[tokio::test]
    async fn test_multipart_rejection_is_400() {
        let request = Request::builder()
            .uri("/uploads/chunked")
            .body(axum::body::Body::empty())
            .unwrap();
        let Err(rejection) = axum::extract::Multipart::from_request(request, &()).await else {
            panic!("a body without a multipart boundary must be rejected");
        };
        assert_eq!(status_of(rejection), 400);
    }

    #[test]
    fn test_transcode_error_statuses() {
        assert_eq!(status_of(TranscodeError::SourceNotFound("a.mkv".into())), 404);
        assert_eq!(
            status_of(TranscodeError::Timeout(std::time::Duration::from_secs(1))),
            500
        );
        let err = HttpAppError::from(TranscodeError::EncoderFailed {
            status: "exit status: 1".into(),
            stderr: String::new(),
        });
        assert_eq!(err.0.error_code(), "TRANSCODE_FAILED");
    }

    #[test]
    fn test_panic_response_is_json_500() {
        let response = panic_response(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
