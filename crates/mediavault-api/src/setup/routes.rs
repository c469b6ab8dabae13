//! Route configuration and setup

use crate::constants::API_PREFIX;
use crate::error::{panic_response, HttpAppError};
use crate::handlers::{chunked_upload, health, media_stream, multipart_upload, transcode};
use crate::middleware::request_id::REQUEST_ID_HEADER;
use crate::middleware::{get_request_id, request_id_middleware};
use crate::state::AppState;
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method, Request, Uri},
    routing::{get, post},
    Router,
};
use mediavault_core::{AppError, Config};
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Setup all application routes
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Result<Router<()>, anyhow::Error> {
    let cors = setup_cors(config)?;

    let api_routes = Router::new()
        .route("/media/{*path}", get(media_stream::stream_media))
        .route("/uploads/chunked", post(chunked_upload::chunked_upload))
        .route(
            "/uploads/chunked/{session_id}",
            get(chunked_upload::chunked_upload_status),
        )
        .route(
            "/uploads/multipart/init",
            post(multipart_upload::initiate_multipart),
        )
        .route(
            "/uploads/multipart/complete",
            post(multipart_upload::complete_multipart),
        )
        .route(
            "/uploads/multipart/abort",
            post(multipart_upload::abort_multipart),
        )
        .route("/transcode/{*path}", get(transcode::transcode_media));

    let trace_layer = TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
        let request_id = get_request_id(request).unwrap_or_default();
        tracing::info_span!(
            "http_request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    });

    let http_concurrency_limit = config.base.http_concurrency_limit.max(1);
    let body_limit = config.max_request_body_bytes();
    tracing::info!(
        http_concurrency_limit,
        body_limit_bytes = body_limit,
        "HTTP limits configured"
    );

    let app = Router::new()
        .route("/health/live", get(health::liveness_check))
        .route("/health/ready", get(health::readiness_check))
        .nest(API_PREFIX, api_routes)
        .fallback(route_not_found)
        // The tower-http limit below replaces axum's default 2 MB extractor limit.
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(ConcurrencyLimitLayer::new(http_concurrency_limit))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(cors)
        .layer(trace_layer)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .with_state(state);

    Ok(app)
}

async fn route_not_found(uri: Uri) -> HttpAppError {
    AppError::NotFound(format!("No route for {}", uri.path())).into()
}

/// Setup CORS configuration
fn setup_cors(config: &Config) -> Result<CorsLayer, anyhow::Error> {
    let methods = [Method::GET, Method::HEAD, Method::POST, Method::OPTIONS];
    let exposed: [HeaderName; 5] = [
        header::ACCEPT_RANGES,
        header::CONTENT_RANGE,
        header::CONTENT_LENGTH,
        header::CONTENT_TYPE,
        REQUEST_ID_HEADER,
    ];

    let cors = if config.base.cors_origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS configured to allow all origins - not recommended for production");
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins = config
            .base
            .cors_origins
            .iter()
            .map(|o| o.parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow::anyhow!("Invalid CORS origin: {}", e))?;
        CorsLayer::new().allow_origin(origins)
    };

    Ok(cors
        .allow_methods(methods)
        .allow_headers(Any)
        .expose_headers(exposed))
}
