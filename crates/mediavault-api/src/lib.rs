//! HTTP surface of the media storage engine: range streaming, chunked and multipart
//! uploads, on-demand transcoding and health probes.

pub mod constants;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod services;
pub mod setup;
pub mod state;
pub mod telemetry;
pub mod utils;

pub use state::AppState;
