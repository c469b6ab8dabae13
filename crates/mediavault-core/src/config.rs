//! Configuration module
//!
//! Settings are read from the environment (after loading `.env` with dotenvy), parsed
//! once into [`Config`] and validated at startup. Parsing goes through a key lookup
//! function so tests can supply values without mutating the process environment.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::storage_types::StorageBackend;

// Common constants
const SERVER_PORT: u16 = 4000;
const HTTP_CONCURRENCY_LIMIT: usize = 10_000;
const MIB: u64 = 1024 * 1024;
const RANGE_CHUNK_SIZE_BYTES: u64 = 2 * MIB;
const STREAM_CACHE_MAX_AGE_SECS: u64 = 7 * 24 * 3600;
const STATIC_CACHE_MAX_AGE_SECS: u64 = 24 * 3600;
const MAX_CHUNKED_UPLOAD_BYTES: u64 = 512 * MIB;
const MAX_CHUNK_SIZE_BYTES: u64 = 64 * MIB;
const UPLOAD_SESSION_TTL_SECS: u64 = 3600;
const UPLOAD_SWEEP_INTERVAL_SECS: u64 = 300;
const MULTIPART_MAX_TOTAL_BYTES: u64 = 2 * 1024 * MIB;
const MULTIPART_MAX_PARTS: u32 = 10_000;
const MULTIPART_URL_EXPIRY_SECS: u64 = 3600;
const TRANSCODE_TIMEOUT_SECS: u64 = 600;
const MAX_CONCURRENT_TRANSCODES: usize = 2;
const SIGNED_URL_EXPIRY_SECS: u64 = 3600;
const S3_MAX_CONNECTIONS: usize = 50;
const S3_CONNECT_TIMEOUT_SECS: u64 = 5;
const S3_READ_TIMEOUT_SECS: u64 = 30;

/// HTTP server settings
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub environment: String,
    pub http_concurrency_limit: usize,
    pub log_format: String,
}

/// Storage backend selection and credentials
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub local_storage_path: PathBuf,
    pub local_storage_base_url: String,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    // Custom endpoint for S3-compatible providers (MinIO, R2, DigitalOcean Spaces, etc.)
    pub s3_endpoint: Option<String>,
    pub s3_access_key_id: Option<String>,
    pub s3_secret_access_key: Option<String>,
    pub s3_public_url: Option<String>,
    pub s3_max_connections: usize,
    pub s3_connect_timeout: Duration,
    pub s3_read_timeout: Duration,
}

/// Range streaming settings
#[derive(Clone, Debug)]
pub struct StreamingConfig {
    /// Size of the window served for open-ended `bytes=N-` requests.
    pub range_chunk_size: u64,
    pub stream_cache_max_age_secs: u64,
    pub static_cache_max_age_secs: u64,
}

/// Chunked and multipart upload limits
#[derive(Clone, Debug)]
pub struct UploadConfig {
    pub max_chunked_upload_bytes: u64,
    pub max_chunk_size_bytes: u64,
    pub session_ttl: Duration,
    pub sweep_interval: Duration,
    pub multipart_max_total_bytes: u64,
    pub multipart_max_parts: u32,
    pub multipart_url_expiry: Duration,
}

/// Transcode cache settings
#[derive(Clone, Debug)]
pub struct TranscodeConfig {
    pub ffmpeg_path: String,
    pub timeout: Duration,
    pub scratch_dir: PathBuf,
    pub max_concurrent_transcodes: usize,
    pub signed_url_expiry: Duration,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub base: BaseConfig,
    pub storage: StorageConfig,
    pub streaming: StreamingConfig,
    pub uploads: UploadConfig,
    pub transcode: TranscodeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            base: BaseConfig {
                server_port: SERVER_PORT,
                cors_origins: vec!["*".to_string()],
                environment: "development".to_string(),
                http_concurrency_limit: HTTP_CONCURRENCY_LIMIT,
                log_format: "text".to_string(),
            },
            storage: StorageConfig {
                backend: StorageBackend::Local,
                local_storage_path: PathBuf::from("./storage"),
                local_storage_base_url: format!("http://localhost:{}/api/v0/media", SERVER_PORT),
                s3_bucket: None,
                s3_region: None,
                s3_endpoint: None,
                s3_access_key_id: None,
                s3_secret_access_key: None,
                s3_public_url: None,
                s3_max_connections: S3_MAX_CONNECTIONS,
                s3_connect_timeout: Duration::from_secs(S3_CONNECT_TIMEOUT_SECS),
                s3_read_timeout: Duration::from_secs(S3_READ_TIMEOUT_SECS),
            },
            streaming: StreamingConfig {
                range_chunk_size: RANGE_CHUNK_SIZE_BYTES,
                stream_cache_max_age_secs: STREAM_CACHE_MAX_AGE_SECS,
                static_cache_max_age_secs: STATIC_CACHE_MAX_AGE_SECS,
            },
            uploads: UploadConfig {
                max_chunked_upload_bytes: MAX_CHUNKED_UPLOAD_BYTES,
                max_chunk_size_bytes: MAX_CHUNK_SIZE_BYTES,
                session_ttl: Duration::from_secs(UPLOAD_SESSION_TTL_SECS),
                sweep_interval: Duration::from_secs(UPLOAD_SWEEP_INTERVAL_SECS),
                multipart_max_total_bytes: MULTIPART_MAX_TOTAL_BYTES,
                multipart_max_parts: MULTIPART_MAX_PARTS,
                multipart_url_expiry: Duration::from_secs(MULTIPART_URL_EXPIRY_SECS),
            },
            transcode: TranscodeConfig {
                ffmpeg_path: "ffmpeg".to_string(),
                timeout: Duration::from_secs(TRANSCODE_TIMEOUT_SECS),
                scratch_dir: env::temp_dir(),
                max_concurrent_transcodes: MAX_CONCURRENT_TRANSCODES,
                signed_url_expiry: Duration::from_secs(SIGNED_URL_EXPIRY_SECS),
            },
        }
    }
}

/// Parse an optional value, failing loudly on garbage instead of silently using the default.
fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> Result<T, anyhow::Error>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("{} must be a valid value, got '{}'", key, raw)),
        _ => Ok(default),
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup, starting from the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let environment = non_empty(&lookup, "ENVIRONMENT")
            .or_else(|| non_empty(&lookup, "APP_ENV"))
            .unwrap_or(defaults.base.environment);

        let cors_origins: Vec<String> = non_empty(&lookup, "CORS_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let base = BaseConfig {
            server_port: parse_var(&lookup, "PORT", defaults.base.server_port)?,
            cors_origins,
            environment,
            http_concurrency_limit: parse_var(
                &lookup,
                "HTTP_CONCURRENCY_LIMIT",
                defaults.base.http_concurrency_limit,
            )?
            .max(1),
            log_format: non_empty(&lookup, "LOG_FORMAT").unwrap_or(defaults.base.log_format),
        };

        let storage = StorageConfig {
            backend: parse_var(&lookup, "STORAGE_BACKEND", defaults.storage.backend)?,
            local_storage_path: non_empty(&lookup, "LOCAL_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage.local_storage_path),
            local_storage_base_url: non_empty(&lookup, "LOCAL_STORAGE_BASE_URL")
                .unwrap_or_else(|| {
                    format!("http://localhost:{}/api/v0/media", base.server_port)
                }),
            s3_bucket: non_empty(&lookup, "S3_BUCKET"),
            s3_region: non_empty(&lookup, "S3_REGION").or_else(|| non_empty(&lookup, "AWS_REGION")),
            s3_endpoint: non_empty(&lookup, "S3_ENDPOINT"),
            s3_access_key_id: non_empty(&lookup, "S3_ACCESS_KEY_ID"),
            s3_secret_access_key: non_empty(&lookup, "S3_SECRET_ACCESS_KEY"),
            s3_public_url: non_empty(&lookup, "S3_PUBLIC_URL"),
            s3_max_connections: parse_var(
                &lookup,
                "S3_MAX_CONNECTIONS",
                defaults.storage.s3_max_connections,
            )?,
            s3_connect_timeout: Duration::from_secs(parse_var(
                &lookup,
                "S3_CONNECT_TIMEOUT_SECS",
                S3_CONNECT_TIMEOUT_SECS,
            )?),
            s3_read_timeout: Duration::from_secs(parse_var(
                &lookup,
                "S3_READ_TIMEOUT_SECS",
                S3_READ_TIMEOUT_SECS,
            )?),
        };

        let streaming = StreamingConfig {
            range_chunk_size: parse_var(
                &lookup,
                "RANGE_CHUNK_SIZE_BYTES",
                defaults.streaming.range_chunk_size,
            )?,
            stream_cache_max_age_secs: parse_var(
                &lookup,
                "STREAM_CACHE_MAX_AGE_SECS",
                defaults.streaming.stream_cache_max_age_secs,
            )?,
            static_cache_max_age_secs: parse_var(
                &lookup,
                "STATIC_CACHE_MAX_AGE_SECS",
                defaults.streaming.static_cache_max_age_secs,
            )?,
        };

        let uploads = UploadConfig {
            max_chunked_upload_bytes: parse_var(
                &lookup,
                "MAX_CHUNKED_UPLOAD_BYTES",
                defaults.uploads.max_chunked_upload_bytes,
            )?,
            max_chunk_size_bytes: parse_var(
                &lookup,
                "MAX_CHUNK_SIZE_BYTES",
                defaults.uploads.max_chunk_size_bytes,
            )?,
            session_ttl: Duration::from_secs(parse_var(
                &lookup,
                "UPLOAD_SESSION_TTL_SECS",
                UPLOAD_SESSION_TTL_SECS,
            )?),
            sweep_interval: Duration::from_secs(parse_var(
                &lookup,
                "UPLOAD_SWEEP_INTERVAL_SECS",
                UPLOAD_SWEEP_INTERVAL_SECS,
            )?),
            multipart_max_total_bytes: parse_var(
                &lookup,
                "MULTIPART_MAX_TOTAL_BYTES",
                defaults.uploads.multipart_max_total_bytes,
            )?,
            multipart_max_parts: parse_var(
                &lookup,
                "MULTIPART_MAX_PARTS",
                defaults.uploads.multipart_max_parts,
            )?,
            multipart_url_expiry: Duration::from_secs(parse_var(
                &lookup,
                "MULTIPART_URL_EXPIRY_SECS",
                MULTIPART_URL_EXPIRY_SECS,
            )?),
        };

        let transcode = TranscodeConfig {
            ffmpeg_path: non_empty(&lookup, "FFMPEG_PATH").unwrap_or(defaults.transcode.ffmpeg_path),
            timeout: Duration::from_secs(parse_var(
                &lookup,
                "TRANSCODE_TIMEOUT_SECS",
                TRANSCODE_TIMEOUT_SECS,
            )?),
            scratch_dir: non_empty(&lookup, "TRANSCODE_SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.transcode.scratch_dir),
            max_concurrent_transcodes: parse_var(
                &lookup,
                "MAX_CONCURRENT_TRANSCODES",
                defaults.transcode.max_concurrent_transcodes,
            )?
            .max(1),
            signed_url_expiry: Duration::from_secs(parse_var(
                &lookup,
                "SIGNED_URL_EXPIRY_SECS",
                SIGNED_URL_EXPIRY_SECS,
            )?),
        };

        Ok(Config {
            base,
            storage,
            streaming,
            uploads,
            transcode,
        })
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.base.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    /// Fail fast on settings that would only break at request time.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.is_production() && self.base.cors_origins.iter().any(|o| o == "*") {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }

        if self.streaming.range_chunk_size == 0 {
            return Err(anyhow::anyhow!("RANGE_CHUNK_SIZE_BYTES must be greater than 0"));
        }

        if self.uploads.max_chunk_size_bytes == 0
            || self.uploads.max_chunk_size_bytes > self.uploads.max_chunked_upload_bytes
        {
            return Err(anyhow::anyhow!(
                "MAX_CHUNK_SIZE_BYTES must be between 1 and MAX_CHUNKED_UPLOAD_BYTES"
            ));
        }

        if self.uploads.session_ttl.is_zero() {
            return Err(anyhow::anyhow!("UPLOAD_SESSION_TTL_SECS must be greater than 0"));
        }

        if self.uploads.sweep_interval.is_zero() {
            return Err(anyhow::anyhow!("UPLOAD_SWEEP_INTERVAL_SECS must be greater than 0"));
        }

        if self.transcode.timeout.is_zero() {
            return Err(anyhow::anyhow!("TRANSCODE_TIMEOUT_SECS must be greater than 0"));
        }

        if self.uploads.multipart_max_parts == 0 || self.uploads.multipart_max_parts > MULTIPART_MAX_PARTS
        {
            return Err(anyhow::anyhow!(
                "MULTIPART_MAX_PARTS must be between 1 and {}",
                MULTIPART_MAX_PARTS
            ));
        }

        if self.storage.backend == StorageBackend::S3 {
            if self.storage.s3_bucket.is_none() {
                return Err(anyhow::anyhow!(
                    "S3_BUCKET must be set when using S3 storage backend"
                ));
            }
            if self.storage.s3_region.is_none() {
                return Err(anyhow::anyhow!(
                    "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                ));
            }
            if self.storage.s3_access_key_id.is_some() != self.storage.s3_secret_access_key.is_some()
            {
                return Err(anyhow::anyhow!(
                    "S3_ACCESS_KEY_ID and S3_SECRET_ACCESS_KEY must be set together"
                ));
            }
        }

        Ok(())
    }

    /// Largest request body any route accepts: one chunk plus multipart framing overhead.
    pub fn max_request_body_bytes(&self) -> usize {
        (self.uploads.max_chunk_size_bytes + MIB) as usize
    }
}
