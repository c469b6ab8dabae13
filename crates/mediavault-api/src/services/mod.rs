pub mod multipart;
pub mod upload_sessions;

pub use multipart::MultipartCoordinator;
pub use upload_sessions::UploadSessionStore;
