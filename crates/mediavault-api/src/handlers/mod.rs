pub mod chunked_upload;
pub mod health;
pub mod media_stream;
pub mod multipart_upload;
pub mod transcode;
