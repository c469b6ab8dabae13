pub mod storage;
pub mod upload;

pub use storage::{ObjectMetadata, StorageFile};
pub use upload::UploadKind;
