use std::path::PathBuf;

use shared::domain::{CategoryId, FileUuid};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

#[derive(Debug, Error)]
pub enum FileManagerError {
    #[error("unknown file category {0}")]
    UnknownCategory(CategoryId),
    #[error("file {uuid} not found in category {category_id}")]
    UnknownFile {
        category_id: CategoryId,
        uuid: FileUuid,
    },
    #[error("invalid filename template '{template}' for category {category_id}: {message}")]
    InvalidTemplate {
        category_id: CategoryId,
        template: String,
        message: String,
    },
    #[error("failed to read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("file registry has shut down")]
    StoreClosed,
    #[error(transparent)]
    Upload(#[from] UploadError),
}
