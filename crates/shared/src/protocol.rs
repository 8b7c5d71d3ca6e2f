use serde::{Deserialize, Serialize};

use crate::domain::FileUuid;

/// Success body of the upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub uuid: FileUuid,
    pub filename: String,
}

/// Multipart field carrying the file content.
pub const UPLOAD_FIELD: &str = "file";
