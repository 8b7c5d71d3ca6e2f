//! Upload coordinator: issues upload/delete requests and reconciles their
//! results into the registry through a [`Dispatcher`].

use std::{
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use futures::{future::join_all, stream};
use reqwest::{
    multipart::{Form, Part},
    Body, Client,
};
use shared::{
    domain::{CategoryId, FileUuid, UploadId},
    error::ApiError,
    protocol::{UploadedFile, UPLOAD_FIELD},
};
use tracing::{info, warn};

use crate::{
    config::Settings,
    error::{FileManagerError, UploadError},
    registry::{Action, Epoch},
    store::Dispatcher,
};

/// Receives the percentage of the body handed to the transport so far.
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl PendingFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    pub async fn from_path(path: &Path) -> Result<Self, FileManagerError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| FileManagerError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { filename, bytes })
    }
}

#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn upload(
        &self,
        url: &str,
        file: PendingFile,
        progress: ProgressCallback,
    ) -> Result<UploadedFile, UploadError>;

    async fn delete(&self, uuid: FileUuid) -> Result<(), UploadError>;
}

pub struct HttpUploadTransport {
    http: Client,
    delete_url: String,
    chunk_bytes: usize,
}

impl HttpUploadTransport {
    pub fn new(settings: &Settings) -> Result<Self, UploadError> {
        let http = Client::builder()
            .timeout(settings.request_timeout())
            .build()?;
        Ok(Self {
            http,
            delete_url: settings.delete_url.trim_end_matches('/').to_string(),
            chunk_bytes: settings.upload_chunk_bytes.max(1),
        })
    }
}

fn percent_of(sent: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((sent.min(total) * 100) / total) as u8
}

async fn rejection(response: reqwest::Response) -> UploadError {
    let status = response.status();
    let message = match response.json::<ApiError>().await {
        Ok(body) => body.message,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    };
    UploadError::Rejected {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl UploadTransport for HttpUploadTransport {
    async fn upload(
        &self,
        url: &str,
        file: PendingFile,
        progress: ProgressCallback,
    ) -> Result<UploadedFile, UploadError> {
        let total = file.bytes.len();
        let chunks: Vec<Vec<u8>> = file
            .bytes
            .chunks(self.chunk_bytes)
            .map(<[u8]>::to_vec)
            .collect();
        let mut sent = 0usize;
        let body = stream::iter(chunks.into_iter().map(move |chunk| {
            sent += chunk.len();
            progress(percent_of(sent, total));
            Ok::<_, std::io::Error>(chunk)
        }));

        let part = Part::stream_with_length(Body::wrap_stream(body), total as u64)
            .file_name(file.filename);
        let response = self
            .http
            .post(url)
            .multipart(Form::new().part(UPLOAD_FIELD, part))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        Ok(response.json::<UploadedFile>().await?)
    }

    async fn delete(&self, uuid: FileUuid) -> Result<(), UploadError> {
        let response = self
            .http
            .delete(format!("{}/{uuid}", self.delete_url))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        Ok(())
    }
}

/// How a successful upload is recorded in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkAction {
    Uploaded,
    Modified { replaced: FileUuid },
}

#[derive(Clone)]
pub struct UploadCoordinator {
    transport: Arc<dyn UploadTransport>,
    next_upload_id: Arc<AtomicU64>,
}

impl UploadCoordinator {
    pub fn new(transport: Arc<dyn UploadTransport>) -> Self {
        Self {
            transport,
            next_upload_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Uploads every file concurrently. The result for each file, in input
    /// order, is the server-assigned identity or `None` if the upload failed
    /// or completed after the registry was reset.
    pub async fn upload_files(
        &self,
        mark: MarkAction,
        category_id: CategoryId,
        files: Vec<PendingFile>,
        upload_url: &str,
        dispatch: &Dispatcher,
    ) -> Vec<Option<UploadedFile>> {
        let epoch = dispatch.epoch();
        let uploads = files.into_iter().map(|file| {
            self.upload_one(mark.clone(), category_id, file, upload_url, dispatch, epoch)
        });
        join_all(uploads).await
    }

    async fn upload_one(
        &self,
        mark: MarkAction,
        category_id: CategoryId,
        file: PendingFile,
        upload_url: &str,
        dispatch: &Dispatcher,
        epoch: Epoch,
    ) -> Option<UploadedFile> {
        let upload_id = UploadId(self.next_upload_id.fetch_add(1, Ordering::Relaxed));
        let filename = file.filename.clone();
        dispatch.dispatch_at(
            epoch,
            Action::StartUpload {
                upload_id,
                category_id,
                filename: filename.clone(),
            },
        );

        let progress_dispatch = dispatch.clone();
        let progress: ProgressCallback = Arc::new(move |percent: u8| {
            progress_dispatch.dispatch_at(epoch, Action::Progress { upload_id, percent });
        });

        let uploaded = match self.transport.upload(upload_url, file, progress).await {
            Ok(uploaded) => uploaded,
            Err(err) => {
                warn!(%category_id, %filename, error = %err, "upload failed");
                dispatch.dispatch_at(
                    epoch,
                    Action::UploadFailed {
                        upload_id,
                        reason: err.to_string(),
                    },
                );
                return None;
            }
        };

        let action = match mark {
            MarkAction::Uploaded => Action::MarkUploaded {
                upload_id,
                category_id,
                uuid: uploaded.uuid,
                filename: uploaded.filename.clone(),
            },
            MarkAction::Modified { replaced } => Action::MarkModified {
                upload_id,
                category_id,
                uuid: uploaded.uuid,
                filename: uploaded.filename.clone(),
                replaced,
            },
        };
        let applied = match dispatch.apply(Some(epoch), action).await {
            Ok(ack) => ack.applied,
            Err(err) => {
                warn!(uuid = %uploaded.uuid, error = %err, "registry gone before upload was recorded");
                false
            }
        };
        if !applied {
            info!(uuid = %uploaded.uuid, "upload finished after reset; discarding");
            self.delete_file(uploaded.uuid).await;
            return None;
        }

        info!(%category_id, uuid = %uploaded.uuid, filename = %uploaded.filename, "upload complete");
        Some(uploaded)
    }

    /// Best-effort server-side deletion; failures are only logged.
    pub async fn delete_file(&self, uuid: FileUuid) {
        if let Err(err) = self.transport.delete(uuid).await {
            warn!(%uuid, error = %err, "failed to delete file");
        }
    }
}

#[cfg(test)]
#[path = "tests/uploader_tests.rs"]
mod tests;
