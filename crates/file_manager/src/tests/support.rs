use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use shared::{domain::FileUuid, protocol::UploadedFile};
use uuid::Uuid;

use crate::{
    error::UploadError,
    form::{FieldValue, FormSink},
    uploader::{PendingFile, ProgressCallback, UploadTransport},
};

pub(crate) fn uuid(n: u128) -> FileUuid {
    FileUuid(Uuid::from_u128(n))
}

/// In-memory upload endpoint handing out sequential uuids.
#[derive(Default)]
pub(crate) struct RecordingTransport {
    next_uuid: AtomicU64,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    pub uploads: Mutex<Vec<(String, String)>>,
    pub deleted: Mutex<Vec<FileUuid>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            next_uuid: AtomicU64::new(1),
            ..Self::default()
        }
    }

    pub fn failing_on(mut self, filename: &str) -> Self {
        self.failing.insert(filename.to_string());
        self
    }

    pub fn delayed(mut self, filename: &str, delay: Duration) -> Self {
        self.delays.insert(filename.to_string(), delay);
        self
    }

    /// Next uuid that will be assigned.
    pub fn peek_uuid(&self) -> FileUuid {
        uuid(self.next_uuid.load(Ordering::SeqCst) as u128)
    }

    pub fn deleted(&self) -> Vec<FileUuid> {
        self.deleted.lock().expect("deleted lock").clone()
    }

    pub fn upload_urls(&self) -> Vec<String> {
        self.uploads
            .lock()
            .expect("uploads lock")
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }
}

#[async_trait]
impl UploadTransport for RecordingTransport {
    async fn upload(
        &self,
        url: &str,
        file: PendingFile,
        progress: ProgressCallback,
    ) -> Result<UploadedFile, UploadError> {
        self.uploads
            .lock()
            .expect("uploads lock")
            .push((url.to_string(), file.filename.clone()));
        if let Some(delay) = self.delays.get(&file.filename) {
            tokio::time::sleep(*delay).await;
        }
        progress(50);
        if self.failing.contains(&file.filename) {
            return Err(UploadError::Rejected {
                status: 500,
                message: "storage unavailable".to_string(),
            });
        }
        progress(100);
        let n = self.next_uuid.fetch_add(1, Ordering::SeqCst);
        Ok(UploadedFile {
            uuid: uuid(n as u128),
            filename: file.filename,
        })
    }

    async fn delete(&self, uuid: FileUuid) -> Result<(), UploadError> {
        self.deleted.lock().expect("deleted lock").push(uuid);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    pub values: Mutex<Vec<FieldValue>>,
}

impl RecordingSink {
    pub fn values(&self) -> Vec<FieldValue> {
        self.values.lock().expect("sink lock").clone()
    }
}

impl FormSink for RecordingSink {
    fn publish(&self, value: FieldValue) {
        self.values.lock().expect("sink lock").push(value);
    }
}

pub(crate) fn recording() -> (Arc<RecordingTransport>, Arc<RecordingSink>) {
    (
        Arc::new(RecordingTransport::new()),
        Arc::new(RecordingSink::default()),
    )
}
