//! Categorized file attachments for a form: a registry of per-category files,
//! an upload coordinator talking to the upload endpoint, per-category drop
//! handling and the bridge back to the form.

use std::sync::Arc;

use shared::domain::{CategoryId, FileEntry, FileState, FileType, FileUuid};
use tokio::sync::Mutex;
use tracing::info;

pub mod config;
pub mod dropzone;
pub mod error;
pub mod form;
pub mod registry;
pub mod store;
pub mod uploader;

use config::Settings;
use dropzone::{CategoryDropzone, DropOutcome};
use error::{FileManagerError, UploadError};
use form::{FieldValue, FormSink, PristineTracker};
use registry::{Action, RegistryState};
use store::{Dispatcher, Store};
use uploader::{HttpUploadTransport, PendingFile, UploadCoordinator, UploadTransport};

/// Handle to one editing session. Clones share the same registry.
///
/// Must be created inside a tokio runtime.
#[derive(Clone)]
pub struct FileManager {
    store: Arc<Store>,
    dispatcher: Dispatcher,
    coordinator: UploadCoordinator,
    pristine: Arc<Mutex<PristineTracker>>,
    upload_url: String,
}

impl FileManager {
    pub fn new(
        initial: Vec<FileType>,
        settings: &Settings,
        sink: Arc<dyn FormSink>,
    ) -> Result<Self, UploadError> {
        let transport = HttpUploadTransport::new(settings)?;
        Ok(Self::with_transport(
            initial,
            settings.upload_url.clone(),
            Arc::new(transport),
            sink,
        ))
    }

    pub fn with_transport(
        initial: Vec<FileType>,
        upload_url: impl Into<String>,
        transport: Arc<dyn UploadTransport>,
        sink: Arc<dyn FormSink>,
    ) -> Self {
        let store = Store::spawn(RegistryState::new(initial.clone()), sink);
        let dispatcher = store.dispatcher();
        Self {
            store: Arc::new(store),
            dispatcher,
            coordinator: UploadCoordinator::new(transport),
            pristine: Arc::new(Mutex::new(PristineTracker::new(initial))),
            upload_url: upload_url.into(),
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        self.store.dispatcher()
    }

    pub fn coordinator(&self) -> &UploadCoordinator {
        &self.coordinator
    }

    pub fn snapshot(&self) -> Arc<RegistryState> {
        self.dispatcher.snapshot()
    }

    pub async fn settle(&self) -> Result<Arc<RegistryState>, FileManagerError> {
        self.dispatcher.settle().await
    }

    pub async fn wait_until(
        &self,
        predicate: impl FnMut(&RegistryState) -> bool,
    ) -> Result<Arc<RegistryState>, FileManagerError> {
        self.dispatcher.wait_until(predicate).await
    }

    fn category(&self, category_id: CategoryId) -> Result<FileType, FileManagerError> {
        self.snapshot()
            .file_type(category_id)
            .cloned()
            .ok_or(FileManagerError::UnknownCategory(category_id))
    }

    /// Handles files dropped on (or picked for) a category and waits until
    /// the registry reflects the outcome.
    pub async fn drop_files(
        &self,
        category_id: CategoryId,
        files: Vec<PendingFile>,
    ) -> Result<DropOutcome, FileManagerError> {
        let dropzone = CategoryDropzone::new(self.category(category_id)?)?;
        let outcome = dropzone
            .drop_files(files, &self.coordinator, &self.upload_url, &self.dispatcher)
            .await;
        self.settle().await?;
        Ok(outcome)
    }

    /// Removes a file from its category. Files uploaded during this session
    /// are also deleted from the server. Returns the removed entry stamped
    /// as deleted.
    pub async fn remove_file(
        &self,
        category_id: CategoryId,
        uuid: FileUuid,
    ) -> Result<FileEntry, FileManagerError> {
        let mut entry = self
            .category(category_id)?
            .file(uuid)
            .cloned()
            .ok_or(FileManagerError::UnknownFile { category_id, uuid })?;

        self.dispatcher
            .dispatch(Action::Removed { category_id, uuid });
        if entry.is_unsaved() {
            self.coordinator.delete_file(uuid).await;
        }
        self.settle().await?;

        info!(%category_id, %uuid, "file removed");
        entry.state = Some(FileState::Deleted);
        Ok(entry)
    }

    pub fn dismiss_invalid(&self, category_id: CategoryId) {
        self.dispatcher
            .dispatch(Action::DismissInvalid { category_id });
    }

    /// Feeds the form's pristine flag. Returns whether the registry was reset.
    pub async fn set_pristine(&self, pristine: bool) -> Result<bool, FileManagerError> {
        let reset = self
            .pristine
            .lock()
            .await
            .set_pristine(pristine, &self.coordinator, &self.dispatcher)
            .await?;
        self.settle().await?;
        Ok(reset)
    }

    pub fn field_value(&self) -> FieldValue {
        form::field_value(&self.snapshot())
    }

    pub fn is_uploading(&self) -> bool {
        form::is_uploading(&self.snapshot())
    }

    pub fn validation_error(&self) -> Option<String> {
        form::validation_error(&self.snapshot())
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
