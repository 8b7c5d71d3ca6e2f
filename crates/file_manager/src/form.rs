//! Bridge between the registry and the surrounding form.
//!
//! The derived values here are pure functions of [`RegistryState`]; nothing
//! about them is stored in the registry itself.

use std::collections::BTreeMap;

use futures::future::join_all;
use serde::Serialize;
use shared::domain::{CategoryId, FileType, FileUuid};
use tracing::info;

use crate::{
    error::FileManagerError,
    registry::{Action, RegistryState},
    store::Dispatcher,
    uploader::UploadCoordinator,
};

pub const UPLOAD_IN_PROGRESS: &str = "Upload in progress";

/// Value presented to the encompassing form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldValue {
    pub files: Vec<FileUuid>,
    pub by_category: BTreeMap<CategoryId, Vec<FileUuid>>,
    pub uploading: bool,
    pub error: Option<String>,
}

/// The external form-state library.
pub trait FormSink: Send + Sync {
    fn publish(&self, value: FieldValue);
}

pub fn file_uuids(state: &RegistryState) -> Vec<FileUuid> {
    state.files().map(|file| file.uuid).collect()
}

pub fn value_by_category(state: &RegistryState) -> BTreeMap<CategoryId, Vec<FileUuid>> {
    state
        .file_types()
        .iter()
        .map(|ft| (ft.id, ft.files.iter().map(|file| file.uuid).collect()))
        .collect()
}

pub fn is_uploading(state: &RegistryState) -> bool {
    state.uploads().any(|upload| upload.is_active())
}

pub fn validation_error(state: &RegistryState) -> Option<String> {
    if is_uploading(state) {
        return Some(UPLOAD_IN_PROGRESS.to_string());
    }
    let pending: Vec<&str> = state
        .file_types()
        .iter()
        .filter(|ft| !ft.invalid_files.is_empty())
        .map(|ft| ft.name.as_str())
        .collect();
    if pending.is_empty() {
        None
    } else {
        Some(format!(
            "Some files do not match the required filename ({})",
            pending.join(", ")
        ))
    }
}

pub fn field_value(state: &RegistryState) -> FieldValue {
    FieldValue {
        files: file_uuids(state),
        by_category: value_by_category(state),
        uploading: is_uploading(state),
        error: validation_error(state),
    }
}

/// Publishes the derived value when the registry is dirty. Returns whether
/// anything was published; the caller clears the dirty flag right after.
pub(crate) fn propagate(state: &RegistryState, sink: &dyn FormSink) -> bool {
    if !state.is_dirty() {
        return false;
    }
    sink.publish(field_value(state));
    true
}

/// Tracks the form's pristine flag and restores the initial value when the
/// form returns to pristine.
pub struct PristineTracker {
    initial: Vec<FileType>,
    pristine: bool,
}

impl PristineTracker {
    pub fn new(initial: Vec<FileType>) -> Self {
        Self {
            initial,
            pristine: true,
        }
    }

    pub fn initial(&self) -> &[FileType] {
        &self.initial
    }

    pub fn is_pristine(&self) -> bool {
        self.pristine
    }

    /// On a false -> true transition, resets the registry and deletes every
    /// file uploaded during this session from the server. Returns whether a
    /// reset was issued.
    ///
    /// The unsaved files are read from the state the reset replaced, so an
    /// upload recorded just before the reset is still deleted, and one
    /// finishing after it is discarded by the coordinator.
    pub async fn set_pristine(
        &mut self,
        pristine: bool,
        coordinator: &UploadCoordinator,
        dispatch: &Dispatcher,
    ) -> Result<bool, FileManagerError> {
        let became_pristine = pristine && !self.pristine;
        self.pristine = pristine;
        if !became_pristine {
            return Ok(false);
        }

        let reset = dispatch
            .apply(None, Action::Reset(self.initial.clone()))
            .await?;
        let unsaved: Vec<FileUuid> = reset
            .previous
            .files()
            .filter(|file| file.is_unsaved())
            .map(|file| file.uuid)
            .collect();
        info!(count = unsaved.len(), "form reset; discarding unsaved uploads");
        join_all(unsaved.into_iter().map(|uuid| coordinator.delete_file(uuid))).await;
        Ok(true)
    }
}

#[cfg(test)]
#[path = "tests/form_tests.rs"]
mod tests;
