//! Registry state and the reducer applying [`Action`]s to it.

use std::collections::BTreeMap;

use shared::domain::{CategoryId, FileEntry, FileState, FileType, FileUuid, UploadId};
use tracing::debug;

/// Registry generation. Bumped on every reset so that uploads started before
/// the reset can be recognised when they complete.
pub type Epoch = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub upload_id: UploadId,
    pub category_id: CategoryId,
    pub filename: String,
    pub progress: u8,
    pub failure: Option<String>,
}

impl Upload {
    pub fn is_active(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Reset(Vec<FileType>),
    StartUpload {
        upload_id: UploadId,
        category_id: CategoryId,
        filename: String,
    },
    Progress {
        upload_id: UploadId,
        percent: u8,
    },
    MarkUploaded {
        upload_id: UploadId,
        category_id: CategoryId,
        uuid: FileUuid,
        filename: String,
    },
    MarkModified {
        upload_id: UploadId,
        category_id: CategoryId,
        uuid: FileUuid,
        filename: String,
        replaced: FileUuid,
    },
    UploadFailed {
        upload_id: UploadId,
        reason: String,
    },
    InvalidTemplate {
        category_id: CategoryId,
        filename: String,
    },
    DismissInvalid {
        category_id: CategoryId,
    },
    Removed {
        category_id: CategoryId,
        uuid: FileUuid,
    },
    ClearDirty,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Reset(_) => "reset",
            Action::StartUpload { .. } => "start_upload",
            Action::Progress { .. } => "progress",
            Action::MarkUploaded { .. } => "mark_uploaded",
            Action::MarkModified { .. } => "mark_modified",
            Action::UploadFailed { .. } => "upload_failed",
            Action::InvalidTemplate { .. } => "invalid_template",
            Action::DismissInvalid { .. } => "dismiss_invalid",
            Action::Removed { .. } => "removed",
            Action::ClearDirty => "clear_dirty",
        }
    }

    /// Actions produced by an in-flight upload; these are dropped when they
    /// belong to an earlier registry generation.
    fn is_upload_result(&self) -> bool {
        matches!(
            self,
            Action::StartUpload { .. }
                | Action::Progress { .. }
                | Action::MarkUploaded { .. }
                | Action::MarkModified { .. }
                | Action::UploadFailed { .. }
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistryState {
    file_types: Vec<FileType>,
    uploads: BTreeMap<UploadId, Upload>,
    dirty: bool,
    epoch: Epoch,
}

impl RegistryState {
    pub fn new(file_types: Vec<FileType>) -> Self {
        let mut state = Self::default();
        state.seed(file_types);
        state
    }

    pub fn file_types(&self) -> &[FileType] {
        &self.file_types
    }

    pub fn file_type(&self, category_id: CategoryId) -> Option<&FileType> {
        self.file_types.iter().find(|ft| ft.id == category_id)
    }

    pub fn uploads(&self) -> impl Iterator<Item = &Upload> {
        self.uploads.values()
    }

    pub fn uploads_for(&self, category_id: CategoryId) -> impl Iterator<Item = &Upload> {
        self.uploads
            .values()
            .filter(move |upload| upload.category_id == category_id)
    }

    pub fn upload(&self, upload_id: UploadId) -> Option<&Upload> {
        self.uploads.get(&upload_id)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn files(&self) -> impl Iterator<Item = &FileEntry> {
        self.file_types.iter().flat_map(|ft| ft.files.iter())
    }

    fn contains_uuid(&self, uuid: FileUuid) -> bool {
        self.files().any(|file| file.uuid == uuid)
    }

    fn file_type_mut(&mut self, category_id: CategoryId) -> Option<&mut FileType> {
        self.file_types.iter_mut().find(|ft| ft.id == category_id)
    }

    fn seed(&mut self, file_types: Vec<FileType>) {
        self.file_types = file_types;
        for file_type in &mut self.file_types {
            let owner = file_type.id;
            for file in &mut file_type.files {
                file.category_id = owner;
            }
        }
        self.uploads.clear();
        self.dirty = false;
    }

    /// Applies an action dispatched under `epoch`. Upload results from an
    /// earlier generation are ignored and reported as `false`; `None` means
    /// the action is not tied to any generation.
    pub fn apply_tagged(&mut self, epoch: Option<Epoch>, action: Action) -> bool {
        if let Some(epoch) = epoch {
            if epoch != self.epoch && action.is_upload_result() {
                debug!(
                    action = action.name(),
                    action_epoch = epoch,
                    current_epoch = self.epoch,
                    "ignoring stale upload result"
                );
                return false;
            }
        }
        self.apply(action);
        true
    }

    pub fn apply(&mut self, action: Action) {
        match action {
            Action::Reset(file_types) => {
                self.seed(file_types);
                self.epoch += 1;
            }
            Action::StartUpload {
                upload_id,
                category_id,
                filename,
            } => {
                if self.file_type(category_id).is_none() {
                    debug!(%category_id, "upload started for unknown category");
                    return;
                }
                self.uploads
                    .retain(|_, upload| upload.category_id != category_id || upload.is_active());
                self.uploads.insert(
                    upload_id,
                    Upload {
                        upload_id,
                        category_id,
                        filename,
                        progress: 0,
                        failure: None,
                    },
                );
            }
            Action::Progress { upload_id, percent } => {
                if let Some(upload) = self.uploads.get_mut(&upload_id) {
                    upload.progress = percent.min(100);
                }
            }
            Action::MarkUploaded {
                upload_id,
                category_id,
                uuid,
                filename,
            } => {
                self.uploads.remove(&upload_id);
                if self.contains_uuid(uuid) {
                    debug!(%uuid, "ignoring duplicate upload uuid");
                    return;
                }
                let Some(file_type) = self.file_type_mut(category_id) else {
                    debug!(%category_id, %uuid, "upload completed for unknown category");
                    return;
                };
                if !file_type.allow_multiple_files {
                    file_type.files.clear();
                }
                file_type.files.push(FileEntry {
                    uuid,
                    filename,
                    state: Some(FileState::Added),
                    category_id,
                });
                self.dirty = true;
            }
            Action::MarkModified {
                upload_id,
                category_id,
                uuid,
                filename,
                replaced,
            } => {
                self.uploads.remove(&upload_id);
                if self.contains_uuid(uuid) {
                    debug!(%uuid, "ignoring duplicate upload uuid");
                    return;
                }
                let Some(file_type) = self.file_type_mut(category_id) else {
                    debug!(%category_id, %uuid, "replacement completed for unknown category");
                    return;
                };
                let entry = FileEntry {
                    uuid,
                    filename,
                    state: Some(FileState::Modified),
                    category_id,
                };
                match file_type.files.iter().position(|file| file.uuid == replaced) {
                    Some(index) => file_type.files[index] = entry,
                    None => {
                        if !file_type.allow_multiple_files {
                            file_type.files.clear();
                        }
                        file_type.files.push(entry);
                    }
                }
                self.dirty = true;
            }
            Action::UploadFailed { upload_id, reason } => {
                if let Some(upload) = self.uploads.get_mut(&upload_id) {
                    upload.failure = Some(reason);
                }
            }
            Action::InvalidTemplate {
                category_id,
                filename,
            } => {
                if let Some(file_type) = self.file_type_mut(category_id) {
                    file_type.invalid_files.push(filename);
                }
            }
            Action::DismissInvalid { category_id } => {
                if let Some(file_type) = self.file_type_mut(category_id) {
                    file_type.invalid_files.clear();
                }
            }
            Action::Removed { category_id, uuid } => {
                let Some(file_type) = self.file_type_mut(category_id) else {
                    return;
                };
                let before = file_type.files.len();
                file_type.files.retain(|file| file.uuid != uuid);
                if file_type.files.len() != before {
                    self.dirty = true;
                }
            }
            Action::ClearDirty => {
                self.dirty = false;
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
