//! Per-category drop handling: extension and filename-template filtering,
//! then add or replace uploads through the coordinator.

use glob::{MatchOptions, Pattern};
use shared::{domain::FileType, protocol::UploadedFile};
use tracing::debug;

use crate::{
    error::FileManagerError,
    registry::Action,
    store::Dispatcher,
    uploader::{MarkAction, PendingFile, UploadCoordinator},
};

const TEMPLATE_MATCH: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
pub struct FilenameFilter {
    extensions: Vec<String>,
    template: Option<Pattern>,
}

impl FilenameFilter {
    pub fn for_category(file_type: &FileType) -> Result<Self, FileManagerError> {
        let template = file_type
            .filename_template
            .as_deref()
            .map(|raw| {
                Pattern::new(raw).map_err(|err| FileManagerError::InvalidTemplate {
                    category_id: file_type.id,
                    template: raw.to_string(),
                    message: err.msg.to_string(),
                })
            })
            .transpose()?;
        let extensions = file_type
            .extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Ok(Self {
            extensions,
            template,
        })
    }

    /// An empty extension list accepts everything.
    pub fn extension_allowed(&self, filename: &str) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        let lower = filename.to_ascii_lowercase();
        self.extensions.iter().any(|ext| {
            lower
                .strip_suffix(ext.as_str())
                .is_some_and(|stem| stem.len() > 1 && stem.ends_with('.'))
        })
    }

    pub fn template_matches(&self, filename: &str) -> bool {
        self.template
            .as_ref()
            .map_or(true, |pattern| pattern.matches_with(filename, TEMPLATE_MATCH))
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Partition {
    pub accepted: Vec<PendingFile>,
    /// Names failing the filename template.
    pub invalid: Vec<String>,
    /// Names refused before any template check (extension, or surplus files
    /// dropped on a single-file category).
    pub rejected: Vec<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DropOutcome {
    pub results: Vec<Option<UploadedFile>>,
    pub invalid: Vec<String>,
    pub rejected: Vec<String>,
}

pub struct CategoryDropzone {
    file_type: FileType,
    filter: FilenameFilter,
}

impl CategoryDropzone {
    /// Builds the view over a snapshot of the category.
    pub fn new(file_type: FileType) -> Result<Self, FileManagerError> {
        let filter = FilenameFilter::for_category(&file_type)?;
        Ok(Self { file_type, filter })
    }

    pub fn file_type(&self) -> &FileType {
        &self.file_type
    }

    pub fn partition(&self, files: Vec<PendingFile>) -> Partition {
        let mut partition = Partition::default();
        for file in files {
            if !self.filter.extension_allowed(&file.filename) {
                partition.rejected.push(file.filename);
            } else if !self.filter.template_matches(&file.filename) {
                partition.invalid.push(file.filename);
            } else if !self.file_type.allow_multiple_files && !partition.accepted.is_empty() {
                partition.rejected.push(file.filename);
            } else {
                partition.accepted.push(file);
            }
        }
        partition
    }

    pub async fn drop_files(
        &self,
        files: Vec<PendingFile>,
        coordinator: &UploadCoordinator,
        upload_url: &str,
        dispatch: &Dispatcher,
    ) -> DropOutcome {
        let category_id = self.file_type.id;
        let Partition {
            accepted,
            invalid,
            rejected,
        } = self.partition(files);

        for filename in &invalid {
            dispatch.dispatch(Action::InvalidTemplate {
                category_id,
                filename: filename.clone(),
            });
        }
        if !rejected.is_empty() {
            debug!(%category_id, ?rejected, "files rejected by category rules");
        }

        let existing = if self.file_type.allow_multiple_files {
            None
        } else {
            self.file_type.files.first().cloned()
        };

        let results = if accepted.is_empty() {
            Vec::new()
        } else if let Some(existing) = existing {
            let results = coordinator
                .upload_files(
                    MarkAction::Modified {
                        replaced: existing.uuid,
                    },
                    category_id,
                    accepted,
                    upload_url,
                    dispatch,
                )
                .await;
            let replaced = results.first().is_some_and(Option::is_some);
            if replaced && existing.is_unsaved() {
                coordinator.delete_file(existing.uuid).await;
            }
            results
        } else {
            coordinator
                .upload_files(MarkAction::Uploaded, category_id, accepted, upload_url, dispatch)
                .await
        };

        DropOutcome {
            results,
            invalid,
            rejected,
        }
    }
}

#[cfg(test)]
#[path = "tests/dropzone_tests.rs"]
mod tests;
