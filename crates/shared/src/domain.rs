use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident, $inner:ty) => {
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

id_newtype!(CategoryId, i64);
id_newtype!(UploadId, u64);
id_newtype!(FileUuid, Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Added,
    Modified,
    Deleted,
}

/// A file attached to a category.
///
/// `state` is `None` for files that came with the form's initial value, i.e.
/// files the server already stores as part of a saved record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub uuid: FileUuid,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<FileState>,
    #[serde(default)]
    pub category_id: CategoryId,
}

impl FileEntry {
    /// Uploaded during this editing session and not yet saved with the form.
    pub fn is_unsaved(&self) -> bool {
        matches!(self.state, Some(FileState::Added | FileState::Modified))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileType {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub filename_template: Option<String>,
    #[serde(default)]
    pub allow_multiple_files: bool,
    #[serde(default)]
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub invalid_files: Vec<String>,
}

impl FileType {
    pub fn new(id: CategoryId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            extensions: Vec::new(),
            filename_template: None,
            allow_multiple_files: false,
            files: Vec::new(),
            invalid_files: Vec::new(),
        }
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.filename_template = Some(template.into());
        self
    }

    pub fn allow_multiple(mut self, allow: bool) -> Self {
        self.allow_multiple_files = allow;
        self
    }

    pub fn with_file(mut self, uuid: FileUuid, filename: impl Into<String>) -> Self {
        self.files.push(FileEntry {
            uuid,
            filename: filename.into(),
            state: None,
            category_id: self.id,
        });
        self
    }

    pub fn file(&self, uuid: FileUuid) -> Option<&FileEntry> {
        self.files.iter().find(|file| file.uuid == uuid)
    }
}
