//! Descriptors for how an implementation's files are obtained.
//!
//! A [`RetrievalMethod`] is an [`Archive`], a [`SingleFile`] or a [`Recipe`]
//! composing several steps into one tree. Feeds list methods in order of
//! preference. Kinds added by newer documents parse as `Unknown` and are
//! skipped when fetching.

use serde::{Deserialize, Serialize};

use crate::mime::guess_mime_type;

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(n: &u64) -> bool {
    *n == 0
}

/// An archive to download and extract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Archive {
    /// Download location.
    pub href: String,
    /// Size of the archive proper, excluding `start_offset`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// MIME type; guessed from `href` by [`Archive::normalize`] when absent.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Bytes of stub to skip before the archive data begins.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub start_offset: u64,
    /// Only extract this sub-directory of the archive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract: Option<String>,
    /// Place the extracted files in this sub-directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
}

impl Archive {
    /// Archive at `href` with every optional field unset.
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            size: None,
            mime_type: None,
            start_offset: 0,
            extract: None,
            dest: None,
        }
    }

    /// Expected number of bytes on the wire, when the size is declared.
    pub fn download_size(&self) -> Option<u64> {
        self.size.map(|size| size + self.start_offset)
    }

    /// Fill in derivable fields.
    pub fn normalize(&mut self) {
        if self.mime_type.is_none() {
            self.mime_type = guess_mime_type(&self.href).map(str::to_string);
        }
    }
}

/// A single file placed into the implementation directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SingleFile {
    /// Download location.
    pub href: String,
    /// Declared size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Relative path of the file inside the implementation.
    pub dest: String,
    /// Mark the file executable.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub executable: bool,
}

/// Recipe step deleting a path placed by an earlier step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveStep {
    /// Relative path to delete.
    pub path: String,
}

/// Recipe step moving a path placed by an earlier step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameStep {
    /// Relative path to move.
    pub source: String,
    /// Relative destination path.
    pub destination: String,
}

/// One step of a [`Recipe`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RecipeStep {
    /// Extract an archive into the tree.
    Archive(Archive),
    /// Add a single file to the tree.
    SingleFile(SingleFile),
    /// Delete a path from the tree.
    Remove(RemoveStep),
    /// Move a path within the tree.
    Rename(RenameStep),
    /// A step kind this build does not understand.
    #[serde(other)]
    Unknown,
}

/// Ordered steps applied to one accumulating directory tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    /// Steps in application order.
    #[serde(default)]
    pub steps: Vec<RecipeStep>,
}

/// A way of obtaining an implementation's directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RetrievalMethod {
    /// Download and extract one archive.
    Archive(Archive),
    /// Download one file.
    SingleFile(SingleFile),
    /// Apply several steps in order.
    Recipe(Recipe),
    /// A retrieval kind this build does not understand.
    #[serde(other)]
    Unknown,
}

impl RetrievalMethod {
    /// Fill in derivable fields, recursing into recipe steps.
    pub fn normalize(&mut self) {
        match self {
            Self::Archive(archive) => archive.normalize(),
            Self::SingleFile(_) | Self::Unknown => {}
            Self::Recipe(recipe) => {
                for step in &mut recipe.steps {
                    if let RecipeStep::Archive(archive) = step {
                        archive.normalize();
                    }
                }
            }
        }
    }

    /// Whether this build knows how to carry out every part of the method.
    pub fn is_supported(&self) -> bool {
        match self {
            Self::Archive(_) | Self::SingleFile(_) => true,
            Self::Recipe(recipe) => !recipe.steps.contains(&RecipeStep::Unknown),
            Self::Unknown => false,
        }
    }
}
