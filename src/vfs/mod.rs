//! Virtual filesystem over the object store
//!
//! Directories are not stored nodes. A directory exists when at least one
//! key lives under its prefix; empty directories are kept alive by a
//! zero-length marker object at the directory key.

mod archive;
mod manager;
mod report;

use serde::{Deserialize, Serialize};

pub use manager::VfsManager;
pub use report::OperationReport;

/// Kind of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceKind {
    File,
    Directory,
}

/// A file or directory as seen through the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resource {
    /// Full storage key; directory keys end with `/`
    pub key: String,
    pub kind: ResourceKind,
    /// Object size, always 0 for directories
    pub size: u64,
}

impl Resource {
    pub fn file(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            kind: ResourceKind::File,
            size,
        }
    }

    pub fn directory(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: ResourceKind::Directory,
            size: 0,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind == ResourceKind::Directory
    }
}
