//! Records exchanged with the API layer

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::keys::{name_of, parent_path_of};
use crate::vfs::{Resource, ResourceKind};

/// Authenticated caller, as supplied by the authentication layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: u64,
    pub username: String,
}

impl UserIdentity {
    pub fn new(id: u64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }
}

/// One uploaded file
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// Original file name, a single path segment
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            data: data.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Resource as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceResponse {
    /// Logical path of the containing directory
    pub path: String,
    /// Final segment, without a trailing slash
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: ResourceKind,
}

impl ResourceResponse {
    pub fn from_resource(resource: &Resource) -> Self {
        Self {
            path: parent_path_of(&resource.key),
            name: name_of(&resource.key),
            size: resource.size,
            kind: resource.kind,
        }
    }
}

impl From<&Resource> for ResourceResponse {
    fn from(resource: &Resource) -> Self {
        Self::from_resource(resource)
    }
}

/// Bytes handed back for a download
#[derive(Debug, Clone)]
pub struct DownloadResponse {
    /// Suggested file name (`.zip` for directories)
    pub filename: String,
    pub kind: ResourceKind,
    pub content_type: String,
    pub data: Bytes,
}
