//! CloudFS - Per-user virtual filesystem over an S3-compatible object store
//!
//! Each user owns a key namespace (`user-<id>-files`) inside one shared
//! bucket. Keys under the namespace are presented as a directory tree:
//! directories are key prefixes, and empty directories are kept visible by
//! zero-length marker objects.
//!
//! # Architecture
//!
//! - [`keys`]: logical path validation and path <-> key mapping
//! - [`store`]: thin object store adapter (S3 and in-memory backends)
//! - [`vfs`]: tree operations over the flat key space
//! - [`service`]: business rules and the error taxonomy for the API layer
//!
//! # Features
//!
//! - Recursive delete, copy and move with per-key outcome reports
//! - Directory downloads as zip archives, streamed object by object
//! - Case-insensitive name search across a user's files
//! - Per-call deadlines on every object store request

pub mod config;
pub mod error;
pub mod keys;
pub mod service;
pub mod store;
pub mod vfs;

pub use config::CloudFsConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::CloudFsConfig;
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::keys::{KeyTranslator, Namespace};
    pub use crate::service::{
        DownloadResponse, ResourceResponse, ResourceService, UploadFile, UserIdentity,
    };
    pub use crate::store::{MemoryObjectStore, ObjectStore, S3ObjectStore};
    pub use crate::vfs::{OperationReport, Resource, ResourceKind, VfsManager};
}
