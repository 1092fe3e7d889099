//! CloudFS Error Types

use std::fmt;

use thiserror::Error;

use crate::vfs::OperationReport;

/// Result type alias for CloudFS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure category reported by the object store adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Key (or bucket) does not exist
    NotFound,
    /// Call exceeded its deadline
    Timeout,
    /// Credentials rejected by the store
    AccessDenied,
    /// Connection, TLS or protocol failure
    Transport,
    /// Store answered with an unexpected HTTP status
    Service(u16),
}

impl StoreErrorKind {
    /// Classify an HTTP status returned by an S3-compatible endpoint
    pub fn from_status(status: u16) -> Self {
        match status {
            404 => StoreErrorKind::NotFound,
            401 | 403 => StoreErrorKind::AccessDenied,
            408 => StoreErrorKind::Timeout,
            s => StoreErrorKind::Service(s),
        }
    }
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreErrorKind::NotFound => write!(f, "not found"),
            StoreErrorKind::Timeout => write!(f, "timeout"),
            StoreErrorKind::AccessDenied => write!(f, "access denied"),
            StoreErrorKind::Transport => write!(f, "transport"),
            StoreErrorKind::Service(status) => write!(f, "status {}", status),
        }
    }
}

/// Stable outward error category, for the API layer to map onto its transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidPath,
    InvalidRequest,
    ResourceNotFound,
    DirectoryNotFound,
    ResourceAlreadyExists,
    DirectoryAlreadyExists,
    FileService,
    PartialFailure,
    ObjectStore,
    Internal,
}

/// CloudFS error types
#[derive(Error, Debug)]
pub enum Error {
    // Input errors
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Filesystem errors
    #[error("Resource {0} not found")]
    ResourceNotFound(String),

    #[error("Directory {0} not found")]
    DirectoryNotFound(String),

    #[error("Resource {0} already exists")]
    ResourceAlreadyExists(String),

    #[error("Directory {0} already exists")]
    DirectoryAlreadyExists(String),

    #[error("File service error: {0}")]
    FileService(String),

    #[error("{0}")]
    PartialFailure(OperationReport),

    // Object store errors
    #[error("Object store error ({kind}): {message}")]
    ObjectStore { kind: StoreErrorKind, message: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Configuration serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(String),
}

impl Error {
    /// Build an object store error
    pub fn store(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Error::ObjectStore {
            kind,
            message: message.into(),
        }
    }

    /// Check if this is the store's "no such key" failure
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::ObjectStore {
                kind: StoreErrorKind::NotFound,
                ..
            }
        )
    }

    /// Outward category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidPath(_) => ErrorKind::InvalidPath,
            Error::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Error::ResourceNotFound(_) => ErrorKind::ResourceNotFound,
            Error::DirectoryNotFound(_) => ErrorKind::DirectoryNotFound,
            Error::ResourceAlreadyExists(_) => ErrorKind::ResourceAlreadyExists,
            Error::DirectoryAlreadyExists(_) => ErrorKind::DirectoryAlreadyExists,
            Error::FileService(_) => ErrorKind::FileService,
            Error::PartialFailure(_) => ErrorKind::PartialFailure,
            Error::ObjectStore { .. } => ErrorKind::ObjectStore,
            Error::Config(_)
            | Error::ConfigParse(_)
            | Error::ConfigSerialize(_)
            | Error::Io(_)
            | Error::Archive(_) => ErrorKind::Internal,
        }
    }

    /// HTTP-style status code for the API layer
    pub fn status_code(&self) -> u16 {
        match self {
            Error::InvalidPath(_) | Error::InvalidRequest(_) => 400,
            Error::ResourceNotFound(_) | Error::DirectoryNotFound(_) => 404,
            Error::ResourceAlreadyExists(_)
            | Error::DirectoryAlreadyExists(_)
            | Error::FileService(_) => 409,
            Error::ObjectStore {
                kind: StoreErrorKind::Timeout,
                ..
            } => 504,
            _ => 500,
        }
    }

    /// Check if retrying the same call may succeed.
    /// Tree operations are idempotent per key, so a partial failure can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ObjectStore {
                kind: StoreErrorKind::Timeout | StoreErrorKind::Transport,
                ..
            } | Error::PartialFailure(_)
        )
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(e: zip::result::ZipError) -> Self {
        Error::Archive(e.to_string())
    }
}
