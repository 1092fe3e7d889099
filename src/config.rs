//! CloudFS Configuration
//!
//! This module provides configuration structures for the object store
//! connection, the per-user key namespace and operational limits.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Main CloudFS configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CloudFsConfig {
    /// Object store connection
    #[serde(default)]
    pub storage: StorageConfig,

    /// Per-user key namespace
    #[serde(default)]
    pub namespace: NamespaceConfig,

    /// Upload and download limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Object store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Any S3-compatible endpoint (AWS, MinIO, ...)
    S3,
    /// Process-local store, contents are lost on exit
    Memory,
}

/// Object store connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Which backend to use
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,

    /// S3-compatible endpoint URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Region name sent in signatures
    #[serde(default = "default_region")]
    pub region: String,

    /// Bucket holding every user's files
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Access key (anonymous access when unset)
    #[serde(default)]
    pub access_key: Option<String>,

    /// Secret key
    #[serde(default)]
    pub secret_key: Option<String>,

    /// Use path-style addressing (required by most self-hosted stores)
    #[serde(default = "default_path_style")]
    pub path_style: bool,

    /// Deadline for a single object store call in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Page size used when enumerating a whole prefix
    #[serde(default = "default_list_page_size")]
    pub list_page_size: usize,
}

/// Key namespace configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// Namespace template, `{id}` is replaced by the user id
    #[serde(default = "default_template")]
    pub template: String,
}

/// Limits configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Largest accepted upload, per file
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    /// Largest directory archive built in memory
    #[serde(default = "default_max_archive_bytes")]
    pub max_archive_bytes: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_backend() -> StorageBackend {
    StorageBackend::S3
}

fn default_endpoint() -> String {
    "http://127.0.0.1:9000".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_bucket() -> String {
    "user-files".to_string()
}

fn default_path_style() -> bool {
    true
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_list_page_size() -> usize {
    1000
}

fn default_template() -> String {
    "user-{id}-files".to_string()
}

fn default_max_upload_bytes() -> u64 {
    1024 * 1024
}

fn default_max_archive_bytes() -> u64 {
    512 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            endpoint: default_endpoint(),
            region: default_region(),
            bucket: default_bucket(),
            access_key: None,
            secret_key: None,
            path_style: default_path_style(),
            request_timeout_ms: default_request_timeout_ms(),
            list_page_size: default_list_page_size(),
        }
    }
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            template: default_template(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            max_archive_bytes: default_max_archive_bytes(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl StorageConfig {
    /// Per-call deadline
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl CloudFsConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: CloudFsConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.storage.backend == StorageBackend::S3 {
            if self.storage.bucket.is_empty() {
                return Err(Error::Config("storage.bucket is required".into()));
            }
            if self.storage.endpoint.is_empty() {
                return Err(Error::Config("storage.endpoint is required".into()));
            }
        }

        if self.storage.access_key.is_some() != self.storage.secret_key.is_some() {
            return Err(Error::Config(
                "storage.access_key and storage.secret_key must be set together".into(),
            ));
        }

        if self.storage.request_timeout_ms == 0 {
            return Err(Error::Config("storage.request_timeout_ms must be > 0".into()));
        }

        if self.storage.list_page_size == 0 || self.storage.list_page_size > 1000 {
            return Err(Error::Config(
                "storage.list_page_size must be between 1 and 1000".into(),
            ));
        }

        let template = &self.namespace.template;
        if template.matches("{id}").count() != 1 {
            return Err(Error::Config(
                "namespace.template must contain {id} exactly once".into(),
            ));
        }
        if template.contains('/') {
            return Err(Error::Config("namespace.template must not contain '/'".into()));
        }

        Ok(())
    }
}
