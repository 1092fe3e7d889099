//! Object store adapter
//!
//! A thin client over a flat key/value object store: head, put, delete,
//! paginated prefix listing, copy and streaming get. No business logic and
//! no retries live here; every failure surfaces as `Error::ObjectStore`.

mod listing;
pub mod memory;
pub mod s3;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use futures::TryStreamExt;
use serde::Serialize;
use tracing::error;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::{Error, Result, StoreErrorKind};

pub use listing::list_all;
pub use memory::{MemoryObjectStore, StoreOp};
pub use self::s3::S3ObjectStore;

/// Content type of directory marker objects
pub const DIRECTORY_CONTENT_TYPE: &str = "application/x-directory";

/// Content type used when the uploader did not send one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Delimiter grouping keys into directory levels
pub const DELIMITER: &str = "/";

/// Result of a head request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    pub size: u64,
    pub content_type: Option<String>,
}

/// One object returned by a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
}

/// One page of a listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Immediate sub-directories (only when a delimiter was given)
    pub common_prefixes: Vec<String>,
    /// Objects, including the prefix object itself if it exists
    pub objects: Vec<ObjectSummary>,
    /// Token for the next page, `None` on the last page
    pub next_token: Option<String>,
}

/// Parameters of a single list call
#[derive(Debug, Clone)]
pub struct ListRequest {
    pub prefix: String,
    pub delimiter: Option<String>,
    pub max_keys: Option<usize>,
    pub continuation_token: Option<String>,
}

impl ListRequest {
    /// One directory level under `prefix`
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            delimiter: Some(DELIMITER.to_string()),
            max_keys: None,
            continuation_token: None,
        }
    }

    /// Every key under the prefix, without delimiter grouping
    pub fn recursive(mut self) -> Self {
        self.delimiter = None;
        self
    }

    pub fn max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = Some(max_keys);
        self
    }

    pub fn continue_from(mut self, token: Option<String>) -> Self {
        self.continuation_token = token;
        self
    }
}

/// A key that could not be processed, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyFailure {
    pub key: String,
    pub error: String,
}

/// Outcome of a batch delete
#[derive(Debug, Clone, Default)]
pub struct BatchDelete {
    pub deleted: Vec<String>,
    pub failed: Vec<KeyFailure>,
}

/// Object body as a stream of chunks
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Object store primitives
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Size and content type of an object; `NotFound` if absent
    async fn head(&self, key: &str) -> Result<ObjectHead>;

    /// Store an object, replacing any previous value
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<()>;

    /// Store a zero-length directory marker
    async fn put_empty(&self, key: &str) -> Result<()> {
        self.put(key, Bytes::new(), DIRECTORY_CONTENT_TYPE).await
    }

    /// Delete one object; deleting a missing key succeeds
    async fn delete(&self, key: &str) -> Result<()>;

    /// Best-effort delete of many keys, failures reported per key
    async fn delete_batch(&self, keys: &[String]) -> BatchDelete {
        let mut outcome = BatchDelete::default();
        for key in keys {
            match self.delete(key).await {
                Ok(()) => outcome.deleted.push(key.clone()),
                Err(e) => {
                    error!("Failed to delete {}: {}", key, e);
                    outcome.failed.push(KeyFailure {
                        key: key.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        outcome
    }

    /// One page of a prefix listing
    async fn list(&self, request: ListRequest) -> Result<ListPage>;

    /// Server-side copy within the bucket
    async fn copy(&self, from: &str, to: &str) -> Result<()>;

    /// Object body as a chunk stream
    async fn get(&self, key: &str) -> Result<ByteStream>;
}

/// Read a whole object body into memory
pub async fn read_all(stream: ByteStream) -> Result<Bytes> {
    let chunks: Vec<Bytes> = stream.try_collect().await?;
    if chunks.len() == 1 {
        return Ok(chunks.into_iter().next().unwrap_or_default());
    }
    Ok(Bytes::from(chunks.concat()))
}

/// Run one store call under a deadline
pub async fn with_deadline<T, F>(deadline: Duration, operation: &str, key: &str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::store(
            StoreErrorKind::Timeout,
            format!("{} {} exceeded {:?}", operation, key, deadline),
        )),
    }
}

/// Bound every chunk of a body stream by `deadline`.
///
/// A stalled chunk yields one `Timeout` error and ends the stream.
pub fn with_chunk_deadline(body: ByteStream, deadline: Duration, key: &str) -> ByteStream {
    let key = key.to_string();
    stream::unfold(Some(body), move |state| {
        let key = key.clone();
        async move {
            let mut body = state?;
            match tokio::time::timeout(deadline, body.next()).await {
                Ok(Some(chunk)) => Some((chunk, Some(body))),
                Ok(None) => None,
                Err(_) => {
                    let timeout = Error::store(
                        StoreErrorKind::Timeout,
                        format!("get {} body stalled for {:?}", key, deadline),
                    );
                    Some((Err(timeout), None))
                }
            }
        }
    })
    .boxed()
}

/// Open the store selected by configuration
pub fn connect(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    match config.backend {
        StorageBackend::S3 => Ok(Arc::new(S3ObjectStore::new(config)?)),
        StorageBackend::Memory => Ok(Arc::new(MemoryObjectStore::new())),
    }
}
