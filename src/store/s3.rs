//! S3-compatible object store backend
//!
//! Wraps a `rust-s3` bucket handle. Every call runs under the configured
//! deadline. Non-2xx responses are mapped to `StoreErrorKind` by status.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{StreamExt, TryStreamExt};
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, Region};
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::error::{Error, Result, StoreErrorKind};
use super::{with_chunk_deadline, with_deadline, ByteStream, ListPage, ListRequest, ObjectHead, ObjectStore, ObjectSummary};

/// Object store backed by an S3-compatible bucket
pub struct S3ObjectStore {
    bucket: Box<Bucket>,
    deadline: Duration,
}

impl S3ObjectStore {
    /// Connect to the bucket described by `config`
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
        };

        let credentials = match (&config.access_key, &config.secret_key) {
            (Some(access), Some(secret)) => {
                Credentials::new(Some(access.as_str()), Some(secret.as_str()), None, None, None)
            }
            _ => Credentials::anonymous(),
        }
        .map_err(|e| Error::Config(format!("invalid storage credentials: {}", e)))?;

        let bucket = Bucket::new(&config.bucket, region, credentials).map_err(map_s3_error)?;
        let bucket = if config.path_style {
            bucket.with_path_style()
        } else {
            bucket
        };

        info!(
            "Using S3 bucket '{}' at {} (timeout {:?})",
            config.bucket,
            config.endpoint,
            config.request_timeout()
        );

        Ok(Self {
            bucket,
            deadline: config.request_timeout(),
        })
    }
}

/// Map a rust-s3 error onto the adapter's error kinds
fn map_s3_error(e: S3Error) -> Error {
    match e {
        S3Error::HttpFailWithBody(status, body) => Error::store(
            StoreErrorKind::from_status(status),
            format!("HTTP {}: {}", status, body),
        ),
        other => Error::store(StoreErrorKind::Transport, other.to_string()),
    }
}

/// Reject non-2xx responses (the client does not fail on them by itself)
fn check_status(status: u16, operation: &str, key: &str) -> Result<()> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(Error::store(
            StoreErrorKind::from_status(status),
            format!("{} {} returned HTTP {}", operation, key, status),
        ))
    }
}

/// Status check for deletes: a missing key counts as deleted
fn check_delete_status(status: u16, key: &str) -> Result<()> {
    match status {
        404 => Ok(()),
        status => check_status(status, "delete", key),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn head(&self, key: &str) -> Result<ObjectHead> {
        with_deadline(self.deadline, "head", key, async {
            let (head, status) = self.bucket.head_object(key).await.map_err(map_s3_error)?;
            check_status(status, "head", key)?;
            Ok(ObjectHead {
                size: head.content_length.unwrap_or(0).max(0) as u64,
                content_type: head.content_type,
            })
        })
        .await
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<()> {
        with_deadline(self.deadline, "put", key, async {
            let response = self
                .bucket
                .put_object_with_content_type(key, &data, content_type)
                .await
                .map_err(map_s3_error)?;
            check_status(response.status_code(), "put", key)?;
            debug!("s3 put {} ({} bytes)", key, data.len());
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        with_deadline(self.deadline, "delete", key, async {
            let response = self.bucket.delete_object(key).await.map_err(map_s3_error)?;
            check_delete_status(response.status_code(), key)
        })
        .await
    }

    async fn list(&self, request: ListRequest) -> Result<ListPage> {
        let prefix = request.prefix.clone();
        with_deadline(self.deadline, "list", &prefix, async {
            let (result, status) = self
                .bucket
                .list_page(
                    request.prefix,
                    request.delimiter,
                    request.continuation_token,
                    None,
                    request.max_keys,
                )
                .await
                .map_err(map_s3_error)?;
            check_status(status, "list", &prefix)?;

            debug!(
                "s3 list {} -> {} objects, truncated={}",
                prefix,
                result.contents.len(),
                result.is_truncated
            );

            Ok(ListPage {
                common_prefixes: result
                    .common_prefixes
                    .unwrap_or_default()
                    .into_iter()
                    .map(|p| p.prefix)
                    .collect(),
                objects: result
                    .contents
                    .into_iter()
                    .map(|o| ObjectSummary {
                        key: o.key,
                        size: o.size,
                    })
                    .collect(),
                next_token: if result.is_truncated {
                    result.next_continuation_token
                } else {
                    None
                },
            })
        })
        .await
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        with_deadline(self.deadline, "copy", from, async {
            let status = self
                .bucket
                .copy_object_internal(from, to)
                .await
                .map_err(map_s3_error)?;
            check_status(status, "copy", from)
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<ByteStream> {
        let response = with_deadline(self.deadline, "get", key, async {
            self.bucket.get_object_stream(key).await.map_err(map_s3_error)
        })
        .await?;
        check_status(response.status_code, "get", key)?;

        // Each body chunk gets its own deadline
        let body = response.bytes.map_err(map_s3_error).boxed();
        Ok(with_chunk_deadline(body, self.deadline, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_status() {
        assert!(check_status(200, "put", "k").is_ok());
        assert!(check_status(204, "put", "k").is_ok());

        let err = check_status(404, "head", "ns/a.txt").unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("head ns/a.txt returned HTTP 404"));

        match check_status(503, "list", "ns/") {
            Err(Error::ObjectStore { kind, .. }) => assert_eq!(kind, StoreErrorKind::Service(503)),
            other => panic!("expected service error, got {:?}", other),
        }
        match check_status(403, "get", "k") {
            Err(Error::ObjectStore { kind, .. }) => assert_eq!(kind, StoreErrorKind::AccessDenied),
            other => panic!("expected access denied, got {:?}", other),
        }
    }

    #[test]
    fn test_delete_of_missing_key_succeeds() {
        assert!(check_delete_status(204, "k").is_ok());
        assert!(check_delete_status(404, "k").is_ok());
        assert!(check_delete_status(500, "k").is_err());
        assert!(!check_delete_status(403, "k").unwrap_err().is_not_found());
    }

    #[test]
    fn test_map_s3_error() {
        let err = map_s3_error(S3Error::HttpFailWithBody(404, "NoSuchKey".into()));
        assert!(err.is_not_found());
        assert!(err.to_string().contains("NoSuchKey"));

        let err = map_s3_error(S3Error::HttpFailWithBody(408, String::new()));
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), 504);

        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        match map_s3_error(S3Error::from(reset)) {
            Error::ObjectStore { kind, .. } => assert_eq!(kind, StoreErrorKind::Transport),
            other => panic!("expected transport error, got {:?}", other),
        }
    }
}
