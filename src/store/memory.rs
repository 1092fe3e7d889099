//! In-memory object store
//!
//! Emulates S3 ListObjectsV2 semantics (prefix, delimiter grouping,
//! max-keys and continuation tokens) over a sorted map. Used for tests and
//! for the `memory` backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use tracing::debug;

use crate::error::{Error, Result, StoreErrorKind};
use super::{ByteStream, ListPage, ListRequest, ObjectHead, ObjectStore, ObjectSummary};

/// Default page size, same as S3
const DEFAULT_MAX_KEYS: usize = 1000;

/// Body chunk size returned by `get`
const CHUNK_SIZE: usize = 64 * 1024;

/// Store operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Head,
    Put,
    Delete,
    List,
    Copy,
    Get,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
}

/// Listing entry, either an object or a grouped common prefix
enum Entry {
    Object(ObjectSummary),
    Prefix(String),
}

impl Entry {
    fn marker(&self) -> &str {
        match self {
            Entry::Object(o) => &o.key,
            Entry::Prefix(p) => p,
        }
    }
}

/// Object store kept in process memory
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    faults: RwLock<HashMap<(StoreOp, String), StoreErrorKind>>,
}

impl MemoryObjectStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `op` on `key` fail with a transport error
    pub fn fail_on(&self, op: StoreOp, key: impl Into<String>) {
        self.fail_on_with(op, key, StoreErrorKind::Transport);
    }

    /// Make every `op` on `key` fail with an error of the given kind
    pub fn fail_on_with(&self, op: StoreOp, key: impl Into<String>, kind: StoreErrorKind) {
        self.faults
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((op, key.into()), kind);
    }

    /// Remove all injected failures
    pub fn clear_faults(&self) {
        self.faults
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// All stored keys, sorted
    pub fn keys(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_fault(&self, op: StoreOp, key: &str) -> Result<()> {
        let faults = self.faults.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(kind) = faults.get(&(op, key.to_string())) {
            return Err(Error::store(
                *kind,
                format!("injected {:?} failure for {}", op, key),
            ));
        }
        Ok(())
    }

    fn list_page(&self, request: &ListRequest) -> ListPage {
        let max_keys = request.max_keys.unwrap_or(DEFAULT_MAX_KEYS);
        let prefix = request.prefix.as_str();
        let token = request.continuation_token.as_deref();

        let objects = self.read();
        let mut entries: Vec<Entry> = Vec::new();
        let mut last_prefix: Option<String> = None;
        let mut truncated = false;

        for (key, object) in objects.range(prefix.to_string()..) {
            if !key.starts_with(prefix) {
                break;
            }

            // Group keys sharing a delimiter-terminated segment
            let entry = match request.delimiter.as_deref() {
                Some(delimiter) if !delimiter.is_empty() => {
                    let rest = &key[prefix.len()..];
                    match rest.find(delimiter) {
                        Some(pos) => Entry::Prefix(format!(
                            "{}{}{}",
                            prefix,
                            &rest[..pos],
                            delimiter
                        )),
                        None => Entry::Object(summary(key, object)),
                    }
                }
                _ => Entry::Object(summary(key, object)),
            };

            if let Entry::Prefix(p) = &entry {
                if last_prefix.as_deref() == Some(p.as_str()) {
                    continue;
                }
                last_prefix = Some(p.clone());
            }

            if let Some(token) = token {
                if entry.marker() <= token {
                    continue;
                }
            }

            if entries.len() == max_keys {
                truncated = true;
                break;
            }
            entries.push(entry);
        }

        let next_token = if truncated {
            entries.last().map(|e| e.marker().to_string())
        } else {
            None
        };

        let mut page = ListPage {
            next_token,
            ..ListPage::default()
        };
        for entry in entries {
            match entry {
                Entry::Object(o) => page.objects.push(o),
                Entry::Prefix(p) => page.common_prefixes.push(p),
            }
        }
        page
    }
}

fn summary(key: &str, object: &StoredObject) -> ObjectSummary {
    ObjectSummary {
        key: key.to_string(),
        size: object.data.len() as u64,
    }
}

fn no_such_key(key: &str) -> Error {
    Error::store(StoreErrorKind::NotFound, format!("no such key: {}", key))
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn head(&self, key: &str) -> Result<ObjectHead> {
        self.check_fault(StoreOp::Head, key)?;
        self.read()
            .get(key)
            .map(|o| ObjectHead {
                size: o.data.len() as u64,
                content_type: Some(o.content_type.clone()),
            })
            .ok_or_else(|| no_such_key(key))
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<()> {
        self.check_fault(StoreOp::Put, key)?;
        debug!("memory put {} ({} bytes)", key, data.len());
        self.write().insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check_fault(StoreOp::Delete, key)?;
        self.write().remove(key);
        Ok(())
    }

    async fn list(&self, request: ListRequest) -> Result<ListPage> {
        self.check_fault(StoreOp::List, &request.prefix)?;
        Ok(self.list_page(&request))
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        self.check_fault(StoreOp::Copy, from)?;
        let mut objects = self.write();
        let object = objects.get(from).cloned().ok_or_else(|| no_such_key(from))?;
        objects.insert(to.to_string(), object);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<ByteStream> {
        self.check_fault(StoreOp::Get, key)?;
        let data = self
            .read()
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| no_such_key(key))?;

        let chunks: Vec<Result<Bytes>> = (0..data.len())
            .step_by(CHUNK_SIZE)
            .map(|start| Ok(data.slice(start..(start + CHUNK_SIZE).min(data.len()))))
            .collect();
        Ok(stream::iter(chunks).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::read_all;

    async fn seeded() -> MemoryObjectStore {
        let store = MemoryObjectStore::new();
        for key in ["ns/", "ns/a.txt", "ns/b/", "ns/b/c.txt", "ns/b/d/e.txt", "ns/z.txt"] {
            let data = if key.ends_with('/') { Bytes::new() } else { Bytes::from_static(b"data") };
            store.put(key, data, "text/plain").await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_head_and_missing() {
        let store = seeded().await;
        let head = store.head("ns/a.txt").await.unwrap();
        assert_eq!(head.size, 4);
        assert_eq!(head.content_type.as_deref(), Some("text/plain"));

        let err = store.head("ns/nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_with_delimiter() {
        let store = seeded().await;
        let page = store.list(ListRequest::new("ns/")).await.unwrap();

        let keys: Vec<_> = page.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["ns/", "ns/a.txt", "ns/z.txt"]);
        assert_eq!(page.common_prefixes, vec!["ns/b/".to_string()]);
        assert!(page.next_token.is_none());
    }

    #[tokio::test]
    async fn test_list_recursive() {
        let store = seeded().await;
        let page = store.list(ListRequest::new("ns/b/").recursive()).await.unwrap();
        let keys: Vec<_> = page.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["ns/b/", "ns/b/c.txt", "ns/b/d/e.txt"]);
        assert!(page.common_prefixes.is_empty());
    }

    #[tokio::test]
    async fn test_list_pagination_with_prefixes() {
        let store = seeded().await;

        let first = store.list(ListRequest::new("ns/").max_keys(2)).await.unwrap();
        assert_eq!(first.objects.len(), 2);
        let token = first.next_token.clone();
        assert_eq!(token.as_deref(), Some("ns/a.txt"));

        let second = store
            .list(ListRequest::new("ns/").max_keys(2).continue_from(token))
            .await
            .unwrap();
        assert_eq!(second.common_prefixes, vec!["ns/b/".to_string()]);
        assert_eq!(second.objects[0].key, "ns/z.txt");
        assert!(second.next_token.is_none());
    }

    #[tokio::test]
    async fn test_token_after_common_prefix() {
        let store = seeded().await;
        let page = store
            .list(ListRequest::new("ns/").continue_from(Some("ns/b/".into())))
            .await
            .unwrap();
        assert!(page.common_prefixes.is_empty());
        assert_eq!(page.objects.len(), 1);
        assert_eq!(page.objects[0].key, "ns/z.txt");
    }

    #[tokio::test]
    async fn test_copy_get_delete() {
        let store = seeded().await;
        store.copy("ns/a.txt", "ns/copy.txt").await.unwrap();
        let body = read_all(store.get("ns/copy.txt").await.unwrap()).await.unwrap();
        assert_eq!(&body[..], b"data");

        store.delete("ns/copy.txt").await.unwrap();
        assert!(store.head("ns/copy.txt").await.unwrap_err().is_not_found());

        // Deleting a missing key is not an error
        store.delete("ns/copy.txt").await.unwrap();
        assert!(store.copy("ns/missing", "ns/x").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_large_body_is_chunked() {
        let store = MemoryObjectStore::new();
        let data = Bytes::from(vec![7u8; CHUNK_SIZE * 2 + 10]);
        store.put("ns/big.bin", data.clone(), "application/octet-stream").await.unwrap();

        let chunks: Vec<Result<Bytes>> = store.get("ns/big.bin").await.unwrap().collect().await;
        assert_eq!(chunks.len(), 3);
        let body = read_all(store.get("ns/big.bin").await.unwrap()).await.unwrap();
        assert_eq!(body, data);
    }

    #[tokio::test]
    async fn test_batch_delete_reports_failures() {
        let store = seeded().await;
        store.fail_on(StoreOp::Delete, "ns/b/c.txt");

        let keys = vec!["ns/a.txt".to_string(), "ns/b/c.txt".to_string()];
        let outcome = store.delete_batch(&keys).await;
        assert_eq!(outcome.deleted, vec!["ns/a.txt".to_string()]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].key, "ns/b/c.txt");
    }
}
