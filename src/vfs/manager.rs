//! Tree operations over the flat key space
//!
//! All state lives in the object store. Every method is a short sequence of
//! store calls and no lock is held across them, so concurrent callers on
//! the same subtree are not serialized.

use std::sync::Arc;

use bytes::Bytes;
use futures::TryStreamExt;
use tracing::{debug, error, info, warn};

use crate::config::CloudFsConfig;
use crate::error::{Error, Result};
use crate::keys::{ensure_trailing_slash, is_directory, key_to_path};
use crate::store::{list_all, read_all, ListRequest, ObjectHead, ObjectStore, ObjectSummary};
use super::archive::ArchiveBuilder;
use super::{OperationReport, Resource};

const DEFAULT_PAGE_SIZE: usize = 1000;
const DEFAULT_MAX_ARCHIVE_BYTES: u64 = 512 * 1024 * 1024;

/// Virtual filesystem manager
#[derive(Clone)]
pub struct VfsManager {
    store: Arc<dyn ObjectStore>,
    page_size: usize,
    max_archive_bytes: u64,
}

impl VfsManager {
    /// Create a manager with default limits
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            page_size: DEFAULT_PAGE_SIZE,
            max_archive_bytes: DEFAULT_MAX_ARCHIVE_BYTES,
        }
    }

    /// Create a manager using the configured page size and archive limit
    pub fn from_config(store: Arc<dyn ObjectStore>, config: &CloudFsConfig) -> Self {
        Self::new(store)
            .with_page_size(config.storage.list_page_size)
            .with_max_archive_bytes(config.limits.max_archive_bytes)
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_max_archive_bytes(mut self, max_bytes: u64) -> Self {
        self.max_archive_bytes = max_bytes;
        self
    }

    /// Head an object, mapping "no such key" to `None`
    pub async fn head(&self, key: &str) -> Result<Option<ObjectHead>> {
        match self.store.head(key).await {
            Ok(head) => Ok(Some(head)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// True if an object exists at `key` or `key` is a directory
    pub async fn exists(&self, key: &str) -> Result<bool> {
        if self.head(key).await?.is_some() {
            return Ok(true);
        }
        self.is_directory(key).await
    }

    /// True if at least one key lives under `key/`
    pub async fn is_directory(&self, key: &str) -> Result<bool> {
        let prefix = ensure_trailing_slash(key);
        let page = self
            .store
            .list(ListRequest::new(prefix).recursive().max_keys(1))
            .await?;
        Ok(!page.objects.is_empty())
    }

    /// Resolve a key to a resource.
    ///
    /// A key with a trailing slash only ever resolves to a directory. A key
    /// without one resolves to the file stored there, or else to the
    /// directory of the same name (returned in slash form).
    pub async fn get_metadata(&self, key: &str) -> Result<Option<Resource>> {
        if is_directory(key) {
            let found = self.is_directory(key).await?;
            debug!("metadata {} -> directory={}", key, found);
            return Ok(found.then(|| Resource::directory(key)));
        }

        if let Some(head) = self.head(key).await? {
            debug!("metadata {} -> file ({} bytes)", key, head.size);
            return Ok(Some(Resource::file(key, head.size)));
        }

        if self.is_directory(key).await? {
            return Ok(Some(Resource::directory(ensure_trailing_slash(key))));
        }

        debug!("metadata {} -> absent", key);
        Ok(None)
    }

    /// Create the directory `key` and every missing ancestor, root first.
    ///
    /// For a file key the containing directory is created. Ancestors that
    /// already exist (with or without a marker) are left untouched, so the
    /// call is idempotent.
    pub async fn create_directory(&self, key: &str) -> Result<()> {
        let dir = match key.rfind('/') {
            Some(pos) => &key[..=pos],
            None => return Ok(()),
        };

        for (pos, _) in dir.match_indices('/') {
            let prefix = &dir[..=pos];
            if !self.is_directory(prefix).await? {
                self.store.put_empty(prefix).await?;
                info!("Created directory {}", prefix);
            }
        }
        Ok(())
    }

    /// Store a file, creating its parent directories first
    pub async fn save(&self, key: &str, data: Bytes, content_type: &str) -> Result<()> {
        self.create_directory(key).await?;
        let size = data.len();
        self.store.put(key, data, content_type).await?;
        info!("Saved {} ({} bytes, {})", key, size, content_type);
        Ok(())
    }

    /// Delete a file, or a directory with everything under it.
    ///
    /// Tree deletes are best effort: failed keys are listed in the report
    /// and the rest stay deleted.
    pub async fn delete(&self, key: &str) -> Result<OperationReport> {
        let mut report = OperationReport::new("delete");

        if !is_directory(key) {
            self.store.delete(key).await?;
            info!("Deleted {}", key);
            report.record_ok(key);
            return Ok(report);
        }

        let keys: Vec<String> = list_all(self.store.as_ref(), key, self.page_size)
            .map_ok(|object| object.key)
            .try_collect()
            .await?;

        for batch in keys.chunks(self.page_size) {
            let outcome = self.store.delete_batch(batch).await;
            report.succeeded.extend(outcome.deleted);
            report.failed.extend(outcome.failed);
        }

        if report.is_complete() {
            info!("Deleted {} ({} keys)", key, report.succeeded.len());
        } else {
            warn!(
                "Delete of {} incomplete: {} of {} keys failed",
                key,
                report.failed.len(),
                keys.len()
            );
        }
        Ok(report)
    }

    /// Copy a file, or a directory tree with the prefix rewritten.
    ///
    /// A failed file copy is returned as an error. For a tree, per-key
    /// failures are collected in the report and the copy continues. A
    /// missing source is `ResourceNotFound` and leaves the target untouched.
    pub async fn copy(&self, source: &str, target: &str) -> Result<OperationReport> {
        let mut report = OperationReport::new("copy");

        if !is_directory(source) {
            if self.head(source).await?.is_none() {
                return Err(Error::ResourceNotFound(key_to_path(source)));
            }
            self.create_directory(target).await?;
            self.store
                .copy(source, target)
                .await
                .map_err(|e| absent(e, source))?;
            info!("Copied {} -> {}", source, target);
            report.record_ok(target);
            return Ok(report);
        }

        let objects: Vec<ObjectSummary> = list_all(self.store.as_ref(), source, self.page_size)
            .try_collect()
            .await?;
        if objects.is_empty() {
            return Err(Error::ResourceNotFound(key_to_path(source)));
        }

        let target = ensure_trailing_slash(target);
        self.create_directory(&target).await?;

        for object in objects {
            // The target marker already exists
            if object.key == source {
                continue;
            }
            let destination = format!("{}{}", target, &object.key[source.len()..]);
            match self.store.copy(&object.key, &destination).await {
                Ok(()) => report.record_ok(destination),
                // Deleted since the listing, nothing left to copy
                Err(e) if e.is_not_found() => {
                    debug!("Skipping {}, removed during copy", object.key);
                }
                Err(e) => {
                    error!("Failed to copy {} -> {}: {}", object.key, destination, e);
                    report.record_failure(object.key, &e);
                }
            }
        }

        info!(
            "Copied {} -> {} ({} keys, {} failed)",
            source,
            target,
            report.succeeded.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Copy then delete the source.
    ///
    /// Not atomic. The source is only deleted after a complete copy; if the
    /// process dies in between, the resource exists at both keys until the
    /// move is retried.
    pub async fn move_resource(&self, source: &str, target: &str) -> Result<OperationReport> {
        let mut report = OperationReport::new("move");

        let copied = self.copy(source, target).await?;
        let complete = copied.is_complete();
        report.absorb(copied);
        if !complete {
            warn!("Move {} -> {} stopped after partial copy, source kept", source, target);
            return Ok(report);
        }

        report.absorb(self.delete(source).await?);
        info!("Moved {} -> {}", source, target);
        Ok(report)
    }

    /// Immediate children of a directory: sub-directories first, then files
    pub async fn list_children(&self, prefix: &str) -> Result<Vec<Resource>> {
        let prefix = ensure_trailing_slash(prefix);
        let mut directories = Vec::new();
        let mut files = Vec::new();
        let mut token = None;

        loop {
            let request = ListRequest::new(prefix.clone())
                .max_keys(self.page_size)
                .continue_from(token);
            let page = self.store.list(request).await?;

            directories.extend(page.common_prefixes.into_iter().map(Resource::directory));
            files.extend(
                page.objects
                    .into_iter()
                    .filter(|object| object.key != prefix)
                    .map(|object| Resource::file(object.key, object.size)),
            );

            token = page.next_token;
            if token.is_none() {
                break;
            }
        }

        debug!(
            "list {} -> {} directories, {} files",
            prefix,
            directories.len(),
            files.len()
        );
        directories.extend(files);
        Ok(directories)
    }

    /// Every resource under a directory, at any depth.
    ///
    /// Directories only show up here when they have a marker object.
    pub async fn list_tree(&self, prefix: &str) -> Result<Vec<Resource>> {
        let prefix = ensure_trailing_slash(prefix);
        let resources: Vec<Resource> = list_all(self.store.as_ref(), &prefix, self.page_size)
            .try_filter(|object| futures::future::ready(object.key != prefix))
            .map_ok(|object| {
                if is_directory(&object.key) && object.size == 0 {
                    Resource::directory(object.key)
                } else {
                    Resource::file(object.key, object.size)
                }
            })
            .try_collect()
            .await?;

        debug!("tree {} -> {} resources", prefix, resources.len());
        Ok(resources)
    }

    /// Whole body of a file
    pub async fn download_file(&self, key: &str) -> Result<Bytes> {
        let body = self.store.get(key).await.map_err(|e| absent(e, key))?;
        let data = read_all(body).await?;
        debug!("download {} ({} bytes)", key, data.len());
        Ok(data)
    }

    /// Zip a directory tree, entries named `<archive_root>/<relative path>`.
    ///
    /// Bodies are streamed into the archive chunk by chunk. The finished
    /// archive is kept in memory and capped at `max_archive_bytes`.
    pub async fn download_directory_as_archive(
        &self,
        key: &str,
        archive_root: &str,
    ) -> Result<Bytes> {
        let prefix = ensure_trailing_slash(key);
        let objects: Vec<ObjectSummary> = list_all(self.store.as_ref(), &prefix, self.page_size)
            .try_collect()
            .await?;

        let mut archive = ArchiveBuilder::new(archive_root, self.max_archive_bytes);
        for (i, object) in objects.iter().enumerate() {
            if object.key == prefix {
                continue;
            }
            let relative = &object.key[prefix.len()..];

            if is_directory(relative) {
                // Listing is sorted, so children directly follow their marker
                let has_children = objects
                    .get(i + 1)
                    .map_or(false, |next| next.key.starts_with(&object.key));
                if !has_children {
                    archive.add_directory(relative)?;
                }
                continue;
            }

            archive.start_file(relative)?;
            let mut body = self
                .store
                .get(&object.key)
                .await
                .map_err(|e| absent(e, &object.key))?;
            while let Some(chunk) = body.try_next().await? {
                archive.write_chunk(&chunk)?;
            }
        }

        let entries = archive.entries();
        let data = archive.finish()?;
        info!(
            "Archived {} as {} ({} entries, {} bytes)",
            prefix,
            archive_root,
            entries,
            data.len()
        );
        Ok(data)
    }
}

/// Translate the store's "no such key" into a filesystem absence
fn absent(e: Error, key: &str) -> Error {
    if e.is_not_found() {
        Error::ResourceNotFound(key_to_path(key))
    } else {
        e
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreErrorKind;
    use crate::store::{MemoryObjectStore, StoreOp};
    use crate::vfs::ResourceKind;
    use std::io::{Cursor, Read};
    use zip::ZipArchive;

    fn setup() -> (Arc<MemoryObjectStore>, VfsManager) {
        let store = Arc::new(MemoryObjectStore::new());
        let vfs = VfsManager::new(store.clone()).with_page_size(2);
        (store, vfs)
    }

    async fn put(vfs: &VfsManager, key: &str, data: &'static [u8]) {
        vfs.save(key, Bytes::from_static(data), "text/plain").await.unwrap();
    }

    #[tokio::test]
    async fn test_create_directory_builds_ancestors() {
        let (store, vfs) = setup();
        vfs.create_directory("ns/a/b/c/").await.unwrap();
        assert_eq!(store.keys(), vec!["ns/", "ns/a/", "ns/a/b/", "ns/a/b/c/"]);
    }

    #[tokio::test]
    async fn test_create_directory_is_idempotent() {
        let (store, vfs) = setup();
        vfs.create_directory("ns/a/").await.unwrap();
        let before = store.keys();
        vfs.create_directory("ns/a/").await.unwrap();
        assert_eq!(store.keys(), before);
        assert!(vfs.is_directory("ns/a/").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_directory_skips_implicit_ancestors() {
        let (store, vfs) = setup();
        // "ns/x/" exists only through its descendant
        store
            .put("ns/x/y.txt", Bytes::from_static(b"1"), "text/plain")
            .await
            .unwrap();
        vfs.create_directory("ns/x/z/").await.unwrap();
        assert_eq!(store.keys(), vec!["ns/x/y.txt", "ns/x/z/"]);
    }

    #[tokio::test]
    async fn test_save_and_metadata() {
        let (store, vfs) = setup();
        put(&vfs, "ns/docs/a.txt", b"abc").await;
        assert!(store.keys().contains(&"ns/docs/".to_string()));

        let file = vfs.get_metadata("ns/docs/a.txt").await.unwrap().unwrap();
        assert_eq!(file, Resource::file("ns/docs/a.txt", 3));

        let dir = vfs.get_metadata("ns/docs/").await.unwrap().unwrap();
        assert_eq!(dir.kind, ResourceKind::Directory);
        assert_eq!(dir.size, 0);

        // Slashless name of a directory resolves to the directory
        let dir = vfs.get_metadata("ns/docs").await.unwrap().unwrap();
        assert_eq!(dir.key, "ns/docs/");

        assert!(vfs.get_metadata("ns/missing.txt").await.unwrap().is_none());
        assert!(vfs.get_metadata("ns/docs/a.txt/").await.unwrap().is_none());
        assert!(vfs.exists("ns/docs").await.unwrap());
        assert!(!vfs.exists("ns/nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_directory_implies_listable() {
        let (store, vfs) = setup();
        store
            .put("ns/implicit/deep/f.txt", Bytes::from_static(b"1"), "text/plain")
            .await
            .unwrap();

        for dir in ["ns/implicit/", "ns/implicit/deep/"] {
            assert!(vfs.is_directory(dir).await.unwrap());
            assert!(vfs.list_children(dir).await.is_ok());
        }
        let children = vfs.list_children("ns/implicit/").await.unwrap();
        assert_eq!(children, vec![Resource::directory("ns/implicit/deep/")]);
    }

    #[tokio::test]
    async fn test_list_children_across_pages() {
        let (_store, vfs) = setup();
        put(&vfs, "ns/d/a.txt", b"1").await;
        put(&vfs, "ns/d/b.txt", b"22").await;
        put(&vfs, "ns/d/c.txt", b"333").await;
        vfs.create_directory("ns/d/sub/").await.unwrap();

        let children = vfs.list_children("ns/d/").await.unwrap();
        assert_eq!(
            children,
            vec![
                Resource::directory("ns/d/sub/"),
                Resource::file("ns/d/a.txt", 1),
                Resource::file("ns/d/b.txt", 2),
                Resource::file("ns/d/c.txt", 3),
            ]
        );
    }

    #[tokio::test]
    async fn test_list_tree() {
        let (_store, vfs) = setup();
        put(&vfs, "ns/t/a.txt", b"1").await;
        put(&vfs, "ns/t/s/b.txt", b"1").await;

        let tree = vfs.list_tree("ns/t/").await.unwrap();
        let kinds: Vec<_> = tree.iter().map(|r| (r.key.as_str(), r.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("ns/t/a.txt", ResourceKind::File),
                ("ns/t/s/", ResourceKind::Directory),
                ("ns/t/s/b.txt", ResourceKind::File),
            ]
        );
    }

    #[tokio::test]
    async fn test_recursive_delete() {
        let (store, vfs) = setup();
        put(&vfs, "ns/a/b.txt", b"1").await;
        put(&vfs, "ns/a/c/d.txt", b"1").await;

        let report = vfs.delete("ns/a/").await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.succeeded.len(), 4);
        assert!(vfs.list_tree("ns/a/").await.unwrap().is_empty());
        assert_eq!(store.keys(), vec!["ns/"]);
    }

    #[tokio::test]
    async fn test_delete_reports_partial_failure() {
        let (store, vfs) = setup();
        put(&vfs, "ns/a/b.txt", b"1").await;
        put(&vfs, "ns/a/c.txt", b"1").await;
        store.fail_on(StoreOp::Delete, "ns/a/c.txt");

        let report = vfs.delete("ns/a/").await.unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].key, "ns/a/c.txt");
        assert!(matches!(report.into_result(), Err(Error::PartialFailure(_))));

        // Retrying after the fault clears finishes the job
        store.clear_faults();
        assert!(vfs.delete("ns/a/").await.unwrap().is_complete());
        assert!(!vfs.is_directory("ns/a/").await.unwrap());
    }

    #[tokio::test]
    async fn test_copy_tree() {
        let (store, vfs) = setup();
        put(&vfs, "ns/src/a.txt", b"abc").await;
        put(&vfs, "ns/src/s/b.txt", b"hello").await;

        let report = vfs.copy("ns/src/", "ns/dst/").await.unwrap();
        assert!(report.is_complete());
        for key in ["ns/dst/", "ns/dst/a.txt", "ns/dst/s/", "ns/dst/s/b.txt"] {
            assert!(store.keys().contains(&key.to_string()), "missing {}", key);
        }
        // Source untouched
        assert!(vfs.exists("ns/src/a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_move_file() {
        let (_store, vfs) = setup();
        put(&vfs, "ns/a/b.txt", b"hello").await;

        let report = vfs.move_resource("ns/a/b.txt", "ns/c/b.txt").await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.operation, "move");
        assert!(vfs.get_metadata("ns/a/b.txt").await.unwrap().is_none());
        assert_eq!(
            vfs.get_metadata("ns/c/b.txt").await.unwrap(),
            Some(Resource::file("ns/c/b.txt", 5))
        );
    }

    #[tokio::test]
    async fn test_copy_of_missing_source_is_not_found() {
        let (store, vfs) = setup();

        for source in ["ns/gone.txt", "ns/gone/"] {
            let err = vfs.copy(source, "ns/dst/x").await.unwrap_err();
            assert!(matches!(err, Error::ResourceNotFound(_)), "{}: {:?}", source, err);
            assert_eq!(err.status_code(), 404);

            let err = vfs.move_resource(source, "ns/dst/x").await.unwrap_err();
            assert!(matches!(err, Error::ResourceNotFound(_)), "{}: {:?}", source, err);
        }
        // No target markers were written
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn test_copy_tree_skips_keys_removed_mid_copy() {
        let (store, vfs) = setup();
        put(&vfs, "ns/src/a.txt", b"1").await;
        put(&vfs, "ns/src/b.txt", b"2").await;
        store.fail_on_with(StoreOp::Copy, "ns/src/b.txt", StoreErrorKind::NotFound);

        let report = vfs.copy("ns/src/", "ns/dst/").await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.succeeded, vec!["ns/dst/a.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_move_keeps_source_on_partial_copy() {
        let (store, vfs) = setup();
        put(&vfs, "ns/a/x.txt", b"1").await;
        put(&vfs, "ns/a/y.txt", b"2").await;
        store.fail_on(StoreOp::Copy, "ns/a/y.txt");

        let report = vfs.move_resource("ns/a/", "ns/b/").await.unwrap();
        assert!(!report.is_complete());
        assert!(vfs.exists("ns/a/y.txt").await.unwrap());
        assert!(vfs.exists("ns/a/x.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_download_file() {
        let (_store, vfs) = setup();
        put(&vfs, "ns/f.txt", b"payload").await;
        assert_eq!(&vfs.download_file("ns/f.txt").await.unwrap()[..], b"payload");
        assert!(matches!(
            vfs.download_file("ns/none.txt").await,
            Err(Error::ResourceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_directory_archive() {
        let (_store, vfs) = setup();
        put(&vfs, "ns/docs/a.txt", b"abc").await;
        put(&vfs, "ns/docs/sub/b.txt", b"hello").await;
        vfs.create_directory("ns/docs/empty/").await.unwrap();

        let data = vfs
            .download_directory_as_archive("ns/docs/", "docs")
            .await
            .unwrap();
        let mut zip = ZipArchive::new(Cursor::new(data.to_vec())).unwrap();
        let mut names: Vec<_> = zip.file_names().map(String::from).collect();
        names.sort();
        assert_eq!(names, vec!["docs/a.txt", "docs/empty/", "docs/sub/b.txt"]);

        let mut content = String::new();
        zip.by_name("docs/a.txt").unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "abc");
    }

    #[tokio::test]
    async fn test_archive_limit() {
        let (_store, vfs) = setup();
        put(&vfs, "ns/big/a.bin", b"0123456789").await;
        let vfs = vfs.with_max_archive_bytes(4);
        assert!(matches!(
            vfs.download_directory_as_archive("ns/big/", "big").await,
            Err(Error::Archive(_))
        ));
    }
}
