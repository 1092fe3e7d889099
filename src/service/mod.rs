//! Resource service
//!
//! Business rules on top of the virtual filesystem: root protection,
//! name collision checks, per-user namespacing and the error taxonomy the
//! API layer maps onto its responses. This is the only layer that raises
//! the filesystem-level errors (`ResourceNotFound`, `FileService`, ...).
//!
//! Existence checks and the writes that follow them are separate store
//! calls. Two concurrent requests for the same name can both pass the
//! check; the later `put` wins.

mod dto;

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::{CloudFsConfig, LimitsConfig};
use crate::error::{Error, Result};
use crate::keys::path::{last_segment, normalize_file_name};
use crate::keys::{
    ensure_trailing_slash, is_directory, is_root, key_to_path, name_of, normalize,
    normalize_directory, parent_of, KeyTranslator, Namespace,
};
use crate::store::{self, ObjectStore, DEFAULT_CONTENT_TYPE};
use crate::vfs::{OperationReport, Resource, ResourceKind, VfsManager};

pub use dto::{DownloadResponse, ResourceResponse, UploadFile, UserIdentity};

/// Content type of directory downloads
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// Per-user file operations
#[derive(Clone)]
pub struct ResourceService {
    vfs: VfsManager,
    keys: KeyTranslator,
    limits: LimitsConfig,
}

impl ResourceService {
    pub fn new(vfs: VfsManager, keys: KeyTranslator, limits: LimitsConfig) -> Self {
        Self { vfs, keys, limits }
    }

    /// Build the service over an already opened store
    pub fn from_config(store: Arc<dyn ObjectStore>, config: &CloudFsConfig) -> Result<Self> {
        Ok(Self::new(
            VfsManager::from_config(store, config),
            KeyTranslator::from_config(&config.namespace)?,
            config.limits.clone(),
        ))
    }

    /// Open the configured store and build the service on it
    pub fn open(config: &CloudFsConfig) -> Result<Self> {
        config.validate()?;
        let store = store::connect(&config.storage)?;
        Self::from_config(store, config)
    }

    pub fn vfs(&self) -> &VfsManager {
        &self.vfs
    }

    /// Key namespace of a user
    pub fn namespace(&self, user: &UserIdentity) -> Namespace {
        self.keys.namespace(user.id)
    }

    /// Metadata of a file or directory
    pub async fn get_resource(&self, user: &UserIdentity, path: &str) -> Result<ResourceResponse> {
        let logical = normalize(path)?;
        let resource = self.find(user, &logical).await?.ok_or_else(|| {
            warn!("User {} requested missing resource {}", user.username, logical);
            Error::ResourceNotFound(logical.clone())
        })?;
        Ok(ResourceResponse::from_resource(&resource))
    }

    /// Immediate children of a directory
    pub async fn get_directory(
        &self,
        user: &UserIdentity,
        path: &str,
    ) -> Result<Vec<ResourceResponse>> {
        let logical = normalize_directory(&ensure_trailing_slash(&normalize(path)?))?;
        let ns = self.namespace(user);
        let key = self.keys.directory_to_key(&ns, &logical)?;

        if !is_root(&logical) && !self.vfs.is_directory(&key).await? {
            warn!("User {} listed missing directory {}", user.username, logical);
            return Err(Error::DirectoryNotFound(logical));
        }

        let children = self.vfs.list_children(&key).await?;
        debug!("User {} listed {} ({} entries)", user.username, logical, children.len());
        Ok(children.iter().map(ResourceResponse::from_resource).collect())
    }

    /// Store files in a directory.
    ///
    /// Every file is checked before the first write. The writes themselves
    /// are independent, so a store failure midway leaves earlier files saved.
    pub async fn upload_files(
        &self,
        user: &UserIdentity,
        dir_path: &str,
        files: Vec<UploadFile>,
    ) -> Result<Vec<ResourceResponse>> {
        let dir = normalize_directory(dir_path)?;
        let ns = self.namespace(user);
        let dir_key = self.keys.directory_to_key(&ns, &dir)?;

        if files.is_empty() {
            return Err(Error::InvalidRequest("no files to upload".into()));
        }
        self.check_directory_chain(user, &dir_key).await?;

        let mut seen = HashSet::new();
        let mut planned = Vec::with_capacity(files.len());
        for file in files {
            let name = normalize_file_name(&file.filename)?;
            let logical = format!("{}{}", dir, name);

            if file.data.len() as u64 > self.limits.max_upload_bytes {
                warn!(
                    "User {} upload of {} rejected: {} bytes over the {} byte limit",
                    user.username,
                    logical,
                    file.data.len(),
                    self.limits.max_upload_bytes
                );
                return Err(Error::InvalidRequest(format!(
                    "{} is larger than {} bytes",
                    name, self.limits.max_upload_bytes
                )));
            }
            if !seen.insert(name.clone()) {
                warn!("User {} uploaded {} twice in one batch", user.username, logical);
                return Err(Error::ResourceAlreadyExists(logical));
            }

            let key = format!("{}{}", dir_key, name);
            if self.vfs.exists(&key).await? {
                warn!("User {} upload of {} rejected: already exists", user.username, logical);
                return Err(Error::ResourceAlreadyExists(logical));
            }
            planned.push((key, logical, file));
        }

        let mut saved = Vec::with_capacity(planned.len());
        for (key, logical, file) in planned {
            let content_type = file
                .content_type
                .as_deref()
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .to_string();
            self.vfs.save(&key, file.data, &content_type).await?;
            info!("User {} uploaded {}", user.username, logical);

            let resource = self.vfs.get_metadata(&key).await?.ok_or_else(|| {
                error!("User {} upload of {} not readable after save", user.username, logical);
                Error::ResourceNotFound(logical.clone())
            })?;
            saved.push(ResourceResponse::from_resource(&resource));
        }
        Ok(saved)
    }

    /// Create a directory and any missing parents
    pub async fn create_directory(&self, user: &UserIdentity, path: &str) -> Result<ResourceResponse> {
        let logical = normalize_directory(&ensure_trailing_slash(&normalize(path)?))?;
        if is_root(&logical) {
            warn!("User {} tried to create the root directory", user.username);
            return Err(Error::ResourceAlreadyExists(logical));
        }

        let ns = self.namespace(user);
        let key = self.keys.directory_to_key(&ns, &logical)?;
        if self.directory_occupied(&key).await? {
            warn!("User {} create of {} rejected: already exists", user.username, logical);
            return Err(Error::ResourceAlreadyExists(logical));
        }
        self.check_directory_chain(user, &parent_of(&key)).await?;

        self.vfs.create_directory(&key).await?;
        info!("User {} created directory {}", user.username, logical);
        Ok(ResourceResponse::from_resource(&Resource::directory(key)))
    }

    /// Delete a file or a whole directory tree
    pub async fn delete_resource(&self, user: &UserIdentity, path: &str) -> Result<OperationReport> {
        let logical = normalize(path)?;
        if is_root(&logical) {
            warn!("User {} tried to delete the root directory", user.username);
            return Err(Error::FileService("cannot delete the root directory".into()));
        }

        let resource = self.find(user, &logical).await?.ok_or_else(|| {
            warn!("User {} delete of {} rejected: not found", user.username, logical);
            Error::ResourceNotFound(logical.clone())
        })?;

        let report = self.vfs.delete(&resource.key).await?;
        if !report.is_complete() {
            error!("User {} delete of {} incomplete: {}", user.username, logical, report);
        }
        let report = report.into_result()?;
        info!("User {} deleted {} ({} keys)", user.username, logical, report.succeeded.len());
        Ok(report)
    }

    /// Move or rename a file or directory.
    ///
    /// A directory source always lands on a directory path. A file source
    /// must name a file path.
    pub async fn move_resource(
        &self,
        user: &UserIdentity,
        from: &str,
        to: &str,
    ) -> Result<ResourceResponse> {
        let from_logical = normalize(from)?;
        let to_logical = normalize(to)?;
        if is_root(&from_logical) || is_root(&to_logical) {
            warn!(
                "User {} tried to move {} -> {} involving the root directory",
                user.username, from_logical, to_logical
            );
            return Err(Error::FileService("cannot move the root directory".into()));
        }

        let source = self.find(user, &from_logical).await?.ok_or_else(|| {
            warn!("User {} move of {} rejected: not found", user.username, from_logical);
            Error::ResourceNotFound(from_logical.clone())
        })?;

        let to_logical = match source.kind {
            ResourceKind::Directory => normalize(&ensure_trailing_slash(&to_logical))?,
            ResourceKind::File if is_directory(&to_logical) => {
                warn!(
                    "User {} tried to move file {} onto directory path {}",
                    user.username, from_logical, to_logical
                );
                return Err(Error::InvalidPath(format!(
                    "{}: a file cannot be moved to a directory path",
                    to_logical
                )));
            }
            ResourceKind::File => to_logical,
        };

        let ns = self.namespace(user);
        let to_key = self.keys.path_to_key(&ns, &to_logical)?;

        if source.is_directory() && to_key.starts_with(&source.key) {
            warn!(
                "User {} tried to move {} into itself ({})",
                user.username, from_logical, to_logical
            );
            return Err(Error::FileService(format!(
                "cannot move {} into its own subtree",
                from_logical
            )));
        }

        let occupied = if source.is_directory() {
            self.directory_occupied(&to_key).await?
        } else {
            self.vfs.exists(&to_key).await?
        };
        if occupied {
            warn!("User {} move to {} rejected: already exists", user.username, to_logical);
            return Err(Error::ResourceAlreadyExists(to_logical));
        }
        self.check_directory_chain(user, &parent_of(&to_key)).await?;

        let report = self.vfs.move_resource(&source.key, &to_key).await?;
        if !report.is_complete() {
            error!(
                "User {} move {} -> {} incomplete: {}",
                user.username, from_logical, to_logical, report
            );
        }
        report.into_result()?;

        let moved = self.vfs.get_metadata(&to_key).await?.ok_or_else(|| {
            error!(
                "User {} moved {} but {} is not readable",
                user.username, from_logical, to_logical
            );
            Error::ResourceNotFound(to_logical.clone())
        })?;
        info!("User {} moved {} -> {}", user.username, from_logical, to_logical);
        Ok(ResourceResponse::from_resource(&moved))
    }

    /// Case-insensitive name search over everything the user owns.
    ///
    /// Walks the whole namespace on every call.
    pub async fn search(&self, user: &UserIdentity, query: &str) -> Result<Vec<ResourceResponse>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(Error::InvalidRequest("search query is empty".into()));
        }

        let root = self.namespace(user).root_key();
        let matches: Vec<ResourceResponse> = self
            .vfs
            .list_tree(&root)
            .await?
            .iter()
            .filter(|resource| name_of(&resource.key).to_lowercase().contains(&needle))
            .map(ResourceResponse::from_resource)
            .collect();

        debug!("User {} searched {:?}: {} matches", user.username, query, matches.len());
        Ok(matches)
    }

    /// File bytes, or a zip archive for a directory
    pub async fn download(&self, user: &UserIdentity, path: &str) -> Result<DownloadResponse> {
        let logical = normalize(path)?;
        let resource = self.find(user, &logical).await?.ok_or_else(|| {
            warn!("User {} download of {} rejected: not found", user.username, logical);
            Error::ResourceNotFound(logical.clone())
        })?;

        let name = match last_segment(&logical) {
            "" => user.username.clone(),
            segment => segment.to_string(),
        };

        let response = match resource.kind {
            ResourceKind::File => {
                let content_type = self
                    .vfs
                    .head(&resource.key)
                    .await?
                    .and_then(|head| head.content_type)
                    .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
                DownloadResponse {
                    filename: name,
                    kind: ResourceKind::File,
                    content_type,
                    data: self.vfs.download_file(&resource.key).await?,
                }
            }
            ResourceKind::Directory => DownloadResponse {
                data: self
                    .vfs
                    .download_directory_as_archive(&resource.key, &name)
                    .await?,
                filename: format!("{}.zip", name),
                kind: ResourceKind::Directory,
                content_type: ARCHIVE_CONTENT_TYPE.to_string(),
            },
        };

        info!(
            "User {} downloaded {} as {} ({} bytes)",
            user.username,
            logical,
            response.filename,
            response.data.len()
        );
        Ok(response)
    }

    /// Resolve a logical path; the root always exists
    async fn find(&self, user: &UserIdentity, logical: &str) -> Result<Option<Resource>> {
        let ns = self.namespace(user);
        if is_root(logical) {
            return Ok(Some(Resource::directory(ns.root_key())));
        }
        let key = self.keys.path_to_key(&ns, logical)?;
        self.vfs.get_metadata(&key).await
    }

    /// A directory key is taken if the directory or a same-named file exists
    async fn directory_occupied(&self, key: &str) -> Result<bool> {
        if self.vfs.is_directory(key).await? {
            return Ok(true);
        }
        Ok(self.vfs.head(key.trim_end_matches('/')).await?.is_some())
    }

    /// Reject a directory key when it, or any directory above it, is stored
    /// as a file
    async fn check_directory_chain(&self, user: &UserIdentity, dir_key: &str) -> Result<()> {
        let trimmed = dir_key.trim_end_matches('/');
        if !trimmed.contains('/') {
            return Ok(());
        }

        // The first separator ends the namespace
        let ends = trimmed
            .match_indices('/')
            .map(|(pos, _)| pos)
            .skip(1)
            .chain(std::iter::once(trimmed.len()));
        for end in ends {
            let ancestor = &trimmed[..end];
            if self.vfs.head(ancestor).await?.is_some() {
                let logical = key_to_path(ancestor);
                warn!("User {} path blocked by file {}", user.username, logical);
                return Err(Error::ResourceAlreadyExists(logical));
            }
        }
        Ok(())
    }
}
