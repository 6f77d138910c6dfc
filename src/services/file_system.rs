//! BucketFileSystem: a hierarchical file API over a single bucket.
//!
//! Paths are normalized into storage keys, reads go through the local
//! read-through cache, and writes and deletes go straight to the object
//! store before the cached copy of the key is dropped. Cache failures
//! never fail an operation; they only cost a remote fetch.

use super::{
    disk_cache::FileCache,
    object_client::{ObjectStoreClient, RemoteError, compute_common_prefix},
    path_normalizer::PathNormalizer,
};
use crate::{
    config::StorageConfig,
    models::{
        key::StorageKey,
        object::{ObjectInfo, PutOptions, StoredObject},
    },
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::{collections::BTreeSet, io, sync::Arc};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// Byte stream handed out by `open_file`.
pub type FileStream = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("file `{path}` not found")]
    NotFound { path: String },
    #[error("file `{path}` already exists")]
    AlreadyExists { path: String },
    #[error("object store denied access: {0}")]
    Authorization(String),
    #[error("object store request failed: {0}")]
    Transient(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type FsResult<T> = Result<T, FsError>;

impl FsError {
    /// Attach the virtual path the caller asked for to a remote failure.
    fn remote(path: &str) -> impl FnOnce(RemoteError) -> FsError + '_ {
        move |err| match err {
            RemoteError::NotFound { .. } => FsError::NotFound {
                path: path.to_string(),
            },
            RemoteError::Authorization(msg) => FsError::Authorization(msg),
            RemoteError::Transient(msg) => FsError::Transient(msg),
        }
    }
}

pub struct BucketFileSystem {
    config: Arc<StorageConfig>,
    paths: PathNormalizer,
    cache: FileCache,
    client: Arc<dyn ObjectStoreClient>,
}

impl BucketFileSystem {
    pub fn new(
        config: Arc<StorageConfig>,
        client: Arc<dyn ObjectStoreClient>,
        cache: FileCache,
    ) -> Self {
        Self {
            paths: PathNormalizer::new(&config),
            config,
            cache,
            client,
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn paths(&self) -> &PathNormalizer {
        &self.paths
    }

    pub fn cache(&self) -> &FileCache {
        &self.cache
    }

    fn put_options(&self, key: &StorageKey) -> PutOptions {
        PutOptions {
            acl: self.config.canned_acl,
            encryption: self.config.server_side_encryption,
            content_type: mime_guess::from_path(key.as_str())
                .first()
                .map(|mime| mime.essence_str().to_string()),
        }
    }

    /// True when the file is cached or the bucket holds it.
    pub async fn file_exists(&self, path: &str) -> FsResult<bool> {
        let key = self.paths.to_storage_key(path);
        if self.cache.try_get(&key).await.is_some() {
            return Ok(true);
        }
        self.client
            .exists(key.as_str())
            .await
            .map_err(FsError::remote(path))
    }

    /// Payload and modification time from a single source.
    ///
    /// A cache hit answers both; on a miss the remote object is fetched
    /// once and cached as fetched.
    pub async fn read_file(&self, path: &str) -> FsResult<StoredObject> {
        let key = self.paths.to_storage_key(path);
        if let Some(cached) = self.cache.try_get(&key).await {
            return Ok(StoredObject {
                bytes: cached.bytes,
                last_modified: cached.last_modified,
            });
        }

        debug!("fetching {} from bucket", key);
        let object = self
            .client
            .get_object(key.as_str())
            .await
            .map_err(FsError::remote(path))?;
        self.cache
            .put(&key, &object.bytes, object.last_modified)
            .await;
        Ok(object)
    }

    pub async fn open_file(&self, path: &str) -> FsResult<FileStream> {
        let object = self.read_file(path).await?;
        Ok(Box::new(io::Cursor::new(object.bytes)))
    }

    /// Upload `stream` to `path`.
    ///
    /// With `overwrite == false` an existing object fails the call with
    /// `AlreadyExists` and is left untouched.
    pub async fn add_file<R>(&self, path: &str, mut stream: R, overwrite: bool) -> FsResult<()>
    where
        R: AsyncRead + Send + Unpin,
    {
        let key = self.paths.to_storage_key(path);
        if !overwrite
            && self
                .client
                .exists(key.as_str())
                .await
                .map_err(FsError::remote(path))?
        {
            return Err(FsError::AlreadyExists {
                path: path.to_string(),
            });
        }

        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await?;
        let size = buf.len();

        self.client
            .put_object(key.as_str(), Bytes::from(buf), &self.put_options(&key))
            .await
            .map_err(FsError::remote(path))?;
        self.cache.invalidate(&key).await;

        debug!("stored {} bytes at {}", size, key);
        Ok(())
    }

    /// Delete a file. Deleting a missing file succeeds.
    pub async fn delete_file(&self, path: &str) -> FsResult<()> {
        let key = self.paths.to_storage_key(path);
        self.client
            .delete_object(key.as_str())
            .await
            .map_err(FsError::remote(path))?;
        self.cache.invalidate(&key).await;
        debug!("deleted {}", key);
        Ok(())
    }

    /// One directory level under `path`, split into (files, directories) keys.
    async fn list_level(&self, path: &str) -> FsResult<(Vec<String>, Vec<String>)> {
        let prefix = self.paths.to_storage_key(path).as_dir_prefix();
        let listed = self
            .client
            .list_keys(&prefix)
            .await
            .map_err(FsError::remote(path))?;

        let mut files = Vec::new();
        let mut directories = BTreeSet::new();
        for key in listed {
            match compute_common_prefix(&key, &prefix, "/") {
                Some(dir) => {
                    directories.insert(dir.trim_end_matches('/').to_string());
                }
                None if key.len() > prefix.len() && key.starts_with(&prefix) => files.push(key),
                None => {}
            }
        }
        Ok((files, directories.into_iter().collect()))
    }

    /// Files directly under `path`, as prefix-qualified paths.
    ///
    /// Each entry normalizes back to its own key, so it can be handed to
    /// any other operation as is.
    pub async fn get_files(&self, path: &str) -> FsResult<Vec<String>> {
        let (files, _) = self.list_level(path).await?;
        Ok(files
            .iter()
            .map(|key| self.paths.to_qualified_path(key))
            .collect())
    }

    /// Like `get_files`, keeping names that match a `*`/`?` wildcard filter.
    pub async fn get_files_matching(&self, path: &str, filter: &str) -> FsResult<Vec<String>> {
        let files = self.get_files(path).await?;
        if filter.is_empty() || filter == "*" || filter == "*.*" {
            return Ok(files);
        }
        Ok(files
            .into_iter()
            .filter(|file| {
                let name = file.rsplit('/').next().unwrap_or(file);
                wildcard_match(&filter.to_ascii_lowercase(), &name.to_ascii_lowercase())
            })
            .collect())
    }

    /// Directories directly under `path`, prefix-qualified like `get_files`.
    pub async fn get_directories(&self, path: &str) -> FsResult<Vec<String>> {
        let (_, directories) = self.list_level(path).await?;
        Ok(directories
            .iter()
            .map(|key| self.paths.to_qualified_path(key))
            .collect())
    }

    /// True when at least one object lives under `path`.
    pub async fn directory_exists(&self, path: &str) -> FsResult<bool> {
        let prefix = self.paths.to_storage_key(path).as_dir_prefix();
        let listed = self
            .client
            .list_keys(&prefix)
            .await
            .map_err(FsError::remote(path))?;
        Ok(!listed.is_empty())
    }

    /// Delete the files under `path`; with `recursive`, every nested key too.
    pub async fn delete_directory(&self, path: &str, recursive: bool) -> FsResult<()> {
        let keys = if recursive {
            let prefix = self.paths.to_storage_key(path).as_dir_prefix();
            self.client
                .list_all_keys(&prefix)
                .await
                .map_err(FsError::remote(path))?
        } else {
            self.list_level(path).await?.0
        };

        for key in keys {
            self.client
                .delete_object(&key)
                .await
                .map_err(FsError::remote(path))?;
            self.cache.invalidate(&StorageKey::new(key)).await;
        }
        Ok(())
    }

    /// Modification time, from the cache when it holds a fresh entry.
    pub async fn get_last_modified(&self, path: &str) -> FsResult<DateTime<Utc>> {
        let key = self.paths.to_storage_key(path);
        if let Some(cached) = self.cache.try_get(&key).await {
            return Ok(cached.last_modified);
        }
        self.client
            .get_last_modified(key.as_str())
            .await
            .map_err(FsError::remote(path))
    }

    /// Buckets keep no creation time; the modification time stands in.
    pub async fn get_created(&self, path: &str) -> FsResult<DateTime<Utc>> {
        self.get_last_modified(path).await
    }

    pub async fn get_size(&self, path: &str) -> FsResult<u64> {
        Ok(self.stat(path).await?.size)
    }

    /// Size and modification time from one source: the cached entry when
    /// fresh, otherwise a single remote head.
    pub async fn stat(&self, path: &str) -> FsResult<ObjectInfo> {
        let key = self.paths.to_storage_key(path);
        if let Some(cached) = self.cache.try_get(&key).await {
            return Ok(ObjectInfo {
                key: key.into_string(),
                size: cached.bytes.len() as u64,
                last_modified: cached.last_modified,
            });
        }
        self.client
            .head_object(key.as_str())
            .await
            .map_err(FsError::remote(path))
    }

    /// Server-side copy; the destination's cached copy is dropped.
    pub async fn copy_file(&self, from: &str, to: &str) -> FsResult<()> {
        let source = self.paths.to_storage_key(from);
        let target = self.paths.to_storage_key(to);
        self.client
            .copy_object(source.as_str(), target.as_str(), &self.put_options(&target))
            .await
            .map_err(FsError::remote(from))?;
        self.cache.invalidate(&target).await;
        Ok(())
    }

    pub fn get_url(&self, path: &str) -> String {
        self.paths.to_public_url(&self.paths.to_storage_key(path))
    }

    pub fn get_full_path(&self, path: &str) -> String {
        self.paths.to_storage_key(path).into_string()
    }

    pub fn get_relative_path(&self, full_path_or_url: &str) -> String {
        self.paths.to_relative_path(full_path_or_url)
    }

    pub fn can_add_file(&self, _path: &str) -> bool {
        !self.config.read_only
    }
}

/// Match `name` against a pattern where `*` spans any run and `?` one char.
fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    let (mut p, mut n) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, n));
                p += 1;
            }
            Some(&c) if c == '?' || c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    n = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}
