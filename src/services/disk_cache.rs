//! Local read-through cache of object payloads.
//!
//! Each key is stored as one file under `cache_dir/{shard}/{shard}/{md5}.entry`:
//! a single JSON header line followed by the raw bytes. Entries are written
//! to a temp file and renamed into place, so a reader sees either the old
//! or the new entry in full. Expired entries are dropped when next read.

use crate::models::key::StorageKey;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("corrupt cache entry {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Source of the current time; replaced in tests to step past expiry.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// A cached payload with the modification time captured alongside it.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedFile {
    pub bytes: Bytes,
    pub last_modified: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug)]
struct EntryHeader {
    key: String,
    last_modified: DateTime<Utc>,
    cached_at: DateTime<Utc>,
    length: u64,
}

/// On-disk cache with time-based expiry.
#[derive(Clone)]
pub struct DiskCache {
    root: PathBuf,
    expiry: chrono::Duration,
    clock: Clock,
}

impl DiskCache {
    /// Create a cache rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>, expiry: chrono::Duration) -> CacheResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            expiry,
            clock: Arc::new(Utc::now),
        })
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Two-level shard directories plus file name, all from MD5(key).
    fn entry_path(&self, key: &StorageKey) -> PathBuf {
        let digest = md5::compute(key.as_str());
        let mut path = self.root.clone();
        path.push(format!("{:02x}", digest[0]));
        path.push(format!("{:02x}", digest[1]));
        path.push(format!("{:x}.entry", digest));
        path
    }

    /// Return the entry for `key` if present and not expired.
    ///
    /// Expired entries are removed before reporting a miss.
    pub async fn get(&self, key: &StorageKey) -> CacheResult<Option<CachedFile>> {
        let path = self.entry_path(key);
        let raw = match fs::read(&path).await {
            Ok(raw) => Bytes::from(raw),
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(CacheError::Io(err)),
        };

        let (header, bytes) = parse_entry(&path, raw)?;
        if header.key != key.as_str() {
            debug!("cache entry {} belongs to {}", path.display(), header.key);
            return Ok(None);
        }

        let age = (self.clock)() - header.cached_at;
        if age > self.expiry {
            debug!("cache entry for {} expired", key);
            self.remove_entry(&path).await?;
            return Ok(None);
        }

        Ok(Some(CachedFile {
            bytes,
            last_modified: header.last_modified,
        }))
    }

    /// Store `bytes` for `key`, replacing any previous entry atomically.
    pub async fn put(
        &self,
        key: &StorageKey,
        bytes: &Bytes,
        last_modified: DateTime<Utc>,
    ) -> CacheResult<()> {
        let path = self.entry_path(key);
        let parent = path.parent().map(Path::to_path_buf).ok_or_else(|| {
            CacheError::Io(io::Error::new(
                ErrorKind::Other,
                "cache path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;

        let header = EntryHeader {
            key: key.as_str().to_string(),
            last_modified,
            cached_at: (self.clock)(),
            length: bytes.len() as u64,
        };
        let mut encoded = serde_json::to_vec(&header).map_err(|err| CacheError::Corrupt {
            path: path.clone(),
            reason: err.to_string(),
        })?;
        encoded.push(b'\n');

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        if let Err(err) = write_file(&tmp_path, &encoded, bytes).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(CacheError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&path).await?;
                fs::rename(&tmp_path, &path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(CacheError::Io(err));
            }
        }

        debug!("cached {} bytes for {}", bytes.len(), key);
        Ok(())
    }

    /// Drop the entry for `key`. A missing entry is not an error.
    pub async fn invalidate(&self, key: &StorageKey) -> CacheResult<()> {
        self.remove_entry(&self.entry_path(key)).await
    }

    async fn remove_entry(&self, path: &Path) -> CacheResult<()> {
        match fs::remove_file(path).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(CacheError::Io(err)),
        }
    }
}

async fn write_file(path: &Path, header: &[u8], bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path).await?;
    file.write_all(header).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

fn parse_entry(path: &Path, raw: Bytes) -> CacheResult<(EntryHeader, Bytes)> {
    let corrupt = |reason: String| CacheError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };

    let newline = raw
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| corrupt("missing header".into()))?;
    let header: EntryHeader =
        serde_json::from_slice(&raw[..newline]).map_err(|err| corrupt(err.to_string()))?;
    let bytes = raw.slice(newline + 1..);
    if bytes.len() as u64 != header.length {
        return Err(corrupt(format!(
            "expected {} bytes, found {}",
            header.length,
            bytes.len()
        )));
    }
    Ok((header, bytes))
}

/// The cache as the file system sees it: enabled or a no-op.
///
/// Failures are logged and reported as misses; they never fail the caller.
#[derive(Clone)]
pub enum FileCache {
    Enabled(DiskCache),
    Disabled,
}

impl FileCache {
    pub fn is_enabled(&self) -> bool {
        matches!(self, FileCache::Enabled(_))
    }

    pub async fn try_get(&self, key: &StorageKey) -> Option<CachedFile> {
        let FileCache::Enabled(cache) = self else {
            return None;
        };
        match cache.get(key).await {
            Ok(Some(entry)) => {
                debug!("cache hit for {}", key);
                Some(entry)
            }
            Ok(None) => {
                debug!("cache miss for {}", key);
                None
            }
            Err(err) => {
                warn!("cache read failed for {}: {}", key, err);
                None
            }
        }
    }

    pub async fn put(&self, key: &StorageKey, bytes: &Bytes, last_modified: DateTime<Utc>) {
        if let FileCache::Enabled(cache) = self {
            if let Err(err) = cache.put(key, bytes, last_modified).await {
                warn!("cache write failed for {}: {}", key, err);
            }
        }
    }

    pub async fn invalidate(&self, key: &StorageKey) {
        if let FileCache::Enabled(cache) = self {
            if let Err(err) = cache.invalidate(key).await {
                warn!("cache invalidation failed for {}: {}", key, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use tempfile::TempDir;

    fn key(k: &str) -> StorageKey {
        StorageKey::new(k)
    }

    fn stepping_clock(start: DateTime<Utc>) -> (Clock, Arc<AtomicI64>) {
        let offset = Arc::new(AtomicI64::new(0));
        let shared = offset.clone();
        let clock: Clock = Arc::new(move || {
            start + chrono::Duration::seconds(shared.load(Ordering::SeqCst))
        });
        (clock, offset)
    }

    #[tokio::test]
    async fn round_trips_within_expiry() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::new(dir.path(), chrono::Duration::minutes(5)).unwrap();
        let modified = DateTime::from_timestamp(1_700_000_000, 123_456_700).unwrap();
        let payload = Bytes::from_static(b"hello\nworld");

        cache.put(&key("media/a.txt"), &payload, modified).await.unwrap();
        let entry = cache.get(&key("media/a.txt")).await.unwrap().unwrap();
        assert_eq!(entry.bytes, payload);
        assert_eq!(entry.last_modified, modified);
    }

    #[tokio::test]
    async fn expired_entries_are_misses_and_removed() {
        let dir = TempDir::new().unwrap();
        let (clock, offset) = stepping_clock(Utc::now());
        let cache = DiskCache::new(dir.path(), chrono::Duration::minutes(1))
            .unwrap()
            .with_clock(clock);
        let k = key("media/a.txt");
        cache.put(&k, &Bytes::from_static(b"x"), Utc::now()).await.unwrap();

        offset.store(60, Ordering::SeqCst);
        assert!(cache.get(&k).await.unwrap().is_some());

        offset.store(61, Ordering::SeqCst);
        assert!(cache.get(&k).await.unwrap().is_none());
        assert!(!cache.entry_path(&k).exists());
    }

    #[tokio::test]
    async fn put_overwrites_and_invalidate_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::new(dir.path(), chrono::Duration::minutes(5)).unwrap();
        let k = key("media/a.txt");
        cache.put(&k, &Bytes::from_static(b"old"), Utc::now()).await.unwrap();
        cache.put(&k, &Bytes::from_static(b"new"), Utc::now()).await.unwrap();
        assert_eq!(cache.get(&k).await.unwrap().unwrap().bytes, "new");

        cache.invalidate(&k).await.unwrap();
        cache.invalidate(&k).await.unwrap();
        assert!(cache.get(&k).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reserved_characters_in_keys_are_escaped() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::new(dir.path(), chrono::Duration::minutes(5)).unwrap();
        let k = key("media/../con:*?<>|.txt");
        cache.put(&k, &Bytes::from_static(b"ok"), Utc::now()).await.unwrap();
        assert!(cache.entry_path(&k).starts_with(dir.path()));
        assert_eq!(cache.get(&k).await.unwrap().unwrap().bytes, "ok");
    }

    #[tokio::test]
    async fn truncated_entry_is_corrupt_and_degrades_to_miss() {
        let dir = TempDir::new().unwrap();
        let disk = DiskCache::new(dir.path(), chrono::Duration::minutes(5)).unwrap();
        let k = key("media/a.txt");
        disk.put(&k, &Bytes::from_static(b"complete"), Utc::now()).await.unwrap();

        let path = disk.entry_path(&k);
        let raw = std::fs::read(&path).unwrap();
        std::fs::write(&path, &raw[..raw.len() - 3]).unwrap();

        assert!(matches!(disk.get(&k).await, Err(CacheError::Corrupt { .. })));
        assert!(FileCache::Enabled(disk).try_get(&k).await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_readers_see_whole_old_or_new_entries() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::new(dir.path(), chrono::Duration::minutes(5)).unwrap();
        let k = key("media/contended.bin");
        let old = (
            Bytes::from(vec![b'a'; 256 * 1024]),
            DateTime::from_timestamp(1_600_000_000, 0).unwrap(),
        );
        let new = (
            Bytes::from(vec![b'b'; 128 * 1024]),
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        );
        cache.put(&k, &old.0, old.1).await.unwrap();

        let mut writers = Vec::new();
        for round in 0..8 {
            let (cache, k) = (cache.clone(), k.clone());
            let (bytes, modified) = if round % 2 == 0 { new.clone() } else { old.clone() };
            writers.push(tokio::spawn(async move {
                for _ in 0..10 {
                    cache.put(&k, &bytes, modified).await.unwrap();
                }
            }));
        }

        let mut readers = Vec::new();
        for _ in 0..8 {
            let (cache, k, old, new) = (cache.clone(), k.clone(), old.clone(), new.clone());
            readers.push(tokio::spawn(async move {
                for _ in 0..25 {
                    let entry = cache.get(&k).await.unwrap().unwrap();
                    let seen = (entry.bytes, entry.last_modified);
                    assert!(seen == old || seen == new, "torn entry of {} bytes", seen.0.len());
                }
            }));
        }

        for handle in writers.into_iter().chain(readers) {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn disabled_cache_never_hits() {
        let cache = FileCache::Disabled;
        let k = key("media/a.txt");
        cache.put(&k, &Bytes::from_static(b"x"), Utc::now()).await;
        assert!(cache.try_get(&k).await.is_none());
        cache.invalidate(&k).await;
        assert!(!cache.is_enabled());
    }
}
