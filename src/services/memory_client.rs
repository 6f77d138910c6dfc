//! In-process bucket implementing `ObjectStoreClient`.
//!
//! Used by the test-suite and by `--in-memory` local development runs.

use super::object_client::{ObjectStoreClient, RemoteError, RemoteResult, compute_common_prefix};
use crate::models::object::{ObjectInfo, PutOptions, StoredObject};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        RwLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

/// A stored object plus the write settings it was uploaded with.
#[derive(Clone, Debug)]
pub struct MemoryObject {
    pub object: StoredObject,
    pub options: PutOptions,
}

#[derive(Default)]
pub struct MemoryObjectClient {
    objects: RwLock<BTreeMap<String, MemoryObject>>,
    offline: AtomicBool,
    gets: AtomicUsize,
    heads: AtomicUsize,
    puts: AtomicUsize,
}

impl MemoryObjectClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every call fails with `Transient`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of `get_object` calls served so far.
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of `head_object` calls (including `exists` probes) served so far.
    pub fn heads(&self) -> usize {
        self.heads.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Snapshot of a stored object, bypassing counters.
    pub fn object(&self, key: &str) -> Option<MemoryObject> {
        self.read().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, MemoryObject>> {
        self.objects.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, MemoryObject>> {
        self.objects.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_online(&self) -> RemoteResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Transient("object store unreachable".into()));
        }
        Ok(())
    }

    fn lookup(&self, key: &str) -> RemoteResult<MemoryObject> {
        self.read()
            .get(key)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound {
                key: key.to_string(),
            })
    }
}

#[async_trait]
impl ObjectStoreClient for MemoryObjectClient {
    async fn head_object(&self, key: &str) -> RemoteResult<ObjectInfo> {
        self.ensure_online()?;
        self.heads.fetch_add(1, Ordering::SeqCst);
        let entry = self.lookup(key)?;
        Ok(ObjectInfo {
            key: key.to_string(),
            size: entry.object.bytes.len() as u64,
            last_modified: entry.object.last_modified,
        })
    }

    async fn get_object(&self, key: &str) -> RemoteResult<StoredObject> {
        self.ensure_online()?;
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(self.lookup(key)?.object)
    }

    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        options: &PutOptions,
    ) -> RemoteResult<()> {
        self.ensure_online()?;
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.write().insert(
            key.to_string(),
            MemoryObject {
                object: StoredObject {
                    bytes,
                    last_modified: Utc::now(),
                },
                options: options.clone(),
            },
        );
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> RemoteResult<()> {
        self.ensure_online()?;
        self.write().remove(key);
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> RemoteResult<Vec<String>> {
        self.ensure_online()?;
        let objects = self.read();
        let mut keys = Vec::new();
        let mut common_prefixes = BTreeSet::new();
        for key in objects.keys().filter(|key| key.starts_with(prefix)) {
            match compute_common_prefix(key, prefix, "/") {
                Some(common) => {
                    common_prefixes.insert(common);
                }
                None => keys.push(key.clone()),
            }
        }
        keys.extend(common_prefixes);
        Ok(keys)
    }

    async fn list_all_keys(&self, prefix: &str) -> RemoteResult<Vec<String>> {
        self.ensure_online()?;
        Ok(self
            .read()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn copy_object(&self, from: &str, to: &str, options: &PutOptions) -> RemoteResult<()> {
        self.ensure_online()?;
        let source = self.lookup(from)?;
        self.write().insert(
            to.to_string(),
            MemoryObject {
                object: StoredObject {
                    bytes: source.object.bytes,
                    last_modified: Utc::now(),
                },
                options: options.clone(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::acl::{CannedAcl, ServerSideEncryption};

    fn options() -> PutOptions {
        PutOptions {
            acl: CannedAcl::Private,
            encryption: ServerSideEncryption::None,
            content_type: None,
        }
    }

    #[tokio::test]
    async fn lists_one_level_with_common_prefixes() {
        let client = MemoryObjectClient::new();
        for key in ["a/b.txt", "a/c/d.txt", "a/c/e.txt", "ab/x.txt"] {
            client
                .put_object(key, Bytes::from_static(b"x"), &options())
                .await
                .unwrap();
        }

        let listed = client.list_keys("a/").await.unwrap();
        assert_eq!(listed, vec!["a/b.txt".to_string(), "a/c/".to_string()]);

        let all = client.list_all_keys("a/").await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn missing_objects_are_not_found() {
        let client = MemoryObjectClient::new();
        assert!(matches!(
            client.get_object("nope").await,
            Err(RemoteError::NotFound { .. })
        ));
        assert!(!client.exists("nope").await.unwrap());
        client.delete_object("nope").await.unwrap();
    }

    #[tokio::test]
    async fn offline_client_fails_transiently() {
        let client = MemoryObjectClient::new();
        client.set_offline(true);
        assert!(matches!(
            client.exists("k").await,
            Err(RemoteError::Transient(_))
        ));
    }
}
