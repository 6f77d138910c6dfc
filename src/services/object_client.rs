//! Remote object-store client contract.
//!
//! Every call is a remote round trip. Failures are classified into the
//! three outcomes callers care about; no retries happen at this layer.

use crate::models::object::{ObjectInfo, PutOptions, StoredObject};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("object `{key}` not found")]
    NotFound { key: String },
    #[error("access denied: {0}")]
    Authorization(String),
    #[error("request failed: {0}")]
    Transient(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Operations against a single bucket.
///
/// Keys are full storage keys (prefix included). Listing prefixes are
/// passed with their trailing delimiter, e.g. `media/1001/`.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Metadata of an object; `NotFound` when absent.
    async fn head_object(&self, key: &str) -> RemoteResult<ObjectInfo>;

    /// Payload and modification time of an object; `NotFound` when absent.
    async fn get_object(&self, key: &str) -> RemoteResult<StoredObject>;

    async fn put_object(&self, key: &str, bytes: Bytes, options: &PutOptions)
        -> RemoteResult<()>;

    /// Remove an object. Removing a missing key succeeds.
    async fn delete_object(&self, key: &str) -> RemoteResult<()>;

    /// One level of keys under `prefix`.
    ///
    /// Objects are returned by key; deeper levels are collapsed into
    /// common prefixes ending with `/`.
    async fn list_keys(&self, prefix: &str) -> RemoteResult<Vec<String>>;

    /// Every object key under `prefix`, at any depth.
    async fn list_all_keys(&self, prefix: &str) -> RemoteResult<Vec<String>>;

    /// Server-side copy of `from` onto `to`.
    async fn copy_object(&self, from: &str, to: &str, options: &PutOptions) -> RemoteResult<()>;

    async fn exists(&self, key: &str) -> RemoteResult<bool> {
        match self.head_object(key).await {
            Ok(_) => Ok(true),
            Err(RemoteError::NotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn get_last_modified(&self, key: &str) -> RemoteResult<DateTime<Utc>> {
        Ok(self.head_object(key).await?.last_modified)
    }
}

/// Compute a synthetic "common prefix" for list semantics.
///
/// Returns `Some(prefix)` (ending with the delimiter) when `key` lies in a
/// sub-level of `requested_prefix`, `None` for a direct child or a key
/// outside the prefix.
pub(crate) fn compute_common_prefix(
    key: &str,
    requested_prefix: &str,
    delimiter: &str,
) -> Option<String> {
    let after_prefix = key.strip_prefix(requested_prefix)?;
    let pos = after_prefix.find(delimiter)?;
    let mut combined = String::from(requested_prefix);
    combined.push_str(&after_prefix[..pos + delimiter.len()]);
    Some(combined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_prefix_groups_nested_keys() {
        assert_eq!(
            compute_common_prefix("a/c/d.txt", "a/", "/"),
            Some("a/c/".to_string())
        );
        assert_eq!(compute_common_prefix("a/c/", "a/", "/"), Some("a/c/".to_string()));
        assert_eq!(compute_common_prefix("a/b.txt", "a/", "/"), None);
        assert_eq!(compute_common_prefix("b/c/d.txt", "a/", "/"), None);
    }
}
