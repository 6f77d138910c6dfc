//! Represents objects (files) as the remote store reports them.

use super::acl::{CannedAcl, ServerSideEncryption};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Object metadata returned by a HEAD request or a listing.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ObjectInfo {
    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Size in bytes.
    pub size: u64,

    /// Timestamp when the object was last modified.
    pub last_modified: DateTime<Utc>,
}

/// Object payload together with the modification time captured in the same fetch.
///
/// The pair is never assembled from two different requests.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub last_modified: DateTime<Utc>,
}

/// Settings attached to a single write.
#[derive(Clone, Debug, PartialEq)]
pub struct PutOptions {
    /// Canned ACL applied to the new object.
    pub acl: CannedAcl,

    /// Requested server-side encryption.
    pub encryption: ServerSideEncryption,

    /// MIME type stored with the object, derived from the key's extension.
    pub content_type: Option<String>,
}
