//! Request-scoped handle for serving one file through the web layer.
//!
//! Opening the handle computes the caching directives for the response and
//! only then materializes the byte stream. The directives are returned to
//! the caller, which applies them to its own response.

use super::file_system::{FileStream, FsResult};
use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use std::{fmt, future::Future};

/// Responses may be cached for a week.
const MAX_AGE_SECS: i64 = 7 * 24 * 60 * 60;

/// Difference between the Windows FILETIME epoch (1601) and the Unix epoch.
const FILETIME_UNIX_OFFSET_SECS: i64 = 11_644_473_600;
const FILETIME_TICKS_PER_SEC: i64 = 10_000_000;

/// Files modified within this many ticks of "now" get a weak ETag.
const WEAK_ETAG_WINDOW_TICKS: i64 = 3 * FILETIME_TICKS_PER_SEC;

type StreamSupplier = Box<dyn FnOnce() -> BoxFuture<'static, FsResult<FileStream>> + Send>;

/// Who may store a served file. Only shared caching is ever granted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cacheability {
    Public,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Revalidation {
    /// Every cache, shared or private, must revalidate once stale.
    AllCaches,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ETag {
    value: String,
    weak: bool,
}

impl ETag {
    pub fn is_weak(&self) -> bool {
        self.weak
    }

    /// The opaque tag without quotes or weak marker.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.weak {
            write!(f, "W/\"{}\"", self.value)
        } else {
            write!(f, "\"{}\"", self.value)
        }
    }
}

/// Caching headers a response serving a virtual file must carry.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheDirectives {
    pub cacheability: Cacheability,
    pub revalidation: Revalidation,
    pub max_age: Duration,
    pub expires: DateTime<Utc>,
    pub etag: ETag,
}

impl CacheDirectives {
    pub fn for_file(last_modified: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            cacheability: Cacheability::Public,
            revalidation: Revalidation::AllCaches,
            max_age: Duration::seconds(MAX_AGE_SECS),
            expires: now + Duration::seconds(MAX_AGE_SECS),
            etag: generate_etag(last_modified, now),
        }
    }

    /// Value of the `Cache-Control` header.
    pub fn cache_control(&self) -> String {
        let cacheability = match self.cacheability {
            Cacheability::Public => "public",
        };
        let revalidation = match self.revalidation {
            Revalidation::AllCaches => "must-revalidate, proxy-revalidate",
        };
        format!(
            "{}, {}, max-age={}",
            cacheability,
            revalidation,
            self.max_age.num_seconds()
        )
    }

    /// Value of the `Expires` header (IMF-fixdate).
    pub fn expires_header(&self) -> String {
        self.expires.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }
}

/// A 64-bit FILETIME stamp (100ns ticks since 1601-01-01 UTC).
pub fn to_file_time(timestamp: DateTime<Utc>) -> i64 {
    (timestamp.timestamp() + FILETIME_UNIX_OFFSET_SECS) * FILETIME_TICKS_PER_SEC
        + i64::from(timestamp.timestamp_subsec_nanos() / 100)
}

/// ETag derived from the modification time.
///
/// Weak when the file changed no more than three seconds before `now`.
pub fn generate_etag(last_modified: DateTime<Utc>, now: DateTime<Utc>) -> ETag {
    let modified = to_file_time(last_modified);
    ETag {
        value: format!("{:08X}", modified),
        weak: to_file_time(now) - modified <= WEAK_ETAG_WINDOW_TICKS,
    }
}

/// An opened virtual file: what to send and how to cache it.
pub struct OpenedFile {
    pub directives: CacheDirectives,
    pub stream: FileStream,
}

/// A file (never a directory) to be served, with its stream deferred until `open`.
pub struct VirtualFile {
    virtual_path: String,
    last_modified: DateTime<Utc>,
    supplier: StreamSupplier,
}

impl VirtualFile {
    pub fn new<F, Fut>(virtual_path: impl Into<String>, last_modified: DateTime<Utc>, supplier: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = FsResult<FileStream>> + Send + 'static,
    {
        Self {
            virtual_path: virtual_path.into(),
            last_modified,
            supplier: Box::new(move || Box::pin(supplier())),
        }
    }

    pub fn virtual_path(&self) -> &str {
        &self.virtual_path
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    pub fn is_directory(&self) -> bool {
        false
    }

    pub async fn open(self) -> FsResult<OpenedFile> {
        self.open_at(Utc::now()).await
    }

    /// Open as if the current time were `now`.
    pub async fn open_at(self, now: DateTime<Utc>) -> FsResult<OpenedFile> {
        let directives = CacheDirectives::for_file(self.last_modified, now);
        let stream = (self.supplier)().await?;
        Ok(OpenedFile { directives, stream })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::file_system::FsError;
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };
    use tokio::io::AsyncReadExt;

    fn at(secs: i64, nanos: u32) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, nanos).unwrap()
    }

    #[test]
    fn etag_is_weak_up_to_three_seconds_inclusive() {
        let modified = at(1_700_000_000, 0);
        assert!(generate_etag(modified, at(1_700_000_003, 0)).is_weak());
        assert!(!generate_etag(modified, at(1_700_000_003, 1_000)).is_weak());
        assert!(!generate_etag(modified, at(1_700_000_060, 0)).is_weak());
    }

    #[test]
    fn etag_is_uppercase_hex_filetime() {
        let epoch = at(0, 0);
        let etag = generate_etag(epoch, at(100, 0));
        assert_eq!(etag.value(), "19DB1DED53E8000");
        assert_eq!(etag.to_string(), "\"19DB1DED53E8000\"");

        let weak = generate_etag(epoch, epoch);
        assert_eq!(weak.to_string(), "W/\"19DB1DED53E8000\"");
    }

    #[test]
    fn directives_allow_public_caching_for_a_week() {
        let now = at(1_700_000_000, 0);
        let directives = CacheDirectives::for_file(at(1_600_000_000, 0), now);
        assert_eq!(directives.cacheability, Cacheability::Public);
        assert_eq!(directives.revalidation, Revalidation::AllCaches);
        assert_eq!(
            directives.cache_control(),
            "public, must-revalidate, proxy-revalidate, max-age=604800"
        );
        assert_eq!(directives.expires, now + Duration::days(7));
        assert_eq!(directives.expires_header(), "Tue, 21 Nov 2023 22:13:20 GMT");
        assert!(!directives.etag.is_weak());
    }

    #[tokio::test]
    async fn stream_is_only_materialized_on_open() {
        let opened = Arc::new(AtomicBool::new(false));
        let flag = opened.clone();
        let file = VirtualFile::new("media/a.txt", at(1_700_000_000, 0), move || async move {
            flag.store(true, Ordering::SeqCst);
            Ok(Box::new(&b"payload"[..]) as FileStream)
        });
        assert!(!file.is_directory());
        assert_eq!(file.virtual_path(), "media/a.txt");
        assert!(!opened.load(Ordering::SeqCst));

        let mut result = file.open_at(at(1_700_000_001, 0)).await.unwrap();
        assert!(opened.load(Ordering::SeqCst));
        assert!(result.directives.etag.is_weak());

        let mut body = Vec::new();
        result.stream.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"payload");
    }

    #[tokio::test]
    async fn supplier_errors_propagate() {
        let file = VirtualFile::new("gone.txt", Utc::now(), || async {
            Err(FsError::NotFound {
                path: "gone.txt".into(),
            })
        });
        assert!(matches!(file.open().await, Err(FsError::NotFound { .. })));
    }
}
