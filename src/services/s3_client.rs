//! `ObjectStoreClient` backed by `aws-sdk-s3`.
//!
//! Credentials come from the SDK's default provider chain; the region is
//! taken from the bucket configuration.

use super::object_client::{ObjectStoreClient, RemoteError, RemoteResult};
use crate::{
    config::StorageConfig,
    models::object::{ObjectInfo, PutOptions, StoredObject},
};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{Region, http::HttpResponse},
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    primitives::ByteStream,
    types::{ObjectCannedAcl, ServerSideEncryption},
};
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

pub struct S3ObjectClient {
    client: Client,
    bucket: String,
}

impl S3ObjectClient {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Load SDK configuration from the environment for the configured region.
    pub async fn from_config(config: &StorageConfig) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;
        Self::new(Client::new(&sdk_config), config.bucket_name.clone())
    }

    async fn list(&self, prefix: &str, delimiter: Option<&str>) -> RemoteResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut common_prefixes = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);
            if let Some(delimiter) = delimiter {
                request = request.delimiter(delimiter);
            }
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let output = request.send().await.map_err(|err| classify(prefix, err))?;
            keys.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .map(str::to_string),
            );
            common_prefixes.extend(
                output
                    .common_prefixes()
                    .iter()
                    .filter_map(|common| common.prefix())
                    .map(str::to_string),
            );

            match output.next_continuation_token() {
                Some(token) if output.is_truncated().unwrap_or(false) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }

        keys.extend(common_prefixes);
        Ok(keys)
    }
}

#[async_trait]
impl ObjectStoreClient for S3ObjectClient {
    async fn head_object(&self, key: &str) -> RemoteResult<ObjectInfo> {
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| classify(key, err))?;

        Ok(ObjectInfo {
            key: key.to_string(),
            size: output.content_length().unwrap_or(0).max(0) as u64,
            last_modified: last_modified(key, output.last_modified())?,
        })
    }

    async fn get_object(&self, key: &str) -> RemoteResult<StoredObject> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| classify(key, err))?;

        let last_modified = last_modified(key, output.last_modified())?;
        let bytes = output
            .body
            .collect()
            .await
            .map_err(|err| RemoteError::Transient(format!("reading `{}`: {}", key, err)))?
            .into_bytes();

        debug!("fetched {} bytes for {}", bytes.len(), key);
        Ok(StoredObject {
            bytes,
            last_modified,
        })
    }

    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        options: &PutOptions,
    ) -> RemoteResult<()> {
        let checksum = general_purpose::STANDARD.encode(md5::compute(&bytes).0);
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .acl(ObjectCannedAcl::from(options.acl.as_str()))
            .content_md5(checksum)
            .body(ByteStream::from(bytes));
        if let Some(content_type) = options.content_type.as_deref() {
            request = request.content_type(content_type);
        }
        if let Some(sse) = options.encryption.as_header_value() {
            request = request.server_side_encryption(ServerSideEncryption::from(sse));
        }

        request.send().await.map_err(|err| classify(key, err))?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> RemoteResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| classify(key, err))?;
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> RemoteResult<Vec<String>> {
        self.list(prefix, Some("/")).await
    }

    async fn list_all_keys(&self, prefix: &str) -> RemoteResult<Vec<String>> {
        self.list(prefix, None).await
    }

    async fn copy_object(&self, from: &str, to: &str, options: &PutOptions) -> RemoteResult<()> {
        let mut request = self
            .client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(format!("{}/{}", self.bucket, encode_copy_source(from)))
            .key(to)
            .acl(ObjectCannedAcl::from(options.acl.as_str()));
        if let Some(sse) = options.encryption.as_header_value() {
            request = request.server_side_encryption(ServerSideEncryption::from(sse));
        }

        request.send().await.map_err(|err| classify(from, err))?;
        Ok(())
    }
}

/// Sort an SDK failure into not-found, authorization, or transient.
fn classify<E>(key: &str, err: SdkError<E, HttpResponse>) -> RemoteError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|response| response.status().as_u16());
    let code = err.code().map(str::to_string);

    match (status, code.as_deref()) {
        (Some(404), _) | (_, Some("NoSuchKey" | "NotFound")) => RemoteError::NotFound {
            key: key.to_string(),
        },
        (Some(401 | 403), _) | (_, Some("AccessDenied" | "InvalidAccessKeyId")) => {
            RemoteError::Authorization(DisplayErrorContext(&err).to_string())
        }
        _ => RemoteError::Transient(DisplayErrorContext(&err).to_string()),
    }
}

/// The object's Last-Modified time. A response without one cannot back an
/// ETag, so it is reported as a failed request.
fn last_modified(
    key: &str,
    timestamp: Option<&aws_sdk_s3::primitives::DateTime>,
) -> RemoteResult<DateTime<Utc>> {
    timestamp
        .and_then(|ts| DateTime::from_timestamp(ts.secs(), ts.subsec_nanos()))
        .ok_or_else(|| {
            warn!("object store returned no Last-Modified for {}", key);
            RemoteError::Transient(format!("no Last-Modified for `{}`", key))
        })
}

/// Percent-encode a key for the `x-amz-copy-source` header, keeping `/`.
fn encode_copy_source(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_source_escapes_reserved_bytes() {
        assert_eq!(encode_copy_source("media/a b+c.jpg"), "media/a%20b%2Bc.jpg");
        assert_eq!(encode_copy_source("media/ü.txt"), "media/%C3%BC.txt");
    }

    #[test]
    fn missing_last_modified_is_a_failed_request() {
        assert!(matches!(
            last_modified("media/a.txt", None),
            Err(RemoteError::Transient(msg)) if msg.contains("media/a.txt")
        ));
        let ts = aws_sdk_s3::primitives::DateTime::from_secs(1_700_000_000);
        assert_eq!(
            last_modified("media/a.txt", Some(&ts)).unwrap().timestamp(),
            1_700_000_000
        );
    }
}
