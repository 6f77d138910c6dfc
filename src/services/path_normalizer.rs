//! Maps virtual paths to storage keys and storage keys to public URLs.
//!
//! Virtual paths may use `/` or `\`, may be rooted, and may repeat
//! delimiters; keys are always `prefix/segment/segment`.

use crate::{config::StorageConfig, models::key::StorageKey};

/// Delimiter used inside storage keys.
pub const KEY_DELIMITER: char = '/';

#[derive(Clone, Debug)]
pub struct PathNormalizer {
    prefix: String,
    public_base: String,
}

impl PathNormalizer {
    pub fn new(config: &StorageConfig) -> Self {
        let public_base = match config.bucket_hostname.as_deref() {
            Some(host) if host.contains("://") => host.trim_end_matches('/').to_string(),
            Some(host) => format!("https://{}", host.trim_end_matches('/')),
            None => format!(
                "https://{}.s3.{}.amazonaws.com",
                config.bucket_name, config.region
            ),
        };
        Self {
            prefix: split_segments(&config.bucket_prefix).join("/"),
            public_base,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Base URL every public object URL starts with.
    pub fn public_base(&self) -> &str {
        &self.public_base
    }

    /// Normalize a virtual path into the key of the object it names.
    ///
    /// A path that already starts with the key prefix is not prefixed twice,
    /// so normalizing a key yields the same key.
    pub fn to_storage_key(&self, virtual_path: &str) -> StorageKey {
        let segments = split_segments(virtual_path);
        let prefix_segments = split_segments(&self.prefix);

        let rest = if segments.starts_with(&prefix_segments) {
            &segments[prefix_segments.len()..]
        } else {
            &segments[..]
        };

        if rest.is_empty() {
            StorageKey::new(self.prefix.clone())
        } else {
            StorageKey::new(format!("{}/{}", self.prefix, rest.join("/")))
        }
    }

    /// Inverse of `to_storage_key`: a virtual path that normalizes back to `key`.
    ///
    /// The prefix is dropped unless the remainder itself starts with the
    /// prefix, in which case `to_storage_key` would strip it again and the
    /// key is returned whole instead.
    pub fn to_virtual_path(&self, key: &str) -> String {
        let segments = split_segments(key);
        let prefix_segments = split_segments(&self.prefix);
        match segments.strip_prefix(prefix_segments.as_slice()) {
            Some(rest) if !rest.starts_with(&prefix_segments) => rest.join("/"),
            _ => segments.join("/"),
        }
    }

    /// The key itself as a path, prefix included. `to_storage_key` maps it
    /// back to the same key.
    pub fn to_qualified_path(&self, key: &str) -> String {
        key.trim_matches(KEY_DELIMITER).to_string()
    }

    pub fn to_public_url(&self, key: &StorageKey) -> String {
        format!("{}/{}", self.public_base, key)
    }

    /// Turn a public URL, a key or a rooted path back into a virtual path.
    pub fn to_relative_path(&self, full_path: &str) -> String {
        let path = full_path.strip_prefix(self.public_base.as_str()).unwrap_or(full_path);
        let key = self.to_storage_key(path);
        self.to_virtual_path(key.as_str())
    }
}

fn split_segments(path: &str) -> Vec<&str> {
    path.split(['/', '\\'])
        .filter(|segment| !segment.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::acl::{CannedAcl, ServerSideEncryption};

    fn config(prefix: &str, hostname: Option<&str>) -> StorageConfig {
        StorageConfig {
            bucket_name: "site-media".into(),
            bucket_hostname: hostname.map(str::to_string),
            bucket_prefix: prefix.into(),
            region: "eu-west-1".into(),
            canned_acl: CannedAcl::PublicRead,
            server_side_encryption: ServerSideEncryption::None,
            cache_enabled: false,
            cache_minutes: 0,
            disable_virtual_path_provider: false,
            read_only: false,
        }
    }

    #[test]
    fn mixed_delimiters_collapse_to_one_key() {
        let paths = PathNormalizer::new(&config("forms", None));
        assert_eq!(paths.to_storage_key("/forms//data/").as_str(), "forms/data");
        assert_eq!(paths.to_storage_key("forms/data").as_str(), "forms/data");
        assert_eq!(paths.to_storage_key("\\data\\").as_str(), "forms/data");
        assert_eq!(paths.to_storage_key("data").as_str(), "forms/data");
    }

    #[test]
    fn normalizing_a_key_is_idempotent() {
        let paths = PathNormalizer::new(&config("media", None));
        for path in ["1001/photo.jpg", "/a\\b//c.txt", "", "/"] {
            let key = paths.to_storage_key(path);
            assert_eq!(paths.to_storage_key(key.as_str()), key);
            let virtual_path = paths.to_virtual_path(key.as_str());
            assert_eq!(paths.to_storage_key(&virtual_path), key);
        }
    }

    #[test]
    fn keys_nesting_the_prefix_round_trip() {
        let paths = PathNormalizer::new(&config("media", None));
        for key in ["media/media/b.jpg", "media/media", "media/photos/a.jpg", "media"] {
            let virtual_path = paths.to_virtual_path(key);
            assert_eq!(paths.to_storage_key(&virtual_path).as_str(), key);
            let qualified = paths.to_qualified_path(key);
            assert_eq!(paths.to_storage_key(&qualified).as_str(), key);
        }
        assert_eq!(paths.to_virtual_path("media/media/b.jpg"), "media/media/b.jpg");
        assert_eq!(paths.to_virtual_path("media/photos/a.jpg"), "photos/a.jpg");
    }

    #[test]
    fn root_maps_to_prefix() {
        let paths = PathNormalizer::new(&config("media", None));
        assert_eq!(paths.to_storage_key("/").as_str(), "media");
        assert_eq!(paths.to_virtual_path("media"), "");
    }

    #[test]
    fn prefix_lookalikes_are_not_stripped() {
        let paths = PathNormalizer::new(&config("media", None));
        assert_eq!(
            paths.to_storage_key("mediakit/logo.png").as_str(),
            "media/mediakit/logo.png"
        );
        assert_eq!(paths.to_virtual_path("mediakit/logo.png"), "mediakit/logo.png");
    }

    #[test]
    fn public_url_uses_hostname_or_bucket_endpoint() {
        let with_host = PathNormalizer::new(&config("media", Some("cdn.example.com/")));
        let key = with_host.to_storage_key("1001/photo.jpg");
        assert_eq!(
            with_host.to_public_url(&key),
            "https://cdn.example.com/media/1001/photo.jpg"
        );

        let with_scheme = PathNormalizer::new(&config("media", Some("http://localhost:9000")));
        assert_eq!(
            with_scheme.to_public_url(&key),
            "http://localhost:9000/media/1001/photo.jpg"
        );

        let default = PathNormalizer::new(&config("media", None));
        assert_eq!(
            default.to_public_url(&key),
            "https://site-media.s3.eu-west-1.amazonaws.com/media/1001/photo.jpg"
        );
    }

    #[test]
    fn relative_path_strips_url_and_prefix() {
        let paths = PathNormalizer::new(&config("media", Some("cdn.example.com")));
        assert_eq!(
            paths.to_relative_path("https://cdn.example.com/media/1001/photo.jpg"),
            "1001/photo.jpg"
        );
        assert_eq!(paths.to_relative_path("/media/1001/photo.jpg"), "1001/photo.jpg");
        assert_eq!(paths.to_relative_path("1001\\photo.jpg"), "1001/photo.jpg");
        assert_eq!(
            paths.to_relative_path("https://cdn.example.com/media/media/b.jpg"),
            "media/media/b.jpg"
        );
    }
}
